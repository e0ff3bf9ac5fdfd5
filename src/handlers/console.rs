//! The console handler.
use std::io::{self, Write};
use std::time::Duration;

use crate::config::{ConsoleConfig, HandlerConfig};
use crate::event::LogEvent;
use crate::handler::Handler;
use crate::handlers::format_event_line;
use crate::{Error, Result};

const CONSOLE_IDENTITY: &str = "console";

/// Writes formatted events to stdout or stderr.
#[derive(Debug)]
pub struct ConsoleHandler {
    config: ConsoleConfig,
}

impl ConsoleHandler {
    /// Makes a new console handler.
    pub fn new(config: ConsoleConfig) -> Self {
        ConsoleHandler { config }
    }
}

impl Handler for ConsoleHandler {
    fn identity(&self) -> &str {
        CONSOLE_IDENTITY
    }

    fn activate(&mut self) -> Result<()> {
        Ok(())
    }

    fn deactivate(&mut self) -> Result<()> {
        Ok(())
    }

    fn handle(&mut self, event: &LogEvent) -> Result<()> {
        let line = format_event_line(event);
        let result = if self.config.use_stderr {
            io::stderr().lock().write_all(line.as_bytes())
        } else {
            io::stdout().lock().write_all(line.as_bytes())
        };
        track!(result.map_err(Error::from))
    }

    fn on_timer(&mut self, _elapsed: Duration) -> Result<()> {
        Ok(())
    }

    fn apply_configuration(&mut self, config: &HandlerConfig) -> Result<bool> {
        match config {
            HandlerConfig::Console(c) => {
                self.config = c.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
