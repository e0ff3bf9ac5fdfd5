//! The text-file handler.
use chrono::Duration;
use slog::Logger;

use crate::config::{HandlerConfig, TextFileConfig};
use crate::event::LogEvent;
use crate::folders::TimedFolderConfig;
use crate::handler::{Handler, SinkServices};
use crate::handlers::format_event_line;
use crate::output::{FileOutputOptions, Reconfigure, RotatingFileOutput};
use crate::{ErrorKind, Result};

/// Writes each event as a text line into a [`RotatingFileOutput`].
///
/// Timed-folder cleanup runs eagerly at activation; file housekeeping runs
/// from the periodic timer, every `housekeeping_rate` ticks.
pub struct TextFileHandler {
    logger: Logger,
    identity: String,
    config: TextFileConfig,
    output: RotatingFileOutput,
    ticks_until_housekeeping: u32,
}

impl TextFileHandler {
    /// Makes a new handler from its configuration.
    pub fn new(config: TextFileConfig, services: &SinkServices) -> Result<Self> {
        let identity = config.path.to_string_lossy().into_owned();
        let logger = services
            .logger
            .new(o!("component" => "text-file", "path" => identity.clone()));
        let output = track!(RotatingFileOutput::new(
            logger.clone(),
            &config.path,
            Self::output_options(&config),
        ))?;
        Ok(TextFileHandler {
            logger,
            identity,
            ticks_until_housekeeping: config.housekeeping_rate,
            config,
            output,
        })
    }

    fn output_options(config: &TextFileConfig) -> FileOutputOptions {
        FileOutputOptions {
            file_name_suffix: config.file_name_suffix.clone(),
            max_count_per_file: config.max_count_per_file,
            use_gzip: config.use_gzip_compression,
            timed_folders: config.timed_folders_enabled(),
            last_run_file_name: if config.with_last_run_symlink {
                Some(config.last_run_file_name.clone())
            } else {
                None
            },
        }
    }

    fn timed_folder_config(&self) -> TimedFolderConfig {
        TimedFolderConfig {
            max_current_log_folder_count: self.config.max_current_log_folder_count,
            max_archived_log_folder_count: self.config.max_archived_log_folder_count,
        }
    }

    fn housekeeping_configured(&self) -> bool {
        self.config.housekeeping_rate > 0
            && (self.config.minimum_time_to_keep_secs > 0
                || self.config.maximum_total_bytes_to_keep > 0)
    }
}

impl Handler for TextFileHandler {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn activate(&mut self) -> Result<()> {
        if !self.output.initialize() {
            track_panic!(ErrorKind::Io, "Cannot initialize the log directory: {}", self.identity);
        }
        if self.config.timed_folders_enabled() {
            // Folder lifecycle is enforced at activation boundaries only.
            if !self.output.run_timed_folder_cleanup(&self.timed_folder_config()) {
                warn!(self.logger, "timed-folder cleanup did not complete");
            }
        }
        self.ticks_until_housekeeping = self.config.housekeeping_rate;
        Ok(())
    }

    fn deactivate(&mut self) -> Result<()> {
        self.output.deactivate();
        Ok(())
    }

    fn handle(&mut self, event: &LogEvent) -> Result<()> {
        let line = format_event_line(event);
        track!(self.output.write_entry(line.as_bytes()))
    }

    fn on_timer(&mut self, _elapsed: std::time::Duration) -> Result<()> {
        if !self.housekeeping_configured() {
            return Ok(());
        }
        self.ticks_until_housekeeping = self.ticks_until_housekeeping.saturating_sub(1);
        if self.ticks_until_housekeeping > 0 {
            return Ok(());
        }
        self.ticks_until_housekeeping = self.config.housekeeping_rate;
        track!(self.output.run_file_housekeeping(
            Duration::seconds(self.config.minimum_time_to_keep_secs as i64),
            self.config.maximum_total_bytes_to_keep,
        ))
    }

    fn apply_configuration(&mut self, config: &HandlerConfig) -> Result<bool> {
        let incoming = match config {
            HandlerConfig::TextFile(c) if c.path == self.config.path => c,
            _ => return Ok(false),
        };
        let timed_changes = incoming.timed_folders_enabled() != self.config.timed_folders_enabled();
        track!(self.output.reconfigure(Reconfigure {
            file_name_suffix: Some(incoming.file_name_suffix.clone()),
            max_count_per_file: Some(incoming.max_count_per_file),
            use_gzip: Some(incoming.use_gzip_compression),
            timed_folders: Some(incoming.timed_folders_enabled()),
            last_run_file_name: Some(if incoming.with_last_run_symlink {
                Some(incoming.last_run_file_name.clone())
            } else {
                None
            }),
        }))?;
        self.config = incoming.clone();
        self.ticks_until_housekeeping = self.config.housekeeping_rate;
        if timed_changes && self.config.timed_folders_enabled() {
            let _ = self.output.run_timed_folder_cleanup(&self.timed_folder_config());
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventPool, Monitor, Tags};
    use crate::identity::IdentityCard;
    use crate::types::Severity;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::{Builder as TempDirBuilder, TempDir};

    fn services() -> SinkServices {
        SinkServices {
            logger: Logger::root(slog::Discard, o!()),
            identity_card: Arc::new(Mutex::new(IdentityCard::new())),
        }
    }

    fn event(text: &str) -> LogEvent {
        let pool = EventPool::new();
        let monitor = Monitor::new(pool);
        monitor.create_event(Severity::Info, Tags::new(), text, None)
    }

    #[test]
    fn events_end_up_in_finalized_files() {
        let dir = tempdir();
        let mut config = TextFileConfig::new(dir.path());
        config.max_count_per_file = 1;
        let mut handler = TextFileHandler::new(config, &services()).unwrap();
        handler.activate().unwrap();
        handler.handle(&event("first line")).unwrap();
        handler.handle(&event("second line")).unwrap();
        handler.deactivate().unwrap();

        let mut contents = Vec::new();
        for entry in fs::read_dir(dir.path()).unwrap() {
            contents.push(fs::read_to_string(entry.unwrap().path()).unwrap());
        }
        assert_eq!(contents.len(), 2);
        assert!(contents.iter().any(|c| c.contains("first line")));
        assert!(contents.iter().any(|c| c.contains("second line")));
    }

    #[test]
    fn configuration_with_another_path_is_declined() {
        let dir = tempdir();
        let other = tempdir();
        let mut handler =
            TextFileHandler::new(TextFileConfig::new(dir.path()), &services()).unwrap();
        handler.activate().unwrap();
        let claimed = handler
            .apply_configuration(&HandlerConfig::TextFile(TextFileConfig::new(other.path())))
            .unwrap();
        assert!(!claimed);
        let mut same = TextFileConfig::new(dir.path());
        same.max_count_per_file = 7;
        let claimed = handler
            .apply_configuration(&HandlerConfig::TextFile(same))
            .unwrap();
        assert!(claimed);
        assert_eq!(handler.config.max_count_per_file, 7);
    }

    #[test]
    fn housekeeping_runs_on_the_configured_cadence() {
        let dir = tempdir();
        let mut config = TextFileConfig::new(dir.path());
        config.housekeeping_rate = 3;
        config.minimum_time_to_keep_secs = 60;
        let mut handler = TextFileHandler::new(config, &services()).unwrap();
        handler.activate().unwrap();

        // Plant a stale file that only housekeeping would remove.
        let stale = dir.path().join(format!(
            "{}.ckmon",
            crate::stamp::format_stamp(chrono::Utc::now() - Duration::days(30))
        ));
        fs::write(&stale, b"old").unwrap();

        let tick = std::time::Duration::from_millis(500);
        handler.on_timer(tick).unwrap();
        handler.on_timer(tick).unwrap();
        assert!(stale.exists());
        handler.on_timer(tick).unwrap();
        assert!(!stale.exists());
    }

    #[test]
    fn activation_cycles_roll_timed_folders_into_the_archive() {
        let dir = tempdir();
        let mut config = TextFileConfig::new(dir.path());
        config.max_count_per_file = 1;
        config.max_current_log_folder_count = 2;
        config.max_archived_log_folder_count = 5;
        let mut handler = TextFileHandler::new(config, &services()).unwrap();

        for cycle in 0..8 {
            handler.activate().unwrap();
            handler.handle(&event(&format!("cycle {}", cycle))).unwrap();
            handler.deactivate().unwrap();
        }

        let archive = dir.path().join(crate::folders::ARCHIVE_FOLDER_NAME);
        let timed_at = |path: &std::path::Path, allow_suffix: bool| {
            fs::read_dir(path)
                .unwrap()
                .map(|e| e.unwrap())
                .filter(|e| {
                    e.path().is_dir()
                        && e.file_name()
                            .to_str()
                            .and_then(|n| {
                                crate::folders::is_timed_folder_name(n, allow_suffix)
                            })
                            .is_some()
                })
                .count()
        };
        assert!(timed_at(dir.path(), false) <= 2);
        assert!(archive.is_dir());
        assert!(timed_at(&archive, true) <= 5);
        assert!(timed_at(&archive, true) >= 1);
    }

    fn tempdir() -> TempDir {
        TempDirBuilder::new()
            .prefix("logmux_test")
            .tempdir()
            .expect("Cannot create a temporary directory")
    }
}
