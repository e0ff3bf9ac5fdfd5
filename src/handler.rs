//! Output handlers and the worker-owned handler list.
use slog::Logger;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::HandlerConfig;
use crate::event::LogEvent;
use crate::handlers::console::ConsoleHandler;
use crate::handlers::text_file::TextFileHandler;
use crate::identity::IdentityCard;
use crate::Result;

/// An output sink consuming dispatched events.
///
/// Lifecycle: `activate`, then any number of `handle` / `on_timer` /
/// `apply_configuration` calls, then `deactivate`. All calls happen on the
/// dispatcher worker. A handler returning an error from `handle`, `on_timer`
/// or `apply_configuration` is considered faulty: it is deactivated
/// (best-effort) and removed from the list.
pub trait Handler: Send {
    /// The identity used to match reconfigurations, typically a path or name.
    fn identity(&self) -> &str;

    /// Prepares the handler for receiving events.
    fn activate(&mut self) -> Result<()>;

    /// Releases the handler's resources.
    fn deactivate(&mut self) -> Result<()>;

    /// Consumes one event.
    fn handle(&mut self, event: &LogEvent) -> Result<()>;

    /// Periodic maintenance; `elapsed` is the configured timer duration.
    fn on_timer(&mut self, elapsed: Duration) -> Result<()>;

    /// Tries to adopt `config`.
    ///
    /// Returns `Ok(true)` when the configuration addresses this handler (the
    /// reconciler then keeps the handler alive), `Ok(false)` when it does
    /// not, and an error when the handler failed while applying it.
    fn apply_configuration(&mut self, config: &HandlerConfig) -> Result<bool>;
}

/// Shared services available to handler factories.
#[derive(Clone)]
pub struct SinkServices {
    /// Diagnostics logger of the owning sink.
    pub logger: Logger,

    /// The process identity card maintained by the sink worker.
    pub identity_card: Arc<Mutex<IdentityCard>>,
}

/// Instantiates a handler from its configuration.
pub type HandlerFactory = fn(&HandlerConfig, &SinkServices) -> Result<Box<dyn Handler>>;

/// The default factory, covering the built-in handler kinds.
pub fn default_handler_factory(
    config: &HandlerConfig,
    services: &SinkServices,
) -> Result<Box<dyn Handler>> {
    match config {
        HandlerConfig::TextFile(c) => {
            let handler = track!(TextFileHandler::new(c.clone(), services))?;
            Ok(Box::new(handler))
        }
        HandlerConfig::Console(c) => Ok(Box::new(ConsoleHandler::new(c.clone()))),
    }
}

/// The active set of handlers, owned and mutated only by the worker.
pub struct HandlerList {
    logger: Logger,
    handlers: Vec<Box<dyn Handler>>,
}

impl HandlerList {
    pub(crate) fn new(logger: Logger) -> Self {
        HandlerList {
            logger,
            handlers: Vec::new(),
        }
    }

    /// The number of active handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` when no handler is active.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// The identities of the active handlers, in dispatch order.
    pub fn identities(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.identity().to_owned()).collect()
    }

    /// Activates `handler` and appends it on success.
    pub fn add(&mut self, mut handler: Box<dyn Handler>) {
        match handler.activate() {
            Ok(()) => self.handlers.push(handler),
            Err(e) => {
                error!(self.logger, "handler activation failed, not added";
                       "handler" => handler.identity(), "error" => %e);
            }
        }
    }

    /// Deactivates and removes the handler with the given identity.
    pub fn remove(&mut self, identity: &str) {
        let mut index = 0;
        while index < self.handlers.len() {
            if self.handlers[index].identity() == identity {
                let mut handler = self.handlers.remove(index);
                if let Err(e) = handler.deactivate() {
                    warn!(self.logger, "handler deactivation failed";
                          "handler" => identity, "error" => %e);
                }
            } else {
                index += 1;
            }
        }
    }

    pub(crate) fn dispatch(&mut self, event: &LogEvent) {
        let mut faulty = Vec::new();
        for (index, handler) in self.handlers.iter_mut().enumerate() {
            if let Err(e) = handler.handle(event) {
                crit!(self.logger, "handler failed while handling an event";
                      "handler" => handler.identity(), "error" => %e);
                faulty.push(index);
            }
        }
        self.discard_faulty(faulty);
    }

    pub(crate) fn on_timer(&mut self, elapsed: Duration) {
        let mut faulty = Vec::new();
        for (index, handler) in self.handlers.iter_mut().enumerate() {
            if let Err(e) = handler.on_timer(elapsed) {
                crit!(self.logger, "handler failed in its timer callback";
                      "handler" => handler.identity(), "error" => %e);
                faulty.push(index);
            }
        }
        self.discard_faulty(faulty);
    }

    pub(crate) fn deactivate_all(&mut self) {
        for mut handler in self.handlers.drain(..) {
            if let Err(e) = handler.deactivate() {
                warn!(self.logger, "handler deactivation failed";
                      "handler" => handler.identity(), "error" => %e);
            }
        }
    }

    pub(crate) fn take_all(&mut self) -> Vec<Box<dyn Handler>> {
        std::mem::take(&mut self.handlers)
    }

    pub(crate) fn set_all(&mut self, handlers: Vec<Box<dyn Handler>>) {
        self.handlers = handlers;
    }

    fn discard_faulty(&mut self, faulty: Vec<usize>) {
        for index in faulty.into_iter().rev() {
            let mut handler = self.handlers.remove(index);
            if let Err(e) = handler.deactivate() {
                warn!(self.logger, "deactivation of a faulty handler failed";
                      "handler" => handler.identity(), "error" => %e);
            }
        }
    }
}

impl std::fmt::Debug for HandlerList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerList")
            .field("handlers", &self.identities())
            .finish()
    }
}
