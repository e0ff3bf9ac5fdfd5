//! A structured-logging runtime.
//!
//! Many producer threads submit pooled [`LogEvent`]s to a [`DispatcherSink`];
//! a single worker thread fans each event out to a dynamic set of
//! [`Handler`]s. The built-in text-file handler persists events through a
//! rotating, optionally gzip-compressed file output with timed folders,
//! archival and housekeeping.
//!
//! ```no_run
//! use logmux::{DispatcherSinkBuilder, EventPool, Monitor, Severity, SinkConfiguration, Tags};
//! use logmux::config::{HandlerConfig, TextFileConfig};
//!
//! let pool = EventPool::new();
//! let mut config = SinkConfiguration::default();
//! config.handlers.push(HandlerConfig::TextFile(TextFileConfig::new("/var/log/myapp")));
//!
//! let sink = DispatcherSinkBuilder::new().start(pool.clone(), config);
//! let monitor = Monitor::new(pool);
//! let event = monitor.create_event(Severity::Info, Tags::new(), "hello", None);
//! if let Err(rejected) = sink.try_submit(event) {
//!     rejected.release();
//! }
//! sink.stop();
//! ```
#[macro_use]
extern crate slog;
#[macro_use]
extern crate trackable;

pub use crate::config::SinkConfiguration;
pub use crate::error::{Error, ErrorKind};
pub use crate::event::{EventPool, LogEvent, Monitor, Tags};
pub use crate::handler::{Handler, HandlerList, SinkServices};
pub use crate::identity::IdentityCard;
pub use crate::sink::{DispatcherSink, DispatcherSinkBuilder, WaitHandle};
pub use crate::types::Severity;

pub mod config;
pub mod event;
pub mod folders;
pub mod handler;
pub mod handlers;
pub mod housekeeping;
pub mod identity;
pub mod output;
pub mod sink;
pub mod stamp;

mod error;
mod types;

pub type Result<T> = std::result::Result<T, Error>;
