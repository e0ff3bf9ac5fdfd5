//! Configuration of the dispatcher sink and its handlers.
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::Severity;

/// The configuration applied to a [`DispatcherSink`](crate::DispatcherSink).
///
/// Applying a new configuration reconciles the handler list: handlers whose
/// configuration is unchanged keep running without interruption, dropped
/// handlers are deactivated, and new entries are instantiated through the
/// sink's handler factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfiguration {
    /// Events below this severity are released without being dispatched.
    #[serde(default = "default_minimal_filter")]
    pub minimal_filter: Severity,

    /// Period of the handlers' `on_timer` callback, in milliseconds.
    #[serde(default = "default_timer_duration_ms")]
    pub timer_duration_ms: u64,

    /// Whether the sink reports unhandled panics as error events.
    #[serde(default)]
    pub track_panics: bool,

    /// The ordered handler configurations.
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

impl Default for SinkConfiguration {
    fn default() -> Self {
        SinkConfiguration {
            minimal_filter: default_minimal_filter(),
            timer_duration_ms: default_timer_duration_ms(),
            track_panics: false,
            handlers: Vec::new(),
        }
    }
}

/// The configuration of one handler.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum HandlerConfig {
    TextFile(TextFileConfig),
    Console(ConsoleConfig),
}

/// The configuration of the built-in text-file handler.
///
/// The handler's identity is its `path`; a reconfiguration with the same
/// path is applied in place, without interrupting the produced files beyond
/// what the changed settings require.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextFileConfig {
    /// Root directory receiving the log files.
    pub path: PathBuf,

    /// Number of events per file before rotation.
    #[serde(default = "default_max_count_per_file")]
    pub max_count_per_file: u32,

    /// Whether finalized files are gzip-compressed.
    #[serde(default)]
    pub use_gzip_compression: bool,

    /// Suffix of produced files, including the format marker.
    #[serde(default = "default_file_name_suffix")]
    pub file_name_suffix: String,

    /// Timed-folder mode: maximum number of stamp-named folders kept under
    /// the root; `0` writes files directly into the root.
    #[serde(default)]
    pub max_current_log_folder_count: u32,

    /// Maximum number of folders kept in `Archive/`; `0` keeps all.
    #[serde(default)]
    pub max_archived_log_folder_count: u32,

    /// Whether a symbolic link tracks the most recent finalized file.
    #[serde(default)]
    pub with_last_run_symlink: bool,

    /// Name of that symbolic link, under the root.
    #[serde(default = "default_last_run_file_name")]
    pub last_run_file_name: String,

    /// Number of timer ticks between housekeeping runs; `0` disables it.
    #[serde(default)]
    pub housekeeping_rate: u32,

    /// Minimum age, in seconds, a file must reach before housekeeping may
    /// delete it.
    #[serde(default)]
    pub minimum_time_to_keep_secs: u64,

    /// Total bytes housekeeping tries to keep across all produced files.
    #[serde(default)]
    pub maximum_total_bytes_to_keep: u64,
}

impl TextFileConfig {
    /// Makes a configuration with default settings rooted at `path`.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        TextFileConfig {
            path: path.into(),
            max_count_per_file: default_max_count_per_file(),
            use_gzip_compression: false,
            file_name_suffix: default_file_name_suffix(),
            max_current_log_folder_count: 0,
            max_archived_log_folder_count: 0,
            with_last_run_symlink: false,
            last_run_file_name: default_last_run_file_name(),
            housekeeping_rate: 0,
            minimum_time_to_keep_secs: 0,
            maximum_total_bytes_to_keep: 0,
        }
    }

    /// Whether files are grouped into timed folders.
    pub fn timed_folders_enabled(&self) -> bool {
        self.max_current_log_folder_count > 0
    }
}

/// The configuration of the built-in console handler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Writes to stderr instead of stdout.
    #[serde(default)]
    pub use_stderr: bool,
}

fn default_minimal_filter() -> Severity {
    Severity::Trace
}

fn default_timer_duration_ms() -> u64 {
    500
}

fn default_max_count_per_file() -> u32 {
    20_000
}

fn default_file_name_suffix() -> String {
    ".ckmon".to_owned()
}

fn default_last_run_file_name() -> String {
    "LastRun.log".to_owned()
}
