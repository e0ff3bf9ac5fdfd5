//! Built-in handlers.
pub mod console;
pub mod text_file;

pub use self::console::ConsoleHandler;
pub use self::text_file::TextFileHandler;

use crate::event::LogEvent;
use std::fmt::Write as _;

/// Renders an event as `{log_time} [{level}] [{tags}] {text}`, followed by
/// the indented lines of the attached error, if any.
pub(crate) fn format_event_line(event: &LogEvent) -> String {
    let mut line = String::new();
    let _ = writeln!(
        line,
        "{} [{}] [{}] {}",
        event.log_time().format("%Y-%m-%d %H:%M:%S%.3f"),
        event.level().as_str(),
        event.tags(),
        event.text()
    );
    if let Some(exception) = event.exception_text() {
        for detail in exception.lines() {
            let _ = writeln!(line, "  | {}", detail);
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventPool, Monitor, Tags};
    use crate::types::Severity;

    #[test]
    fn formatted_line_carries_level_tags_and_error() {
        let pool = EventPool::new();
        let monitor = Monitor::new(pool);
        let event = monitor.create_event(
            Severity::Error,
            Tags::from_names(&["db"]),
            "query failed",
            Some("timeout\nafter 3 retries"),
        );
        let line = format_event_line(&event);
        assert!(line.contains("[error] [db] query failed"));
        assert!(line.contains("  | timeout"));
        assert!(line.contains("  | after 3 retries"));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn empty_tag_sets_render_as_empty_brackets() {
        let pool = EventPool::new();
        let monitor = Monitor::new(pool);
        let event = monitor.create_event(Severity::Info, Tags::new(), "plain", None);
        let line = format_event_line(&event);
        assert!(line.contains("[info] [] plain"));
        assert_eq!(line.lines().count(), 1);
    }
}
