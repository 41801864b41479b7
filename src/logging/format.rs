//! Line rendering for log entries
//!
//! Layout of a rendered line:
//!
//! ```text
//! <timestamp-ms> G<thread-id:07> [<trace-id> ][<LVL>] [<component>] <message>
//! ```
//!
//! No trailing newline is produced here; the writer terminates lines.

use std::cell::Cell;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};

use crate::context::LogContext;

/// Component name used when the context carries none
pub const DEFAULT_COMPONENT: &str = "Main";

/// Timestamp layout with millisecond precision
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Log level of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Fixed three-letter tag written into each line
    pub fn tag(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DBG",
            LogLevel::Info => "INF",
            LogLevel::Warn => "WRN",
            LogLevel::Error => "ERR",
        }
    }
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: Cell<u64> = const { Cell::new(0) };
}

/// Numeric identifier of the calling thread, stable for the thread's lifetime
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| {
        if id.get() == 0 {
            id.set(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
        }
        id.get()
    })
}

/// A single log entry, borrowed from the call site and rendered immediately
#[derive(Debug, Clone)]
pub struct LogEntry<'a> {
    pub timestamp: DateTime<Local>,
    pub thread_id: u64,
    pub level: LogLevel,
    pub trace_id: Option<&'a str>,
    pub component: &'a str,
    pub message: &'a str,
}

impl<'a> LogEntry<'a> {
    /// Capture an entry for the calling thread at the current time
    ///
    /// `default_component` is used when the context has no component name.
    pub fn capture(
        level: LogLevel,
        ctx: &'a LogContext,
        default_component: &'a str,
        message: &'a str,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            thread_id: current_thread_id(),
            level,
            trace_id: ctx.trace_id(),
            component: ctx.component().unwrap_or(default_component),
            message,
        }
    }

    /// Render the entry to one line without a terminator
    pub fn render(&self) -> String {
        let mut line = String::with_capacity(64 + self.message.len());
        let _ = write!(
            line,
            "{} G{:07} ",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.thread_id
        );
        if let Some(trace_id) = self.trace_id.filter(|t| !t.is_empty()) {
            line.push_str(trace_id);
            line.push(' ');
        }
        let _ = write!(line, "[{}] [{}] ", self.level.tag(), self.component);
        line.push_str(self.message);
        line
    }
}

/// Render a message for the calling thread in one step
pub fn format_message(level: LogLevel, ctx: &LogContext, message: &str) -> String {
    LogEntry::capture(level, ctx, DEFAULT_COMPONENT, message).render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use regex::Regex;

    fn fixed_entry<'a>(trace_id: Option<&'a str>, component: &'a str) -> LogEntry<'a> {
        LogEntry {
            timestamp: Local.with_ymd_and_hms(2026, 1, 21, 14, 30, 45).unwrap()
                + chrono::Duration::milliseconds(123),
            thread_id: 42,
            level: LogLevel::Info,
            trace_id,
            component,
            message: "hello world",
        }
    }

    #[test]
    fn test_render_exact_layout() {
        let line = fixed_entry(Some("T1"), "C1").render();
        assert_eq!(
            line,
            "2026-01-21 14:30:45.123 G0000042 T1 [INF] [C1] hello world"
        );
    }

    #[test]
    fn test_render_without_trace_id() {
        let line = fixed_entry(None, "C1").render();
        assert_eq!(line, "2026-01-21 14:30:45.123 G0000042 [INF] [C1] hello world");
        assert!(!line.contains("  "));
    }

    #[test]
    fn test_render_empty_trace_id_is_dropped() {
        let line = fixed_entry(Some(""), "C1").render();
        assert!(line.contains("G0000042 [INF]"));
    }

    #[test]
    fn test_thread_id_wider_than_padding() {
        let mut entry = fixed_entry(None, "C1");
        entry.thread_id = 123_456_789;
        assert!(entry.render().contains(" G123456789 "));
    }

    #[test]
    fn test_all_levels_with_context() {
        let ctx = LogContext::new().with_trace_id("T1").with_component("C1");
        let pattern =
            Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{3} G\d{7} T1 \[(DBG|INF|WRN|ERR)\] \[C1\] msg$")
                .unwrap();

        for (level, tag) in [
            (LogLevel::Debug, "DBG"),
            (LogLevel::Info, "INF"),
            (LogLevel::Warn, "WRN"),
            (LogLevel::Error, "ERR"),
        ] {
            let line = format_message(level, &ctx, "msg");
            let caps = pattern.captures(&line).expect("line should match layout");
            assert_eq!(&caps[1], tag);
        }
    }

    #[test]
    fn test_default_component() {
        let line = format_message(LogLevel::Warn, &LogContext::new(), "msg");
        assert!(line.contains(&format!("[WRN] [{}] msg", DEFAULT_COMPONENT)));
    }

    #[test]
    fn test_no_trailing_newline() {
        let line = format_message(LogLevel::Debug, &LogContext::new(), "msg\n");
        assert!(line.ends_with("msg\n"));
        let line = format_message(LogLevel::Debug, &LogContext::new(), "msg");
        assert!(!line.ends_with('\n'));
    }

    #[test]
    fn test_thread_id_stable_per_thread() {
        let here = current_thread_id();
        assert_eq!(here, current_thread_id());
        let other = std::thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(here, other);
    }
}
