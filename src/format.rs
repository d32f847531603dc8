//! Line formatting for log entries
//!
//! The logger hands every entry to a [`Formatter`]; the default
//! [`LineFormatter`] produces lines like:
//!
//! ```text
//! [2026-01-21T14:30:45.123Z #4242]  WARN -- : disk almost full
//! ```

use chrono::{DateTime, Utc};

use crate::level::Level;

/// Timestamp layout: ISO 8601 with milliseconds, always UTC
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// A single log call, alive only while it is being formatted
#[derive(Debug, Clone, Copy)]
pub struct LogEntry<'a> {
    /// When the call was made
    pub timestamp: DateTime<Utc>,
    /// Id of the emitting process
    pub pid: u32,
    /// Severity
    pub level: Level,
    /// Fully rendered message text
    pub message: &'a str,
}

impl<'a> LogEntry<'a> {
    /// Create an entry stamped with the current time and process id
    pub fn now(level: Level, message: &'a str) -> Self {
        Self {
            timestamp: Utc::now(),
            pid: std::process::id(),
            level,
            message,
        }
    }
}

/// Turns one entry into one newline-terminated line
///
/// Implementations must be deterministic and must not fail.
pub trait Formatter: Send + Sync {
    fn format(&self, entry: &LogEntry<'_>) -> Vec<u8>;
}

impl<F> Formatter for F
where
    F: Fn(&LogEntry<'_>) -> Vec<u8> + Send + Sync,
{
    fn format(&self, entry: &LogEntry<'_>) -> Vec<u8> {
        self(entry)
    }
}

/// Default formatter: `[<time> #<pid>] <LEVEL> -- : <message>`
#[derive(Debug, Clone, Copy, Default)]
pub struct LineFormatter;

impl LineFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl Formatter for LineFormatter {
    fn format(&self, entry: &LogEntry<'_>) -> Vec<u8> {
        format!(
            "[{} #{}] {:>5} -- : {}\n",
            entry.timestamp.format(TIMESTAMP_FORMAT),
            entry.pid,
            entry.level.tag(),
            entry.message,
        )
        .into_bytes()
    }
}
