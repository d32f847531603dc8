//! Severity levels and threshold filtering
//!
//! Levels are totally ordered: `Debug < Info < Warn < Error < Fatal`. A message
//! at level `L` is emitted by a logger with threshold `T` iff `L >= T`.

use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{LogError, Result};

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    /// All levels in ascending severity
    pub const ALL: [Level; 5] = [
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Fatal,
    ];

    /// Lowercase name, as accepted by [`parse_level`]
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }

    /// Uppercase tag used in formatted lines
    pub fn tag(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }

    /// Whether an entry at `self` passes a logger whose threshold is `threshold`
    pub fn passes(&self, threshold: Level) -> bool {
        *self >= threshold
    }

    fn from_u8(raw: u8) -> Level {
        match raw {
            0 => Level::Debug,
            1 => Level::Info,
            2 => Level::Warn,
            3 => Level::Error,
            _ => Level::Fatal,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self> {
        parse_level(s)
    }
}

/// Parse a case-insensitive level name
pub fn parse_level(name: &str) -> Result<Level> {
    Level::ALL
        .into_iter()
        .find(|level| level.as_str().eq_ignore_ascii_case(name))
        .ok_or_else(|| LogError::InvalidLevel(name.to_string()))
}

/// Validate a level name without using the result
pub fn check_level(name: &str) -> Result<()> {
    parse_level(name).map(|_| ())
}

/// A level threshold that can be read and replaced from any thread
#[derive(Debug)]
pub struct AtomicLevel(AtomicU8);

impl AtomicLevel {
    pub fn new(level: Level) -> Self {
        Self(AtomicU8::new(level as u8))
    }

    pub fn get(&self) -> Level {
        Level::from_u8(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, level: Level) {
        self.0.store(level as u8, Ordering::Relaxed);
    }
}
