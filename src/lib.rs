//! reopen-logger - leveled logging to files that follow external rotation
//!
//! A [`Logger`] filters by [`Level`], formats each call into one line and
//! writes it to its destination. File destinations reopen their path when the
//! process receives SIGHUP (or a [`ReopenTrigger`] fires), and buffered file
//! destinations are flushed on a timer.

pub mod config;
pub mod error;
pub mod format;
pub mod level;
pub mod logger;
pub mod signal;
pub mod writer;

pub use error::{LogError, Result};
pub use format::{Formatter, LineFormatter, LogEntry};
pub use level::{check_level, parse_level, Level};
pub use logger::{Logger, LoggerBuilder};
pub use signal::{ReopenSource, ReopenTrigger};
pub use writer::{BufferedFileWriter, Destination, ReopenableFileWriter, StreamWriter};
