//! The public logging façade
//!
//! A [`Logger`] owns one destination, a level threshold and a formatter.
//! An optional error destination additionally receives every line at `warn`
//! and above. Logging calls never fail: write errors are dropped so that
//! logging cannot disrupt the caller.

use std::fmt::Display;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{LogError, Result};
use crate::format::{Formatter, LineFormatter, LogEntry};
use crate::level::{parse_level, AtomicLevel, Level};
use crate::signal::{spawn_coordinator, CoordinatorHandle, ReopenSource, DEFAULT_FLUSH_INTERVAL};
use crate::writer::{
    ensure_parent_dir, lock, BufferedFileWriter, Destination, ReopenableFileWriter, StreamWriter,
};

/// Threshold used when no level name is given
const DEFAULT_LEVEL: Level = Level::Warn;

/// Lowest level copied to the error destination
const ERROR_LEVEL: Level = Level::Warn;

/// Leveled logger writing formatted lines to a single destination
pub struct Logger {
    level: AtomicLevel,
    formatter: Box<dyn Formatter>,
    destination: Arc<dyn Destination>,
    error_destination: Option<Arc<dyn Destination>>,
    /// Set when the destination is buffered, for explicit `flush`
    buffered: Option<Arc<BufferedFileWriter>>,
    coordinator: Mutex<Option<CoordinatorHandle>>,
}

impl Logger {
    /// Start building a logger
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::new()
    }

    /// Logger over an arbitrary writer
    pub fn new(out: impl Write + Send + 'static, level: Option<&str>) -> Result<Self> {
        Self::builder()
            .writer(out)
            .maybe_level(level)
            .build()
    }

    /// Logger writing to standard output
    pub fn terminal(level: Option<&str>) -> Result<Self> {
        Self::builder()
            .destination(Arc::new(StreamWriter::stdout()))
            .maybe_level(level)
            .build()
    }

    /// Logger appending to `path`, reopening it on SIGHUP
    pub fn file(path: impl Into<PathBuf>, level: Option<&str>) -> Result<Self> {
        Self::builder().file(path).maybe_level(level).build()
    }

    /// Like [`Logger::file`], but buffered and flushed every 10 seconds
    pub fn buffered_file(path: impl Into<PathBuf>, level: Option<&str>) -> Result<Self> {
        Self::builder().buffered_file(path).maybe_level(level).build()
    }

    /// Current threshold
    pub fn level(&self) -> Level {
        self.level.get()
    }

    /// Replace the threshold, rejecting unknown names without changing anything
    pub fn set_level(&self, name: &str) -> Result<()> {
        self.level.set(parse_level(name)?);
        Ok(())
    }

    /// Strict variant of [`Logger::set_level`]: an unknown name is fatal
    pub fn set_level_or_exit(&self, name: &str) {
        if let Err(e) = self.set_level(name) {
            self.fatal(e);
        }
    }

    /// Whether a message at `level` would be written
    pub fn enabled(&self, level: Level) -> bool {
        level.passes(self.level())
    }

    /// Format and write `message` if `level` passes the threshold
    pub fn log(&self, level: Level, message: impl Display) {
        if !self.enabled(level) {
            return;
        }
        let message = message.to_string();
        let line = self.formatter.format(&LogEntry::now(level, &message));
        let _ = self.destination.write(&line);

        if level >= ERROR_LEVEL {
            if let Some(errors) = &self.error_destination {
                let _ = errors.write(&line);
            }
        }
    }

    pub fn debug(&self, message: impl Display) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: impl Display) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: impl Display) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: impl Display) {
        self.log(Level::Error, message);
    }

    /// Write at fatal level, flush, and exit the process with status 1
    ///
    /// The process exits whether or not the write succeeded.
    pub fn fatal(&self, message: impl Display) -> ! {
        self.log(Level::Fatal, message);
        let _ = self.destination.flush();
        if let Some(errors) = &self.error_destination {
            let _ = errors.flush();
        }
        std::process::exit(1);
    }

    /// Flush buffered lines; a no-op for unbuffered destinations
    pub fn flush(&self) {
        if let Some(buffered) = &self.buffered {
            let _ = buffered.flush();
        }
    }

    /// Most recent failure of a background reopen or flush, if any
    pub fn last_background_error(&self) -> Option<String> {
        lock(&self.coordinator)
            .as_ref()
            .and_then(CoordinatorHandle::last_error)
    }

    /// Stop the background coordinator and flush
    ///
    /// The logger keeps working afterwards but no longer reacts to reopen
    /// requests or the flush timer.
    pub fn close(&self) {
        if let Some(mut coordinator) = lock(&self.coordinator).take() {
            coordinator.shutdown();
        }
        let _ = self.destination.flush();
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Where a logger's destination comes from
enum Target {
    Destination(Arc<dyn Destination>),
    File(PathBuf),
    BufferedFile(PathBuf),
}

/// Builder for [`Logger`]
///
/// Without a level the logger starts at `warn`. File targets get a
/// coordinator listening on SIGHUP unless another reopen source is given.
pub struct LoggerBuilder {
    level: Option<String>,
    formatter: Option<Box<dyn Formatter>>,
    target: Option<Target>,
    error_destination: Option<Arc<dyn Destination>>,
    reopen_source: Option<ReopenSource>,
    flush_interval: Duration,
    flush_threshold: Option<usize>,
}

impl LoggerBuilder {
    pub fn new() -> Self {
        Self {
            level: None,
            formatter: None,
            target: None,
            error_destination: None,
            reopen_source: None,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            flush_threshold: None,
        }
    }

    /// Initial threshold, validated in `build`
    pub fn level(self, name: impl Into<String>) -> Self {
        Self {
            level: Some(name.into()),
            ..self
        }
    }

    fn maybe_level(self, name: Option<&str>) -> Self {
        match name {
            Some(name) => self.level(name),
            None => self,
        }
    }

    /// Replace the default [`LineFormatter`]
    pub fn formatter(self, formatter: impl Formatter + 'static) -> Self {
        Self {
            formatter: Some(Box::new(formatter)),
            ..self
        }
    }

    /// Write to an existing destination
    pub fn destination(self, destination: Arc<dyn Destination>) -> Self {
        Self {
            target: Some(Target::Destination(destination)),
            ..self
        }
    }

    /// Write to any `Write` sink
    pub fn writer(self, out: impl Write + Send + 'static) -> Self {
        self.destination(Arc::new(StreamWriter::new(out)))
    }

    /// Also send `warn`, `error` and `fatal` lines to `destination`
    pub fn error_destination(self, destination: Arc<dyn Destination>) -> Self {
        Self {
            error_destination: Some(destination),
            ..self
        }
    }

    /// Also send `warn`, `error` and `fatal` lines to a `Write` sink
    pub fn error_writer(self, out: impl Write + Send + 'static) -> Self {
        self.error_destination(Arc::new(StreamWriter::new(out)))
    }

    /// Append to a reopenable file
    pub fn file(self, path: impl Into<PathBuf>) -> Self {
        Self {
            target: Some(Target::File(path.into())),
            ..self
        }
    }

    /// Append to a reopenable file through an in-memory buffer
    pub fn buffered_file(self, path: impl Into<PathBuf>) -> Self {
        Self {
            target: Some(Target::BufferedFile(path.into())),
            ..self
        }
    }

    /// What triggers a reopen of file targets
    pub fn reopen_source(self, source: ReopenSource) -> Self {
        Self {
            reopen_source: Some(source),
            ..self
        }
    }

    /// Period of automatic flushes for buffered files
    pub fn flush_interval(self, interval: Duration) -> Self {
        Self {
            flush_interval: interval,
            ..self
        }
    }

    /// Pending size at which a buffered file drains without waiting for a flush
    pub fn flush_threshold(self, bytes: usize) -> Self {
        Self {
            flush_threshold: Some(bytes),
            ..self
        }
    }

    /// Validate the level, open the destination and start its coordinator
    pub fn build(self) -> Result<Logger> {
        let level = match &self.level {
            Some(name) => parse_level(name)?,
            None => DEFAULT_LEVEL,
        };
        let source = self.reopen_source.unwrap_or_default();

        let (destination, buffered, coordinator) =
            match self.target.ok_or(LogError::DestinationRequired)? {
                Target::Destination(destination) => (destination, None, None),
                Target::File(path) => {
                    ensure_parent_dir(&path)?;
                    let writer: Arc<dyn Destination> =
                        Arc::new(ReopenableFileWriter::open(path)?);
                    let coordinator = spawn_coordinator(Arc::clone(&writer), source, None)?;
                    (writer, None, Some(coordinator))
                }
                Target::BufferedFile(path) => {
                    ensure_parent_dir(&path)?;
                    let inner = ReopenableFileWriter::open(path)?;
                    let writer = Arc::new(match self.flush_threshold {
                        Some(bytes) => BufferedFileWriter::with_flush_threshold(inner, bytes),
                        None => BufferedFileWriter::new(inner),
                    });
                    let coordinator =
                        spawn_coordinator(writer.clone(), source, Some(self.flush_interval))?;
                    let destination: Arc<dyn Destination> = writer.clone();
                    (destination, Some(writer), Some(coordinator))
                }
            };

        Ok(Logger {
            level: AtomicLevel::new(level),
            formatter: self
                .formatter
                .unwrap_or_else(|| Box::new(LineFormatter::new())),
            destination,
            error_destination: self.error_destination,
            buffered,
            coordinator: Mutex::new(coordinator),
        })
    }
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Log at debug level with `format!`-style arguments
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $logger.debug(format_args!($($arg)+))
    };
}

/// Log at info level with `format!`-style arguments
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $logger.info(format_args!($($arg)+))
    };
}

/// Log at warn level with `format!`-style arguments
#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)+) => {
        $logger.warn(format_args!($($arg)+))
    };
}

/// Log at error level with `format!`-style arguments
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $logger.error(format_args!($($arg)+))
    };
}

/// Log at fatal level with `format!`-style arguments, then exit
#[macro_export]
macro_rules! fatal {
    ($logger:expr, $($arg:tt)+) => {
        $logger.fatal(format_args!($($arg)+))
    };
}
