//! Write destinations for formatted log lines
//!
//! Every destination serializes its own `write`, `flush` and `reopen` calls,
//! so a single line is never interleaved with another or split across two
//! file handles.

mod buffered;
mod reopen;

pub use buffered::{BufferedFileWriter, DEFAULT_MAX_PENDING};
pub use reopen::ReopenableFileWriter;

use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{LogError, Result};

/// A sink that accepts whole formatted lines
pub trait Destination: Send + Sync {
    /// Write one formatted line
    fn write(&self, bytes: &[u8]) -> io::Result<()>;

    /// Push any pending bytes to the underlying target
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    /// Reacquire the underlying target, if it has one
    fn reopen(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Destination over any `Write` implementation (stdout, a socket, a `Vec<u8>`)
pub struct StreamWriter<W> {
    inner: Mutex<W>,
}

impl<W: Write + Send> StreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Consume the writer and return the wrapped sink
    pub fn into_inner(self) -> W {
        self.inner
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StreamWriter<io::Stdout> {
    /// Destination writing to standard output
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> Destination for StreamWriter<W> {
    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let mut inner = lock(&self.inner);
        inner.write_all(bytes)?;
        inner.flush()
    }

    fn flush(&self) -> io::Result<()> {
        lock(&self.inner).flush()
    }
}

/// Lock a mutex, recovering the guard if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Check that the directory a log file will live in exists and is a directory
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    match std::fs::metadata(dir) {
        Err(_) => Err(LogError::DirectoryNotFound(dir.to_path_buf())),
        Ok(meta) if !meta.is_dir() => Err(LogError::NotADirectory(dir.to_path_buf())),
        Ok(_) => Ok(()),
    }
}
