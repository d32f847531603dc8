//! In-memory buffering in front of a reopenable file
//!
//! Lines accumulate in memory and reach the file only on `flush` or `reopen`
//! (or when an optional size threshold is crossed). Anything still pending
//! when the process dies abnormally is lost, so callers pair this writer
//! with a periodic flush.
//!
//! Pending data is capped. While the file keeps refusing writes, lines that
//! would push the buffer past the cap are dropped and counted.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::warn;

use super::{lock, Destination, ReopenableFileWriter};

/// Default capacity reserved for the pending buffer
const INITIAL_CAPACITY: usize = 64 * 1024;

/// Default upper bound on pending bytes
pub const DEFAULT_MAX_PENDING: usize = 16 * INITIAL_CAPACITY;

/// Buffers lines in memory before handing them to a [`ReopenableFileWriter`]
#[derive(Debug)]
pub struct BufferedFileWriter {
    inner: ReopenableFileWriter,
    /// Guards the buffer and, by nesting, every use of `inner`
    pending: Mutex<Vec<u8>>,
    flush_threshold: Option<usize>,
    max_pending: usize,
    dropped: AtomicU64,
}

impl BufferedFileWriter {
    /// Buffer until `flush`/`reopen`, up to [`DEFAULT_MAX_PENDING`] bytes
    pub fn new(inner: ReopenableFileWriter) -> Self {
        Self {
            inner,
            pending: Mutex::new(Vec::with_capacity(INITIAL_CAPACITY)),
            flush_threshold: None,
            max_pending: DEFAULT_MAX_PENDING,
            dropped: AtomicU64::new(0),
        }
    }

    /// Drain automatically once `threshold` bytes are pending
    pub fn with_flush_threshold(inner: ReopenableFileWriter, threshold: usize) -> Self {
        Self {
            flush_threshold: Some(threshold),
            ..Self::new(inner)
        }
    }

    /// Replace the cap on pending bytes
    pub fn max_pending(self, bytes: usize) -> Self {
        Self {
            max_pending: bytes,
            ..self
        }
    }

    /// The wrapped file writer
    pub fn inner(&self) -> &ReopenableFileWriter {
        &self.inner
    }

    /// Number of bytes written but not yet flushed
    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Number of lines refused because the buffer was full
    pub fn dropped_lines(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Move pending bytes to the file
    ///
    /// Only the prefix the file accepted leaves the buffer, so a retry
    /// continues exactly where a failed write stopped.
    fn drain(&self, pending: &mut Vec<u8>) -> io::Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        let (written, result) = self.inner.write_prefix(pending);
        pending.drain(..written);
        result
    }
}

impl Destination for BufferedFileWriter {
    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let mut pending = lock(&self.pending);

        if pending.len() + bytes.len() > self.max_pending {
            let drained = self.drain(&mut pending);
            if pending.len() + bytes.len() > self.max_pending {
                if self.dropped.fetch_add(1, Ordering::Relaxed) == 0 {
                    warn!("Log buffer full, dropping lines");
                }
                return Err(drained.err().unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::Other, "log buffer full, line dropped")
                }));
            }
        }

        pending.extend_from_slice(bytes);

        match self.flush_threshold {
            Some(threshold) if pending.len() >= threshold => self.drain(&mut pending),
            _ => Ok(()),
        }
    }

    fn flush(&self) -> io::Result<()> {
        let mut pending = lock(&self.pending);
        self.drain(&mut pending)
    }

    /// Flush into the current file, then reopen
    ///
    /// The reopen is attempted even if the flush fails; the flush error wins.
    fn reopen(&self) -> io::Result<()> {
        let mut pending = lock(&self.pending);
        let flushed = self.drain(&mut pending);
        self.inner.reopen()?;
        flushed
    }
}
