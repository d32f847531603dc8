//! File writer that can swap its handle for a fresh one at the same path
//!
//! External rotation tools move the active file aside and then ask the
//! process to reopen. Until `reopen` runs, writes keep following the moved
//! file through the still-open handle.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use super::{lock, Destination};
use crate::error::{LogError, Result};

/// Append-only file handle that can be reacquired on demand
#[derive(Debug)]
pub struct ReopenableFileWriter {
    path: PathBuf,
    file: Mutex<File>,
}

impl ReopenableFileWriter {
    /// Open (creating if needed) `path` for appending
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = open_append(&path).map_err(|e| {
            LogError::io(format!("Failed to open log file {}", path.display()), e)
        })?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path this writer (re)opens
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write as much of `bytes` as the file accepts
    ///
    /// Returns how many leading bytes reached the file together with the
    /// error that stopped the write, if any.
    pub fn write_prefix(&self, bytes: &[u8]) -> (usize, io::Result<()>) {
        let mut file = lock(&self.file);
        let mut written = 0;

        while written < bytes.len() {
            match file.write(&bytes[written..]) {
                Ok(0) => return (written, Err(io::ErrorKind::WriteZero.into())),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return (written, Err(e)),
            }
        }

        (written, Ok(()))
    }
}

impl Destination for ReopenableFileWriter {
    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        lock(&self.file).write_all(bytes)
    }

    fn flush(&self) -> io::Result<()> {
        lock(&self.file).flush()
    }

    /// Open a new handle at the same path and swap it in
    ///
    /// The lock is held across open and swap, so no write can observe a
    /// half-replaced handle. On failure the old handle stays in place.
    fn reopen(&self) -> io::Result<()> {
        let mut file = lock(&self.file);
        let fresh = open_append(&self.path)?;
        let old = std::mem::replace(&mut *file, fresh);
        drop(old);
        debug!("Reopened log file {}", self.path.display());
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_open_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");

        let writer = ReopenableFileWriter::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(writer.path(), path.as_path());
    }

    #[test]
    fn test_open_appends_to_existing_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        std::fs::write(&path, "old\n").unwrap();

        let writer = ReopenableFileWriter::open(&path).unwrap();
        writer.write(b"new\n").unwrap();

        assert_eq!(read_lines(&path), vec!["old", "new"]);
    }

    #[test]
    fn test_open_fails_in_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("app.log");

        assert!(matches!(
            ReopenableFileWriter::open(&path),
            Err(LogError::Io { .. })
        ));
    }

    #[test]
    fn test_write_prefix_reports_accepted_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        let writer = ReopenableFileWriter::open(&path).unwrap();

        let (written, result) = writer.write_prefix(b"whole line\n");
        assert_eq!(written, 11);
        assert!(result.is_ok());
        assert_eq!(read_lines(&path), vec!["whole line"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_prefix_on_full_device() {
        let writer = ReopenableFileWriter::open("/dev/full").unwrap();

        let (written, result) = writer.write_prefix(b"no space\n");
        assert_eq!(written, 0);
        assert!(result.is_err());
    }

    #[test]
    fn test_write_follows_moved_file_until_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        let moved = temp_dir.path().join("app.log.1");

        let writer = ReopenableFileWriter::open(&path).unwrap();
        writer.write(b"before\n").unwrap();

        std::fs::rename(&path, &moved).unwrap();
        writer.write(b"after move\n").unwrap();
        assert!(!path.exists());
        assert_eq!(read_lines(&moved), vec!["before", "after move"]);

        writer.reopen().unwrap();
        writer.write(b"after reopen\n").unwrap();
        assert_eq!(read_lines(&path), vec!["after reopen"]);
        assert_eq!(read_lines(&moved), vec!["before", "after move"]);
    }

    #[test]
    fn test_reopen_keeps_old_handle_on_failure() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("logs");
        std::fs::create_dir(&dir).unwrap();
        let path = dir.join("app.log");
        let moved_dir = temp_dir.path().join("logs.old");

        let writer = ReopenableFileWriter::open(&path).unwrap();
        std::fs::rename(&dir, &moved_dir).unwrap();

        assert!(writer.reopen().is_err());
        writer.write(b"still here\n").unwrap();
        assert_eq!(read_lines(&moved_dir.join("app.log")), vec!["still here"]);
    }

    #[test]
    fn test_concurrent_writes_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        let moved = temp_dir.path().join("app.log.1");
        let writer = Arc::new(ReopenableFileWriter::open(&path).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let writer = Arc::clone(&writer);
                thread::spawn(move || {
                    for i in 0..250 {
                        let line = format!("thread-{t} line-{i} {}\n", "x".repeat(64));
                        writer.write(line.as_bytes()).unwrap();
                    }
                })
            })
            .collect();

        std::fs::rename(&path, &moved).unwrap();
        writer.reopen().unwrap();

        for handle in handles {
            handle.join().unwrap();
        }

        let mut lines = read_lines(&moved);
        lines.extend(read_lines(&path));
        assert_eq!(lines.len(), 1000);
        assert!(lines
            .iter()
            .all(|l| l.starts_with("thread-") && l.ends_with(&"x".repeat(64))));
    }
}
