//! Background coordination of reopen and periodic flush
//!
//! One coordinator thread runs per file-backed logger. It waits on its reopen
//! source (SIGHUP by default) and, for buffered destinations, on a flush
//! timer. Failures are reported through `tracing` and kept as the last
//! background error; they are never returned to logging callers.

use std::io;
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use crate::error::{LogError, Result};
use crate::writer::{lock, Destination};

/// Default period between automatic flushes of buffered destinations
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// What tells a coordinator to reopen its destination
#[derive(Debug)]
pub enum ReopenSource {
    /// The process receives SIGHUP
    #[cfg(unix)]
    Hangup,
    /// A [`ReopenTrigger`] fires
    Manual(broadcast::Receiver<()>),
    /// Never reopen
    Never,
}

impl Default for ReopenSource {
    fn default() -> Self {
        #[cfg(unix)]
        {
            ReopenSource::Hangup
        }
        #[cfg(not(unix))]
        {
            ReopenSource::Never
        }
    }
}

/// Programmatic reopen signal, shareable between any number of loggers
#[derive(Debug, Clone)]
pub struct ReopenTrigger {
    tx: broadcast::Sender<()>,
}

impl ReopenTrigger {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// A source that fires whenever this trigger does
    pub fn source(&self) -> ReopenSource {
        ReopenSource::Manual(self.tx.subscribe())
    }

    /// Ask every subscribed coordinator to reopen
    ///
    /// Returns the number of coordinators notified.
    pub fn fire(&self) -> usize {
        self.tx.send(()).unwrap_or(0)
    }
}

impl Default for ReopenTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`ReopenSource`] bound to the coordinator's runtime
enum Listener {
    #[cfg(unix)]
    Hangup(tokio::signal::unix::Signal),
    Manual(broadcast::Receiver<()>),
    Never,
}

impl Listener {
    fn bind(source: ReopenSource) -> io::Result<Self> {
        Ok(match source {
            #[cfg(unix)]
            ReopenSource::Hangup => {
                use tokio::signal::unix::{signal, SignalKind};
                Listener::Hangup(signal(SignalKind::hangup())?)
            }
            ReopenSource::Manual(rx) => Listener::Manual(rx),
            ReopenSource::Never => Listener::Never,
        })
    }

    /// Wait for the next reopen request; `false` once the source is gone
    async fn recv(&mut self) -> bool {
        match self {
            #[cfg(unix)]
            Listener::Hangup(signal) => signal.recv().await.is_some(),
            Listener::Manual(rx) => match rx.recv().await {
                // Coalesced requests still mean "reopen now"
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => true,
                Err(broadcast::error::RecvError::Closed) => false,
            },
            Listener::Never => std::future::pending().await,
        }
    }
}

/// Handle to a running coordinator; dropping it stops the thread
#[derive(Debug)]
pub struct CoordinatorHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl CoordinatorHandle {
    /// Stop the coordinator; it flushes its destination once more on the way out
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            // Ignore error if the thread already ended
            let _ = tx.send(());
        }
    }

    /// Stop the coordinator and wait for its thread to exit
    pub fn join(mut self) {
        self.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    /// Whether the coordinator thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Most recent failure of a background reopen or flush
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn the coordinator for `destination`
///
/// # Arguments
/// * `destination` - Receives `reopen` on every signal and `flush` on every tick
/// * `source` - Where reopen requests come from
/// * `flush_interval` - Period of automatic flushes; `None` disables the timer
///
/// The coordinator runs on a dedicated thread with its own single-threaded
/// runtime, so it keeps its schedule however busy the caller is. Returns once
/// the reopen source is registered.
pub fn spawn_coordinator(
    destination: Arc<dyn Destination>,
    source: ReopenSource,
    flush_interval: Option<Duration>,
) -> Result<CoordinatorHandle> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (ready_tx, ready_rx) = mpsc::sync_channel::<io::Result<()>>(1);
    let last_error = Arc::new(Mutex::new(None));
    let thread_error = Arc::clone(&last_error);

    let thread = thread::Builder::new()
        .name("log-coordinator".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            // Signal registration needs the runtime's driver
            let listener = {
                let _guard = runtime.enter();
                Listener::bind(source)
            };

            match listener {
                Ok(listener) => {
                    let _ = ready_tx.send(Ok(()));
                    runtime.block_on(run(
                        destination,
                        listener,
                        flush_interval,
                        shutdown_rx,
                        thread_error,
                    ));
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        })
        .map_err(|e| LogError::io("Failed to start log coordinator thread", e))?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(CoordinatorHandle {
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
            last_error,
        }),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(LogError::io("Failed to start log coordinator", e))
        }
        Err(_) => {
            let _ = thread.join();
            Err(LogError::io(
                "Failed to start log coordinator",
                io::Error::new(io::ErrorKind::Other, "coordinator thread exited early"),
            ))
        }
    }
}

async fn run(
    destination: Arc<dyn Destination>,
    mut listener: Listener,
    flush_interval: Option<Duration>,
    mut shutdown_rx: oneshot::Receiver<()>,
    last_error: Arc<Mutex<Option<String>>>,
) {
    debug!("Log coordinator started");

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            received = listener.recv() => {
                if received {
                    record(&last_error, "reopen", destination.reopen());
                } else {
                    debug!("Reopen source closed");
                    listener = Listener::Never;
                }
            }
            _ = tick(flush_interval) => {
                record(&last_error, "flush", destination.flush());
            }
        }
    }

    record(&last_error, "flush", destination.flush());
    debug!("Log coordinator stopped");
}

/// Sleep for one flush period, or forever without a timer
async fn tick(interval: Option<Duration>) {
    match interval {
        Some(period) => tokio::time::sleep(period).await,
        None => std::future::pending().await,
    }
}

fn record(last_error: &Mutex<Option<String>>, action: &str, result: io::Result<()>) {
    if let Err(e) = result {
        warn!("Background log {} failed: {}", action, e);
        *lock(last_error) = Some(format!("{action} failed: {e}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{BufferedFileWriter, ReopenableFileWriter};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Records how often each operation ran
    #[derive(Default)]
    struct CountingDestination {
        reopens: AtomicUsize,
        flushes: AtomicUsize,
        fail: bool,
    }

    impl Destination for CountingDestination {
        fn write(&self, _bytes: &[u8]) -> io::Result<()> {
            Ok(())
        }

        fn flush(&self) -> io::Result<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn reopen(&self) -> io::Result<()> {
            self.reopens.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
            } else {
                Ok(())
            }
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap_or_default()
    }

    #[test]
    fn test_spawn_without_ambient_runtime() {
        assert!(tokio::runtime::Handle::try_current().is_err());

        let destination = Arc::new(CountingDestination::default());
        let trigger = ReopenTrigger::new();
        let handle = spawn_coordinator(destination.clone(), trigger.source(), None).unwrap();

        assert_eq!(trigger.fire(), 1);
        assert!(wait_until(|| destination.reopens.load(Ordering::SeqCst) == 1));
        assert!(!handle.is_finished());
    }

    #[tokio::test]
    async fn test_spawn_inside_runtime() {
        let destination = Arc::new(CountingDestination::default());
        let handle = spawn_coordinator(
            destination.clone(),
            ReopenSource::Never,
            Some(Duration::from_millis(20)),
        )
        .unwrap();

        // The caller's runtime is blocked; the coordinator keeps ticking
        thread::sleep(Duration::from_millis(200));
        assert!(destination.flushes.load(Ordering::SeqCst) >= 2);
        handle.join();
    }

    #[test]
    fn test_fire_without_subscribers() {
        assert_eq!(ReopenTrigger::new().fire(), 0);
    }

    #[test]
    fn test_one_trigger_many_coordinators() {
        let first = Arc::new(CountingDestination::default());
        let second = Arc::new(CountingDestination::default());
        let trigger = ReopenTrigger::new();
        let _a = spawn_coordinator(first.clone(), trigger.source(), None).unwrap();
        let _b = spawn_coordinator(second.clone(), trigger.source(), None).unwrap();

        assert_eq!(trigger.fire(), 2);
        assert!(wait_until(|| {
            first.reopens.load(Ordering::SeqCst) == 1
                && second.reopens.load(Ordering::SeqCst) == 1
        }));
    }

    #[test]
    fn test_timer_flushes_periodically() {
        let destination = Arc::new(CountingDestination::default());
        let _handle = spawn_coordinator(
            destination.clone(),
            ReopenSource::Never,
            Some(Duration::from_millis(20)),
        )
        .unwrap();

        assert!(wait_until(|| destination.flushes.load(Ordering::SeqCst) >= 2));
        assert_eq!(destination.reopens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failures_are_recorded_not_raised() {
        let destination = Arc::new(CountingDestination {
            fail: true,
            ..Default::default()
        });
        let trigger = ReopenTrigger::new();
        let handle = spawn_coordinator(destination.clone(), trigger.source(), None).unwrap();

        trigger.fire();
        assert!(wait_until(|| handle.last_error().is_some()));
        assert!(handle.last_error().unwrap().starts_with("reopen failed"));
        assert!(!handle.is_finished());
    }

    #[test]
    fn test_join_stops_thread_and_flushes() {
        let destination = Arc::new(CountingDestination::default());
        let handle = spawn_coordinator(destination.clone(), ReopenSource::Never, None).unwrap();

        handle.join();
        assert_eq!(destination.flushes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_stops_thread() {
        let destination = Arc::new(CountingDestination::default());
        let handle = spawn_coordinator(destination.clone(), ReopenSource::Never, None).unwrap();

        drop(handle);
        assert!(wait_until(|| destination.flushes.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_dropping_trigger_keeps_coordinator_alive() {
        let destination = Arc::new(CountingDestination::default());
        let trigger = ReopenTrigger::new();
        let handle = spawn_coordinator(
            destination.clone(),
            trigger.source(),
            Some(Duration::from_millis(20)),
        )
        .unwrap();

        drop(trigger);
        assert!(wait_until(|| destination.flushes.load(Ordering::SeqCst) >= 1));
        assert!(!handle.is_finished());
    }

    #[test]
    fn test_buffered_file_flushed_by_timer() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        let writer = Arc::new(BufferedFileWriter::new(
            ReopenableFileWriter::open(&path).unwrap(),
        ));
        let _handle = spawn_coordinator(
            writer.clone(),
            ReopenSource::Never,
            Some(Duration::from_millis(30)),
        )
        .unwrap();

        writer.write(b"pending\n").unwrap();
        assert_eq!(read(&path), "");
        assert!(wait_until(|| read(&path) == "pending\n"));
    }

    #[test]
    fn test_reopen_after_rotation_recreates_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        let moved = temp_dir.path().join("app.log.1");
        let writer = Arc::new(ReopenableFileWriter::open(&path).unwrap());
        let trigger = ReopenTrigger::new();
        let _handle = spawn_coordinator(writer.clone(), trigger.source(), None).unwrap();

        writer.write(b"old\n").unwrap();
        std::fs::rename(&path, &moved).unwrap();

        trigger.fire();
        assert!(wait_until(|| path.exists()));

        writer.write(b"new\n").unwrap();
        assert_eq!(read(&path), "new\n");
        assert_eq!(read(&moved), "old\n");
    }
}
