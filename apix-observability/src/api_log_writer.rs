//! Background API log writer.
//!
//! Callers hand events to [`ApiLogWriter::log_event`], which only pushes onto
//! a crossbeam channel and returns. A dedicated OS thread (outside any async
//! runtime, so request handling can never starve it) drains the channel and
//! hands each event to a [`LogSink`]. The default sink, [`FileLogSink`],
//! writes one pretty-printed JSON file per event:
//!
//! ```text
//! <base>/<year>/<month>/<day>/<hour>/<minute>/<uuid>.json
//! ```
//!
//! Shutdown withdraws the writer's sender. Once the last in-flight producer
//! lets go of it the channel disconnects, the worker finishes whatever is
//! still queued and exits.

use crate::api_log_event::ApiLogEvent;
use crate::metrics::{LogOutcome, MetricsCollector};
use apix_core::config::LoggingConfig;
use apix_core::error::ApixError;
use arc_swap::ArcSwapOption;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::any::Any;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const WORKER_THREAD_NAME: &str = "apix-api-log-writer";

// ── Sinks ────────────────────────────────────────────────────────────────────

/// Destination for drained events. Runs on the writer thread only.
pub trait LogSink: Send + 'static {
    fn write(&mut self, event: &ApiLogEvent) -> Result<(), ApixError>;
}

/// Writes each event to `<base>/<event.file_path()>`.
#[derive(Debug, Clone)]
pub struct FileLogSink {
    base_dir: PathBuf,
}

impl FileLogSink {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl LogSink for FileLogSink {
    fn write(&mut self, event: &ApiLogEvent) -> Result<(), ApixError> {
        // create_dir_all treats a directory created concurrently as success.
        fs::create_dir_all(self.base_dir.join(event.directory_path()))?;

        let body = serde_json::to_vec_pretty(event)?;
        fs::write(self.base_dir.join(event.file_path()), body)?;

        debug!(file = event.file_name(), "API log event published");
        Ok(())
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// How a call to [`ApiLogWriter::shutdown`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every queued event was handed to the sink.
    Drained,
    /// The drain did not finish within `shutdown_timeout_ms`; the thread
    /// was detached.
    TimedOut,
    /// The worker had already stopped after a fatal error.
    WorkerFailed,
    /// `shutdown` was called before.
    AlreadyShutDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    Drained,
    Fatal,
}

struct Worker {
    handle: JoinHandle<WorkerExit>,
    /// Never sent on; disconnects when the worker thread returns.
    done_rx: Receiver<()>,
}

/// Fire-and-forget API log writer.
///
/// `log_event` never blocks and never fails the caller. Dropping the writer
/// performs the same drain as [`ApiLogWriter::shutdown`].
pub struct ApiLogWriter {
    sender: ArcSwapOption<Sender<ApiLogEvent>>,
    closed: AtomicBool,
    capacity: usize,
    shutdown_timeout: Option<Duration>,
    worker: Mutex<Option<Worker>>,
    metrics: Arc<MetricsCollector>,
    base_directory: Option<PathBuf>,
}

impl ApiLogWriter {
    /// Build a file-backed writer from configuration.
    ///
    /// Fails immediately when the base directory setting is missing or its
    /// `{Root}` token cannot be resolved.
    pub fn from_config(
        config: &LoggingConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, ApixError> {
        let base_dir = config.api_log_directory()?;
        info!(
            path = %base_dir.display(),
            capacity = config.queue_capacity,
            "API log writer configured"
        );

        let sink = FileLogSink::new(&base_dir);
        let mut writer = Self::with_sink(sink, config.queue_capacity, metrics)?;
        writer.base_directory = Some(base_dir);
        writer.shutdown_timeout = config.shutdown_timeout_ms.map(Duration::from_millis);
        Ok(writer)
    }

    /// Start a writer over an arbitrary sink. `capacity = 0` means unbounded.
    pub fn with_sink<S: LogSink>(
        sink: S,
        capacity: usize,
        metrics: Arc<MetricsCollector>,
    ) -> io::Result<Self> {
        let (tx, rx) = if capacity == 0 {
            crossbeam_channel::unbounded()
        } else {
            crossbeam_channel::bounded(capacity)
        };
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);

        let worker_metrics = Arc::clone(&metrics);
        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(sink, rx, worker_metrics, done_tx))?;

        Ok(Self {
            sender: ArcSwapOption::from_pointee(tx),
            closed: AtomicBool::new(false),
            capacity,
            shutdown_timeout: None,
            worker: Mutex::new(Some(Worker { handle, done_rx })),
            metrics,
            base_directory: None,
        })
    }

    /// Bound the shutdown drain. `None` waits until the queue is empty.
    pub fn with_shutdown_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Queue an event for persistence. Best effort: a closed or full queue
    /// drops the event with a warning.
    pub fn log_event(&self, event: ApiLogEvent) {
        if self.closed.load(Ordering::Acquire) {
            self.drop_event("writer is shut down");
            return;
        }

        let guard = self.sender.load();
        let Some(tx) = &*guard else {
            self.drop_event("writer is shut down");
            return;
        };

        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(capacity = self.capacity, "Failed to log API request - queue is full");
                self.metrics.record_log_event(LogOutcome::Dropped);
            }
            Err(TrySendError::Disconnected(_)) => {
                // The worker has died; the fatal error was already reported.
                self.metrics.record_log_event(LogOutcome::Dropped);
            }
        }
    }

    /// Stop accepting events and wait for the queue to drain.
    pub fn shutdown(&self) -> ShutdownOutcome {
        self.closed.store(true, Ordering::Release);
        // Producers holding a guard keep the sender alive until they return.
        self.sender.store(None);

        let worker = match self.worker.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(worker) = worker else {
            return ShutdownOutcome::AlreadyShutDown;
        };

        let finished = match self.shutdown_timeout {
            None => {
                let _ = worker.done_rx.recv();
                true
            }
            Some(timeout) => !matches!(
                worker.done_rx.recv_timeout(timeout),
                Err(RecvTimeoutError::Timeout)
            ),
        };

        if !finished {
            warn!(
                timeout_ms = self.shutdown_timeout.map(|t| t.as_millis() as u64),
                "API log writer did not drain before the shutdown timeout"
            );
            return ShutdownOutcome::TimedOut;
        }

        match worker.handle.join() {
            Ok(WorkerExit::Drained) => {
                info!("API log writer drained and stopped");
                ShutdownOutcome::Drained
            }
            Ok(WorkerExit::Fatal) | Err(_) => ShutdownOutcome::WorkerFailed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Events accepted but not yet handed to the sink.
    pub fn queued_events(&self) -> usize {
        match &*self.sender.load() {
            Some(tx) => tx.len(),
            None => 0,
        }
    }

    /// 0 = unbounded.
    pub fn queue_capacity(&self) -> usize {
        self.capacity
    }

    /// Base directory for the file sink, when built from configuration.
    pub fn base_directory(&self) -> Option<&Path> {
        self.base_directory.as_deref()
    }

    fn drop_event(&self, reason: &str) {
        warn!(reason, "Failed to log API request");
        self.metrics.record_log_event(LogOutcome::Dropped);
    }
}

impl Drop for ApiLogWriter {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

// ── Worker thread ────────────────────────────────────────────────────────────

fn run_worker<S: LogSink>(
    mut sink: S,
    rx: Receiver<ApiLogEvent>,
    metrics: Arc<MetricsCollector>,
    _done: Sender<()>,
) -> WorkerExit {
    let result = panic::catch_unwind(AssertUnwindSafe(|| drain(&mut sink, &rx, &metrics)));

    match result {
        Ok(()) => WorkerExit::Drained,
        Err(payload) => {
            error!(
                fatal = true,
                panic = %panic_message(payload.as_ref()),
                "Fatal error in API log writer thread; no further events will be written"
            );
            WorkerExit::Fatal
        }
    }
}

fn drain<S: LogSink>(sink: &mut S, rx: &Receiver<ApiLogEvent>, metrics: &MetricsCollector) {
    for event in rx.iter() {
        match sink.write(&event) {
            Ok(()) => metrics.record_log_event(LogOutcome::Written),
            Err(e) => {
                warn!(error = %e, file = event.file_name(), "Failed to write API log to file");
                metrics.record_log_event(LogOutcome::Failed);
            }
        }
    }
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    /// Records how many events it saw; fails every event whose URL is "fail".
    struct CountingSink {
        seen: Arc<AtomicUsize>,
    }

    impl LogSink for CountingSink {
        fn write(&mut self, event: &ApiLogEvent) -> Result<(), ApixError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if event.url == "fail" {
                return Err(ApixError::Internal("sink refused".into()));
            }
            Ok(())
        }
    }

    struct PanickingSink;

    impl LogSink for PanickingSink {
        fn write(&mut self, _: &ApiLogEvent) -> Result<(), ApixError> {
            panic!("disk on fire");
        }
    }

    fn counting() -> (CountingSink, Arc<AtomicUsize>) {
        let seen = Arc::new(AtomicUsize::new(0));
        (CountingSink { seen: Arc::clone(&seen) }, seen)
    }

    fn metrics() -> Arc<MetricsCollector> {
        Arc::new(MetricsCollector::new(true).unwrap())
    }

    fn count(m: &MetricsCollector, outcome: LogOutcome) -> u64 {
        m.api_log_events_total
            .as_ref()
            .unwrap()
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    #[test]
    fn missing_directory_config_fails_fast() {
        let result = ApiLogWriter::from_config(&LoggingConfig::default(), metrics());
        assert!(matches!(result, Err(ApixError::Config(_))));
    }

    #[test]
    fn per_event_failure_does_not_stop_the_worker() {
        let (sink, seen) = counting();
        let m = metrics();
        let writer = ApiLogWriter::with_sink(sink, 0, Arc::clone(&m)).unwrap();

        writer.log_event(ApiLogEvent::new().with_url("ok-1"));
        writer.log_event(ApiLogEvent::new().with_url("fail"));
        writer.log_event(ApiLogEvent::new().with_url("ok-2"));

        assert_eq!(writer.shutdown(), ShutdownOutcome::Drained);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(count(&m, LogOutcome::Written), 2);
        assert_eq!(count(&m, LogOutcome::Failed), 1);
    }

    #[test]
    fn second_shutdown_reports_already_shut_down() {
        let (sink, _) = counting();
        let writer = ApiLogWriter::with_sink(sink, 0, metrics()).unwrap();
        assert_eq!(writer.shutdown(), ShutdownOutcome::Drained);
        assert_eq!(writer.shutdown(), ShutdownOutcome::AlreadyShutDown);
        assert!(writer.is_closed());
    }

    #[test]
    fn log_after_shutdown_is_a_counted_no_op() {
        let (sink, seen) = counting();
        let m = metrics();
        let writer = ApiLogWriter::with_sink(sink, 0, Arc::clone(&m)).unwrap();
        writer.shutdown();

        writer.log_event(ApiLogEvent::new());
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(count(&m, LogOutcome::Dropped), 1);
    }

    #[test]
    fn panicking_sink_kills_worker_without_deadlocking_shutdown() {
        let m = metrics();
        let writer = ApiLogWriter::with_sink(PanickingSink, 0, Arc::clone(&m)).unwrap();
        writer.log_event(ApiLogEvent::new());

        // Keep logging until the dead worker's queue reports disconnected.
        let deadline = Instant::now() + Duration::from_secs(10);
        while count(&m, LogOutcome::Dropped) == 0 {
            assert!(Instant::now() < deadline, "worker never stopped");
            writer.log_event(ApiLogEvent::new());
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(writer.shutdown(), ShutdownOutcome::WorkerFailed);
        assert_eq!(count(&m, LogOutcome::Dropped), 1);

        writer.log_event(ApiLogEvent::new());
        assert_eq!(count(&m, LogOutcome::Dropped), 2);
    }

    #[test]
    fn full_bounded_queue_drops_instead_of_blocking() {
        struct Stuck(Receiver<()>);
        impl LogSink for Stuck {
            fn write(&mut self, _: &ApiLogEvent) -> Result<(), ApixError> {
                let _ = self.0.recv();
                Ok(())
            }
        }

        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let m = metrics();
        let writer = ApiLogWriter::with_sink(Stuck(release_rx), 2, Arc::clone(&m)).unwrap();

        for _ in 0..10 {
            writer.log_event(ApiLogEvent::new());
        }
        // One in the sink, two queued, the rest dropped. The worker may not
        // have picked up the first event yet, so allow one either way.
        let dropped = count(&m, LogOutcome::Dropped);
        assert!((7..=8).contains(&dropped), "dropped = {dropped}");

        drop(release_tx);
        assert_eq!(writer.shutdown(), ShutdownOutcome::Drained);
    }

    #[test]
    fn shutdown_timeout_detaches_a_slow_worker() {
        struct Slow;
        impl LogSink for Slow {
            fn write(&mut self, _: &ApiLogEvent) -> Result<(), ApixError> {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            }
        }

        let writer = ApiLogWriter::with_sink(Slow, 0, metrics())
            .unwrap()
            .with_shutdown_timeout(Some(Duration::from_millis(10)));
        for _ in 0..5 {
            writer.log_event(ApiLogEvent::new());
        }
        assert_eq!(writer.shutdown(), ShutdownOutcome::TimedOut);
    }

    #[test]
    fn file_sink_writes_event_under_partitioned_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileLogSink::new(dir.path());
        let mut event = ApiLogEvent::new().with_url("http://localhost/x");
        event.status_code = "200".into();

        sink.write(&event).unwrap();

        let path = dir.path().join(event.file_path());
        let written: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["FileName"], event.file_name());
        assert_eq!(written["Url"], "http://localhost/x");
        assert_eq!(written["StatusCode"], "200");
    }

    #[test]
    fn file_sink_tolerates_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileLogSink::new(dir.path());
        let first = ApiLogEvent::new();
        let second = ApiLogEvent::at(first.timestamp());
        sink.write(&first).unwrap();
        sink.write(&second).unwrap();
        assert!(dir.path().join(second.file_path()).exists());
    }

    #[test]
    fn panic_message_extracts_str_and_string() {
        let a: Box<dyn Any + Send> = Box::new("static");
        let b: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let c: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(a.as_ref()), "static");
        assert_eq!(panic_message(b.as_ref()), "owned");
        assert_eq!(panic_message(c.as_ref()), "unknown panic");
    }
}
