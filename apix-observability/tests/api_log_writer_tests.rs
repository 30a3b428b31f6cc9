//! End-to-end tests for the background API log writer.

use apix_core::config::LoggingConfig;
use apix_core::error::ApixError;
use apix_observability::api_log_writer::{ApiLogWriter, FileLogSink, LogSink, ShutdownOutcome};
use apix_observability::{ApiLogEvent, MetricsCollector};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ── Helpers ───────────────────────────────────────────────────

fn metrics() -> Arc<MetricsCollector> {
    Arc::new(MetricsCollector::disabled())
}

fn json_files_under(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop() {
        for entry in std::fs::read_dir(&d).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|e| e == "json") {
                out.push(path);
            }
        }
    }
    out
}

/// Sleeps per event until `fast` is set.
struct SlowSink {
    fast: Arc<AtomicBool>,
    written: Arc<AtomicUsize>,
}

impl LogSink for SlowSink {
    fn write(&mut self, _: &ApiLogEvent) -> Result<(), ApixError> {
        if !self.fast.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
        self.written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Uniqueness ────────────────────────────────────────────────

#[test]
fn concurrently_created_events_have_unique_file_paths() {
    let handles: Vec<_> = (0..8)
        .map(|_| {
            std::thread::spawn(|| {
                (0..1250)
                    .map(|_| ApiLogEvent::new().file_path())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let paths: HashSet<PathBuf> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    assert_eq!(paths.len(), 10_000);
}

#[test]
fn concurrent_producers_each_get_their_own_file() {
    let dir = tempfile::tempdir().unwrap();
    let sink = FileLogSink::new(dir.path());
    let writer = Arc::new(ApiLogWriter::with_sink(sink, 0, metrics()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let writer = Arc::clone(&writer);
            std::thread::spawn(move || {
                for i in 0..250 {
                    writer.log_event(ApiLogEvent::new().with_url(format!("/t{t}/{i}")));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(writer.shutdown(), ShutdownOutcome::Drained);
    assert_eq!(json_files_under(dir.path()).len(), 2000);
}

// ── Non-blocking enqueue ──────────────────────────────────────

#[test]
fn enqueue_does_not_wait_for_the_sink() {
    let fast = Arc::new(AtomicBool::new(false));
    let written = Arc::new(AtomicUsize::new(0));
    let sink = SlowSink {
        fast: Arc::clone(&fast),
        written: Arc::clone(&written),
    };
    let writer = ApiLogWriter::with_sink(sink, 0, metrics()).unwrap();

    let start = Instant::now();
    for _ in 0..100_000 {
        writer.log_event(ApiLogEvent::new());
    }
    let elapsed = start.elapsed();

    // At 1ms per event the sink alone would need 100s.
    assert!(elapsed < Duration::from_secs(10), "enqueue took {elapsed:?}");
    assert!(written.load(Ordering::SeqCst) < 100_000);

    fast.store(true, Ordering::SeqCst);
    assert_eq!(writer.shutdown(), ShutdownOutcome::Drained);
    assert_eq!(written.load(Ordering::SeqCst), 100_000);
}

// ── Shutdown drain ────────────────────────────────────────────

#[test]
fn shutdown_writes_every_event_queued_before_it() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ApiLogWriter::with_sink(FileLogSink::new(dir.path()), 0, metrics()).unwrap();

    let mut expected = Vec::new();
    for i in 0..500 {
        let event = ApiLogEvent::new().with_url(format!("/orders/{i}"));
        expected.push(dir.path().join(event.file_path()));
        writer.log_event(event);
    }

    assert_eq!(writer.shutdown(), ShutdownOutcome::Drained);
    for path in &expected {
        assert!(path.exists(), "missing {}", path.display());
    }

    // After shutdown: silently ignored, nothing new on disk.
    writer.log_event(ApiLogEvent::new());
    assert_eq!(json_files_under(dir.path()).len(), 500);
}

#[test]
fn dropping_the_writer_drains_the_queue() {
    let dir = tempfile::tempdir().unwrap();
    let event = ApiLogEvent::new();
    let path = dir.path().join(event.file_path());
    {
        let writer = ApiLogWriter::with_sink(FileLogSink::new(dir.path()), 0, metrics()).unwrap();
        writer.log_event(event);
    }
    assert!(path.exists());
}

// ── Configuration ─────────────────────────────────────────────

#[test]
fn from_config_resolves_root_token_and_writes_there() {
    let root = tempfile::tempdir().unwrap();
    let config = LoggingConfig {
        directory_path_for_api_logs: Some("{Root}/api".into()),
        root_directory_path: Some(root.path().to_string_lossy().into_owned()),
        ..LoggingConfig::default()
    };

    let writer = ApiLogWriter::from_config(&config, metrics()).unwrap();
    assert_eq!(writer.base_directory(), Some(root.path().join("api").as_path()));

    let event = ApiLogEvent::new().with_url("/health");
    let path = root.path().join("api").join(event.file_path());
    writer.log_event(event);
    assert_eq!(writer.shutdown(), ShutdownOutcome::Drained);

    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    assert_eq!(written["Url"], "/health");
}

#[test]
fn from_config_fails_when_root_is_missing() {
    let config = LoggingConfig {
        directory_path_for_api_logs: Some("{Root}/api".into()),
        ..LoggingConfig::default()
    };
    assert!(matches!(
        ApiLogWriter::from_config(&config, metrics()),
        Err(ApixError::Config(_))
    ));
}

#[test]
fn unwritable_base_directory_is_reported_per_event_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the base directory should be.
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();

    let m = Arc::new(MetricsCollector::new(true).unwrap());
    let writer = ApiLogWriter::with_sink(FileLogSink::new(&blocker), 0, Arc::clone(&m)).unwrap();
    writer.log_event(ApiLogEvent::new());
    writer.log_event(ApiLogEvent::new());

    assert_eq!(writer.shutdown(), ShutdownOutcome::Drained);
    let failed = m
        .api_log_events_total
        .as_ref()
        .unwrap()
        .with_label_values(&["failed"])
        .get();
    assert_eq!(failed, 2);
}
