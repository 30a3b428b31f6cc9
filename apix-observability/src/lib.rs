pub mod api_log_event;
pub mod api_log_writer;
pub mod metrics;

pub use api_log_event::ApiLogEvent;
pub use api_log_writer::{ApiLogWriter, FileLogSink, LogSink, ShutdownOutcome, panic_message};
pub use metrics::MetricsCollector;
