//! API log event.
//!
//! One record per request/response round trip. Each event is persisted as
//! its own JSON file under a `year/month/day/hour/minute` directory tree so
//! that no single directory grows without bound.
//!
//! Wire names follow the `PascalCase` convention consumers of these files
//! already parse: `TimeStamp`, `FileName`, `Url`, `StatusCode`,
//! `RequestBody`, `ResponseBody`.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

/// A single logged request/response pair.
///
/// `timestamp` and `file_name` are fixed at construction; the file path is
/// a pure function of the two.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiLogEvent {
    #[serde(rename = "TimeStamp")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "FileName")]
    file_name: String,
    /// URL of the API call.
    #[serde(rename = "Url")]
    pub url: String,
    /// Response status. Empty until the response is known.
    #[serde(rename = "StatusCode")]
    pub status_code: String,
    #[serde(rename = "RequestBody")]
    pub request_body: Value,
    #[serde(rename = "ResponseBody")]
    pub response_body: Value,
}

impl ApiLogEvent {
    /// Create an event stamped with the current UTC time.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Create an event with a fixed timestamp.
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            file_name: format!("{}.json", Uuid::new_v4()),
            url: String::new(),
            status_code: String::new(),
            request_body: Value::Null,
            response_body: Value::Null,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// `year/month/day/hour/minute`, without zero padding.
    pub fn directory_path(&self) -> PathBuf {
        let ts = &self.timestamp;
        [
            ts.year().to_string(),
            ts.month().to_string(),
            ts.day().to_string(),
            ts.hour().to_string(),
            ts.minute().to_string(),
        ]
        .iter()
        .collect()
    }

    /// Directory path plus file name, relative to the log base directory.
    pub fn file_path(&self) -> PathBuf {
        self.directory_path().join(&self.file_name)
    }

    /// Record the request payload. A payload that cannot be represented as
    /// JSON is logged and left as `null`.
    pub fn record_request<T: Serialize + ?Sized>(&mut self, body: &T) {
        self.request_body = to_value_or_null(body, "request");
    }

    /// Record the response payload. Same failure policy as `record_request`.
    pub fn record_response<T: Serialize + ?Sized>(&mut self, body: &T) {
        self.response_body = to_value_or_null(body, "response");
    }
}

impl Default for ApiLogEvent {
    fn default() -> Self {
        Self::new()
    }
}

fn to_value_or_null<T: Serialize + ?Sized>(body: &T, which: &str) -> Value {
    match serde_json::to_value(body) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, body = which, "Failed to convert API log body to JSON");
            Value::Null
        }
    }
}
