use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

/// Body written when a handler produced no result.
pub const EMPTY_CONTENT: &str = "Empty content";

/// Body written when a handler could not be resolved or failed.
pub const FAILED: &str = "Failed";

const EXPIRED: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Plain-text response that no cache may store.
pub fn no_cache_response(status: StatusCode, content: Option<&str>) -> Response {
    let body = content.unwrap_or(EMPTY_CONTENT).to_owned();
    (
        status,
        [
            (header::CACHE_CONTROL, "no-store, no-cache"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, EXPIRED),
            (header::CONTENT_TYPE, "text/plain"),
        ],
        body,
    )
        .into_response()
}
