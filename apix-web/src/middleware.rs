use crate::server::AppState;
use apix_observability::ApiLogEvent;
use axum::{
    body::{Body, Bytes, HttpBody, to_bytes},
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::{debug, warn};

/// Response header carrying the relative path of the request's API log file.
pub const API_LOG_FILE_HEADER: &str = "x-api-log-file";

/// Record every request/response pair as an [`ApiLogEvent`].
///
/// Bodies whose size is unknown or above `max_logged_body_bytes` stream
/// through untouched and are logged as `null`.
pub async fn request_logging(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let limit = state.max_logged_body_bytes;
    let mut event = ApiLogEvent::new().with_url(request.uri().to_string());

    let (parts, body) = request.into_parts();
    let (body, request_body) = match capture(body, limit).await {
        Ok(captured) => captured,
        Err(e) => {
            warn!(error = %e, url = %event.url, "Failed to read request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    event.request_body = request_body;

    let response = next.run(Request::from_parts(parts, body)).await;

    let (mut parts, body) = response.into_parts();
    let (body, response_body) = match capture(body, limit).await {
        Ok(captured) => captured,
        Err(e) => {
            warn!(error = %e, url = %event.url, "Failed to read response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    event.status_code = parts.status.as_u16().to_string();
    event.response_body = response_body;

    let file = event.file_path();
    match HeaderValue::from_str(&file.to_string_lossy()) {
        Ok(v) => {
            parts.headers.insert(API_LOG_FILE_HEADER, v);
        }
        Err(e) => debug!(error = %e, "API log file path is not a valid header value"),
    }

    state.writer.log_event(event);
    Response::from_parts(parts, body)
}

/// Buffer `body` when it is known to fit in `limit`.
async fn capture(body: Body, limit: usize) -> Result<(Body, Value), axum::Error> {
    match body.size_hint().upper() {
        Some(n) if n <= limit as u64 => {
            let bytes = to_bytes(body, limit).await?;
            let value = body_value(&bytes);
            Ok((Body::from(bytes), value))
        }
        _ => Ok((body, Value::Null)),
    }
}

/// JSON when the body parses as JSON, otherwise its text.
fn body_value(bytes: &Bytes) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
