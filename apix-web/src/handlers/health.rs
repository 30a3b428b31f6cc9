use crate::server::AppState;
use axum::extract::State;
use axum::response::Json;
use serde_json::{Value, json};

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let base_directory = state
        .writer
        .base_directory()
        .map(|p| p.to_string_lossy().into_owned());

    Json(json!({
        "status": if state.writer.is_closed() { "draining" } else { "ok" },
        "version": env!("CARGO_PKG_VERSION"),
        "api_log": {
            "base_directory": base_directory,
            "queue_capacity": state.writer.queue_capacity(),
            "queued_events": state.writer.queued_events(),
        },
    }))
}
