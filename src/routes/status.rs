//! Service status: broker session and ingestion backlog.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::AppState;
use crate::broker::ConnectorState;

#[derive(Serialize)]
struct StatusResponse {
    // ---
    status: &'static str,
    mqtt_broker: String,
    mqtt_topic: String,
    mqtt_state: ConnectorState,
    mqtt_connected: bool,
    queue_depth: usize,
    queue_capacity: usize,
    queue_dropped: u64,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/status", get(status))
}

/// Handle `GET /status`. Reads in-process state only.
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    // ---
    let settings = state.broker.settings();
    Json(StatusResponse {
        status: "online",
        mqtt_broker: format!("{}:{}", settings.host, settings.port),
        mqtt_topic: settings.topic.clone(),
        mqtt_state: state.broker.state(),
        mqtt_connected: state.broker.is_connected(),
        queue_depth: state.queue.len(),
        queue_capacity: state.queue.capacity(),
        queue_dropped: state.queue.dropped(),
    })
}
