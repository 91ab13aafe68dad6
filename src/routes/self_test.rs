//! Manual broker liveness check.
//!
//! `POST /test/mqtt` publishes a self-test message to the subscribed topic. The
//! connector discards it on arrival, so nothing is stored.

use axum::{
    extract::{Query, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::error::ApiError;

const DEFAULT_TEST_TAG: &str = "test_manual_001";

pub fn router() -> Router<AppState> {
    Router::new().route("/test/mqtt", post(publish_self_test))
}

#[derive(Debug, Deserialize)]
struct SelfTestQuery {
    tag_id: Option<String>,
}

async fn publish_self_test(
    State(state): State<AppState>,
    Query(query): Query<SelfTestQuery>,
) -> Result<Json<Value>, ApiError> {
    // ---
    let tag_id = query.tag_id.as_deref().unwrap_or(DEFAULT_TEST_TAG);
    state.broker.publish_self_test(tag_id)?;
    Ok(Json(json!({ "message": format!("self-test message sent: {tag_id}") })))
}

#[cfg(test)]
mod tests {
    // ---
    use crate::routes::testing::{app, send};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_self_test_without_broker_is_unavailable() {
        // ---
        let (app, store) = app();
        let (status, body) = send(&app, "POST", "/test/mqtt?tag_id=T1", None).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "SERVICE_UNAVAILABLE");
        assert!(store.readings().is_empty());
    }
}
