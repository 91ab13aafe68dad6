//! Reading endpoints.
//!
//! `POST /readings` goes through the same [`Recorder`](crate::ingest::Recorder)
//! as broker ingestion, so a manual reading is classified exactly like an
//! ingested one. Any `state` in the request body is ignored.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::AppState;
use crate::error::ApiError;
use crate::models::{Reading, ReadingSource, Temperature};
use crate::normalize::{self, Telemetry};
use crate::store::{StoreError, LIST_LIMIT, TAG_LIST_LIMIT};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/readings", get(list).post(create))
        // GET takes a tag id, DELETE a reading id.
        .route("/readings/{key}", get(list_by_tag).delete(remove))
}

/// Body of a manually submitted reading.
#[derive(Debug, Deserialize)]
struct ManualReading {
    // ---
    tag_id: String,
    /// Number or numeric string; anything else is stored as `ERROR_DATO`.
    #[serde(default)]
    temperature: Option<Value>,
    #[serde(default)]
    timestamp: Option<Value>,
}

async fn create(
    State(state): State<AppState>,
    Json(body): Json<ManualReading>,
) -> Result<impl IntoResponse, ApiError> {
    // ---
    let tag_id = body.tag_id.trim();
    if tag_id.is_empty() {
        return Err(ApiError::BadRequest("tag_id must not be empty".to_string()));
    }

    let timestamp = match body.timestamp {
        None | Some(Value::Null) => None,
        Some(raw) => Some(normalize::parse_timestamp(&raw).ok_or_else(|| {
            ApiError::BadRequest(format!("unrecognized timestamp: {raw}"))
        })?),
    };

    let telemetry = Telemetry {
        tag_id: tag_id.to_string(),
        temperature: body
            .temperature
            .as_ref()
            .map_or(Temperature::Absent, normalize::coerce_temperature),
        timestamp,
    };

    let reading = state.recorder.record(telemetry, ReadingSource::Manual).await?;
    info!(
        "POST /readings - stored {} for tag {} as {}",
        reading.id, reading.tag_id, reading.state
    );
    Ok((StatusCode::CREATED, Json(reading)))
}

async fn list(State(state): State<AppState>) -> Result<Json<Vec<Reading>>, ApiError> {
    Ok(Json(state.readings.list(LIST_LIMIT).await?))
}

async fn list_by_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<String>,
) -> Result<Json<Vec<Reading>>, ApiError> {
    Ok(Json(state.readings.list_by_tag(&tag_id, TAG_LIST_LIMIT).await?))
}

async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    // ---
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::BadRequest(format!("invalid reading id: {id}")))?;

    state.readings.delete(id).await.map_err(|e| match e {
        StoreError::NotFound => ApiError::not_found("reading"),
        other => other.into(),
    })?;

    info!("DELETE /readings/{} - removed", id);
    Ok(Json(serde_json::json!({ "message": "reading deleted" })))
}
