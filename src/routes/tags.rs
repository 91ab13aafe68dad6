//! Tags seen in readings that no product claims yet.

use axum::{extract::State, routing::get, Json, Router};

use super::AppState;
use crate::error::ApiError;
use crate::models::TagSummary;

pub fn router() -> Router<AppState> {
    Router::new().route("/tags/unassociated", get(unassociated))
}

/// `GET /tags/unassociated`, most recently seen first.
async fn unassociated(State(state): State<AppState>) -> Result<Json<Vec<TagSummary>>, ApiError> {
    // ---
    let mut orphans = Vec::new();
    for summary in state.readings.tag_summaries().await? {
        if state.products.find_by_tag(&summary.tag_id).await?.is_none() {
            orphans.push(summary);
        }
    }
    Ok(Json(orphans))
}
