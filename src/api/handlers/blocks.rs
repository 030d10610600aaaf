//! Chain head endpoint.

use axum::{extract::State, Json};
use tracing::instrument;

use crate::api::middleware::error::ApiError;
use crate::api::models::{BlockResponse, ErrorResponse};
use crate::app_state::AppState;

#[utoipa::path(
    get,
    path = "/api/v1/blocks/latest",
    responses(
        (status = 200, description = "Latest delivered head", body = BlockResponse),
        (status = 404, description = "No head delivered yet", body = ErrorResponse)
    ),
    tag = "Blocks"
)]
/// Returns the most recent head delivered by block notifications.
#[instrument(skip(state))]
pub async fn latest_block(State(state): State<AppState>) -> Result<Json<BlockResponse>, ApiError> {
    state
        .aggregator
        .latest_head()
        .map(|head| Json(head.into()))
        .ok_or_else(|| ApiError::NotFound("No block received yet".to_string()))
}
