//! Aggregated transfer endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use tracing::instrument;

use crate::api::middleware::error::ApiError;
use crate::api::models::{ErrorResponse, TransferResponse, TransfersQuery, TransfersResponse};
use crate::app_state::AppState;
use crate::events::TransferRecord;

/// Largest accepted `limit`.
const MAX_LIMIT: usize = 1000;

#[utoipa::path(
    get,
    path = "/api/v1/transfers",
    params(TransfersQuery),
    responses(
        (status = 200, description = "Aggregated transfers, newest first", body = TransfersResponse),
        (status = 400, description = "Invalid limit", body = ErrorResponse)
    ),
    tag = "Transfers"
)]
/// Returns the aggregated transfer set.
#[instrument(skip(state))]
pub async fn list_transfers(
    State(state): State<AppState>,
    Query(query): Query<TransfersQuery>,
) -> Result<Json<TransfersResponse>, ApiError> {
    if query.limit == 0 || query.limit > MAX_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }

    let snapshot = state.aggregator.transfers();
    Ok(Json(transfers_response(&snapshot, query.limit)))
}

/// First `limit` records of a snapshot.
pub(crate) fn transfers_response(records: &[TransferRecord], limit: usize) -> TransfersResponse {
    TransfersResponse {
        total: records.len(),
        transfers: records
            .iter()
            .take(limit)
            .map(TransferResponse::from)
            .collect(),
    }
}
