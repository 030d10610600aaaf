//! Lock array endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{info, instrument};

use crate::api::middleware::error::ApiError;
use crate::api::models::{ErrorResponse, LengthResponse, LockResponse, LocksResponse};
use crate::app_state::AppState;
use crate::storage::checked_index;

#[utoipa::path(
    get,
    path = "/api/v1/locks",
    responses(
        (status = 200, description = "Records decoded so far", body = LocksResponse)
    ),
    tag = "Locks"
)]
/// Returns the progress of the background pagination session.
#[instrument(skip(state))]
pub async fn list_locks(State(state): State<AppState>) -> Json<LocksResponse> {
    Json(LocksResponse::from(&state.locks_snapshot()))
}

#[utoipa::path(
    get,
    path = "/api/v1/locks/length",
    responses(
        (status = 200, description = "Array length", body = LengthResponse),
        (status = 503, description = "Node unavailable", body = ErrorResponse)
    ),
    tag = "Locks"
)]
/// Reads the array length from the contract.
#[instrument(skip(state))]
pub async fn get_length(State(state): State<AppState>) -> Result<Json<LengthResponse>, ApiError> {
    let length = state.resolver.length().await?;

    Ok(Json(LengthResponse {
        contract: state.resolver.contract().to_string(),
        length,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/locks/{index}",
    params(
        ("index" = i64, Path, description = "Array index")
    ),
    responses(
        (status = 200, description = "Decoded element", body = LockResponse),
        (status = 400, description = "Invalid index", body = ErrorResponse),
        (status = 404, description = "Slot not written", body = ErrorResponse),
        (status = 503, description = "Node unavailable", body = ErrorResponse)
    ),
    tag = "Locks"
)]
/// Resolves a single element of the lock array.
#[instrument(skip(state))]
pub async fn get_lock(
    State(state): State<AppState>,
    Path(index): Path<i64>,
) -> Result<Json<LockResponse>, ApiError> {
    let index = checked_index(index)?;

    let record = state
        .resolver
        .resolve(index)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Lock {index} has not been written")))?;

    info!(index, holder = %record.holder, "Lock resolved");
    Ok(Json(LockResponse::from(&record)))
}
