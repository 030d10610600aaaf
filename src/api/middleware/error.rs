//! Unified API error handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, warn};

use crate::api::models::ErrorResponse;
use crate::error::WatchError;

/// API-specific error type.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Invalid request parameters.
    BadRequest(String),
    /// The node could not be reached.
    Unavailable(String),
    /// Internal server error.
    InternalError(String),
    /// Rate limit exceeded.
    RateLimitExceeded,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::RateLimitExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_exceeded",
                "Rate limit exceeded. Please try again later.".to_string(),
            ),
            Self::Unavailable(msg) => {
                warn!(error = %msg, "Node unavailable in API handler");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "node_unavailable",
                    "Ethereum node unavailable, try again later".to_string(),
                )
            }
            Self::InternalError(msg) => {
                error!(error = %msg, "Internal error in API handler");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<WatchError> for ApiError {
    fn from(err: WatchError) -> Self {
        match err {
            WatchError::InvalidIndex { message } | WatchError::InvalidSlot { message } => {
                Self::BadRequest(message)
            }
            WatchError::NodeUnavailable { .. } => Self::Unavailable(err.to_string()),
            _ => Self::InternalError(err.to_string()),
        }
    }
}
