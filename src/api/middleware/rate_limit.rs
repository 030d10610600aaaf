//! Rate limiting middleware.

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{extract::Request, middleware::Next, response::Response};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use tracing::debug;

use super::error::ApiError;

/// Shared rate limiter type.
pub type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Requests per minute used when the configured quota is zero.
const FALLBACK_RPM: NonZeroU32 = NonZeroU32::MIN.saturating_add(59);

/// Create a rate limiter with the specified RPM quota.
#[must_use]
pub fn create_rate_limiter(requests_per_minute: u32) -> SharedRateLimiter {
    let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(FALLBACK_RPM);
    Arc::new(RateLimiter::direct(Quota::per_minute(rpm)))
}

/// Rate limiting middleware.
///
/// # Errors
///
/// Returns [`ApiError::RateLimitExceeded`] when the quota is used up.
pub async fn rate_limit(
    limiter: SharedRateLimiter,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if limiter.check().is_err() {
        debug!(uri = %request.uri(), "Request rejected by rate limiter");
        return Err(ApiError::RateLimitExceeded);
    }
    Ok(next.run(request).await)
}
