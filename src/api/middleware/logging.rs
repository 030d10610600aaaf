//! Request logging middleware using tracing.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::{info, warn};

/// Logs incoming requests and response metadata.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let duration_ms = start.elapsed().as_millis();

    if status.is_server_error() {
        warn!(method = %method, path, status = status.as_u16(), duration_ms, "Request failed");
    } else {
        info!(method = %method, path, status = status.as_u16(), duration_ms, "Request completed");
    }

    response
}
