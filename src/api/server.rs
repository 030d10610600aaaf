//! Axum server setup and routing.

use std::net::SocketAddr;

use axum::http::HeaderValue;
use axum::{middleware, routing::get, Router};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{docs::ApiDoc, handlers, middleware as api_middleware};
use crate::app_state::AppState;

/// Build the application router with its middleware stack.
pub fn router(state: AppState, rate_limit_rpm: u32, cors_origins: &[String]) -> Router {
    let limiter = api_middleware::rate_limit::create_rate_limiter(rate_limit_rpm);

    let api_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/locks", get(handlers::locks::list_locks))
        .route("/locks/length", get(handlers::locks::get_length))
        .route("/locks/:index", get(handlers::locks::get_lock))
        .route("/transfers", get(handlers::transfers::list_transfers))
        .route("/blocks/latest", get(handlers::blocks::latest_block))
        .route("/stream", get(handlers::stream::websocket_handler));

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(cors_origins))
        .layer(middleware::from_fn(api_middleware::logging::log_requests))
        .layer(middleware::from_fn(move |req, next| {
            api_middleware::rate_limit::rate_limit(limiter.clone(), req, next)
        }));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api/v1", api_routes)
        .layer(middleware_stack)
        .with_state(state)
}

/// Run the Axum API server until `shutdown` fires.
///
/// # Errors
///
/// Returns an error if the port cannot be bound or the server fails.
pub async fn run_server(
    state: AppState,
    port: u16,
    rate_limit_rpm: u32,
    cors_origins: &[String],
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(state, rate_limit_rpm, cors_origins);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, rate_limit_rpm, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("API server stopped");
    Ok(())
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::new().allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin
                .parse::<HeaderValue>()
                .inspect_err(|_| warn!(origin = %origin, "Ignoring invalid CORS origin"))
                .ok()
        })
        .collect();
    CorsLayer::new().allow_origin(allowed)
}
