//! OpenAPI documentation for the REST API.

use utoipa::OpenApi;

use crate::api::handlers;

/// OpenAPI documentation for the REST API.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::locks::list_locks,
        handlers::locks::get_length,
        handlers::locks::get_lock,
        handlers::transfers::list_transfers,
        handlers::blocks::latest_block,
        handlers::stream::websocket_handler,
    ),
    components(schemas(
        crate::api::models::HealthResponse,
        crate::api::models::HealthStatus,
        crate::api::models::AggregatorInfo,
        crate::api::models::LockResponse,
        crate::api::models::LocksResponse,
        crate::api::models::LengthResponse,
        crate::api::models::TransferResponse,
        crate::api::models::TransfersResponse,
        crate::api::models::BlockResponse,
        crate::api::models::ErrorResponse,
    )),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Locks", description = "Decoded contract storage"),
        (name = "Transfers", description = "Aggregated transfer events"),
        (name = "Blocks", description = "Chain heads"),
        (name = "Streaming", description = "WebSocket streaming"),
    ),
    info(
        title = "ETH Lock Watch API",
        version = "1.0.0",
        description = "Decoded lock storage and live token transfers",
    )
)]
pub struct ApiDoc;
