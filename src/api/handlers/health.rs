//! Health check endpoint.

use std::time::SystemTime;

use axum::{extract::State, Json};
use tracing::instrument;

use crate::aggregator::{AggregatorStats, BlockHead};
use crate::api::models::{HealthResponse, HealthStatus};
use crate::app_state::AppState;
use crate::storage::{Completion, LoaderState};

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    ),
    tag = "Health"
)]
/// Returns service health information.
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = SystemTime::now()
        .duration_since(state.start_time)
        .unwrap_or_default()
        .as_secs();

    let loader_state = state.locks.borrow().state;
    let latest = state.aggregator.latest_head();
    let stats = state.aggregator.stats();

    let head_source = if state.chain.ws_active() {
        "websocket"
    } else {
        "polling"
    };

    Json(HealthResponse {
        status: overall_status(loader_state, latest, &stats),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        loader_state: loader_state.to_string(),
        latest_block: latest.map(Into::into),
        head_source: head_source.to_string(),
        aggregator: stats.into(),
    })
}

/// Unhealthy when every polling cycle so far failed and no head ever
/// arrived; degraded when the loader failed or any cycle failed.
fn overall_status(
    loader: LoaderState,
    latest: Option<BlockHead>,
    stats: &AggregatorStats,
) -> HealthStatus {
    let never_reached = latest.is_none() && stats.cycles > 0 && stats.failed_cycles == stats.cycles;
    if never_reached {
        HealthStatus::Unhealthy
    } else if loader == LoaderState::Done(Completion::Failed) || stats.failed_cycles > 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    const HEAD: BlockHead = BlockHead {
        number: 1,
        hash: B256::ZERO,
    };

    #[test]
    fn test_fresh_service_is_healthy() {
        let status = overall_status(LoaderState::Idle, None, &AggregatorStats::default());
        assert_eq!(status, HealthStatus::Healthy);
    }

    #[test]
    fn test_failed_loader_degrades() {
        let status = overall_status(
            LoaderState::Done(Completion::Failed),
            Some(HEAD),
            &AggregatorStats::default(),
        );
        assert_eq!(status, HealthStatus::Degraded);
    }

    #[test]
    fn test_unreachable_node_is_unhealthy() {
        let stats = AggregatorStats {
            cycles: 3,
            failed_cycles: 3,
            ..AggregatorStats::default()
        };
        assert_eq!(
            overall_status(LoaderState::FetchingLength, None, &stats),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            overall_status(LoaderState::FetchingLength, Some(HEAD), &stats),
            HealthStatus::Degraded
        );
    }
}
