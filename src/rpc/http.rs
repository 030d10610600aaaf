//! HTTP provider creation and head queries.
//!
//! ## Example
//!
//! ```no_run
//! use eth_lock_watch::rpc::{create_provider, get_latest_block};
//! use eth_lock_watch::error::WatchResult;
//!
//! # async fn example() -> WatchResult<()> {
//! let provider = create_provider("https://eth-mainnet.g.alchemy.com/v2/API_KEY").await?;
//! let latest = get_latest_block(&provider).await?;
//! println!("Latest block: {} ({})", latest.number, latest.hash);
//! # Ok(())
//! # }
//! ```

use alloy::eips::BlockNumberOrTag;
use alloy::providers::{Provider as AlloyProvider, ProviderBuilder, RootProvider};
use alloy::rpc::types::BlockTransactionsKind;
use alloy::transports::http::{Client, Http};
use tracing::{debug, info, instrument, warn};

use super::websocket::endpoint_host;
use crate::aggregator::BlockHead;
use crate::error::{WatchError, WatchResult};

/// HTTP provider type.
pub type Provider = RootProvider<Http<Client>>;

/// Create an HTTP provider for `rpc_url`.
///
/// No request is sent; an unreachable node shows up on the first call.
///
/// # Errors
///
/// Returns [`WatchError::ConfigError`] if the URL cannot be parsed.
#[allow(clippy::unused_async)]
#[instrument(skip(rpc_url), fields(rpc_host = tracing::field::Empty))]
pub async fn create_provider(rpc_url: &str) -> WatchResult<Provider> {
    let host = endpoint_host(rpc_url);
    tracing::Span::current().record("rpc_host", host);
    debug!(rpc_host = host, "Creating HTTP provider");

    let url = rpc_url.parse().map_err(|e| {
        let msg = if rpc_url.starts_with("http") {
            format!("Failed to parse RPC URL: '{host}'")
        } else {
            format!("Invalid RPC URL: '{host}'. Expected an http(s) endpoint such as 'https://eth-mainnet.g.alchemy.com/v2/YOUR_KEY'")
        };
        WatchError::config(msg, Some(Box::new(e)))
    })?;

    let provider = ProviderBuilder::new().on_http(url);
    info!(rpc_host = host, "RPC provider initialized");
    Ok(provider)
}

/// Fetch number and hash of the latest block.
///
/// # Errors
///
/// Returns [`WatchError::NodeUnavailable`] if the request fails or the node
/// has no latest block.
#[instrument(skip(provider), fields(block = tracing::field::Empty, duration_ms = tracing::field::Empty))]
pub async fn get_latest_block(provider: &Provider) -> WatchResult<BlockHead> {
    let start = std::time::Instant::now();
    let block = provider
        .get_block_by_number(BlockNumberOrTag::Latest, BlockTransactionsKind::Hashes)
        .await
        .map_err(|e| WatchError::node_unavailable("failed to fetch latest block", Some(Box::new(e))))?
        .ok_or_else(|| WatchError::node_unavailable("node returned no latest block", None))?;

    let head = BlockHead {
        number: block.header.number,
        hash: block.header.hash,
    };

    let duration = start.elapsed();
    tracing::Span::current().record("block", head.number);
    tracing::Span::current().record("duration_ms", duration.as_millis());
    debug!(
        block = head.number,
        duration_ms = duration.as_millis(),
        "Latest block fetched"
    );

    Ok(head)
}

/// Verify the node answers by fetching the latest block.
///
/// # Errors
///
/// Returns [`WatchError::NodeUnavailable`] if the node does not answer.
#[instrument(skip(provider))]
pub async fn check_connection(provider: &Provider) -> WatchResult<BlockHead> {
    match get_latest_block(provider).await {
        Ok(head) => {
            info!(block = head.number, "Connection check successful");
            Ok(head)
        }
        Err(e) => {
            warn!(error = %e, "Connection check failed");
            Err(WatchError::node_unavailable(
                format!("provider health check failed: {e}"),
                None,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_provider_invalid_url() {
        let result = create_provider("not-a-valid-url").await;
        assert!(matches!(result, Err(WatchError::ConfigError { .. })));
    }

    #[tokio::test]
    async fn test_create_provider_does_not_connect() {
        assert!(create_provider("http://127.0.0.1:1").await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_node_is_node_unavailable() {
        let provider = create_provider("http://127.0.0.1:1").await.unwrap();
        let result = get_latest_block(&provider).await;
        assert!(matches!(&result, Err(e) if e.is_retriable()));
    }

    #[tokio::test]
    #[ignore = "Requires RPC_URL environment variable"]
    async fn test_get_latest_block_integration() {
        let Ok(rpc_url) = std::env::var("RPC_URL") else {
            return;
        };
        let provider = create_provider(&rpc_url).await.unwrap();
        let head = check_connection(&provider).await.unwrap();
        assert!(head.number > 0);
    }
}
