//! WebSocket provider for push-based block notifications.
//!
//! Only `newHeads` is subscribed to. Transfer logs are always fetched over
//! HTTP in block ranges, so a dropped WebSocket can never lose events: the
//! next polling cycle catches up from its cursor.
//!
//! # Reconnection
//!
//! [`ReconnectingWebSocket`] retries failed connections with exponential
//! backoff capped at a maximum delay, with ±25% jitter on every delay.

use std::time::Duration;

use alloy::{
    providers::{Provider, ProviderBuilder, RootProvider},
    transports::BoxTransport,
};
use futures_util::stream::{Stream, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::aggregator::BlockHead;
use crate::error::{WatchError, WatchResult};

/// Strip the path (which often carries an API key) from an endpoint URL.
pub(crate) fn endpoint_host(url: &str) -> &str {
    url.split("/v2/").next().unwrap_or("unknown")
}

/// WebSocket connection to a node.
///
/// # Example
///
/// ```no_run
/// use eth_lock_watch::rpc::websocket::WebSocketProvider;
/// use futures_util::stream::StreamExt;
///
/// # async fn example() -> eth_lock_watch::error::WatchResult<()> {
/// let ws = WebSocketProvider::connect("wss://eth-mainnet.g.alchemy.com/v2/KEY".to_string()).await?;
/// let heads = ws.subscribe_blocks().await?;
/// let mut heads = std::pin::pin!(heads);
///
/// while let Some(head) = heads.next().await {
///     println!("block {} {}", head.number, head.hash);
/// }
/// # Ok(())
/// # }
/// ```
pub struct WebSocketProvider {
    provider: RootProvider<BoxTransport>,
    url: String,
}

impl WebSocketProvider {
    /// Connect to a WebSocket RPC endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::WebSocketConnectionError`] if the handshake
    /// fails or the URL is invalid.
    #[instrument(skip(ws_url), fields(ws_host = tracing::field::Empty, duration_ms = tracing::field::Empty))]
    pub async fn connect(ws_url: String) -> WatchResult<Self> {
        let host = endpoint_host(&ws_url);
        tracing::Span::current().record("ws_host", host);
        info!(ws_host = host, "Connecting to WebSocket");

        let start = std::time::Instant::now();
        let provider = ProviderBuilder::new()
            .on_builtin(&ws_url)
            .await
            .map_err(|e| {
                error!(error = %e, ws_host = host, "WebSocket connection failed");
                WatchError::websocket_connection(
                    format!("failed to connect to {host}"),
                    Some(Box::new(e)),
                )
            })?;

        let duration = start.elapsed();
        tracing::Span::current().record("duration_ms", duration.as_millis());
        info!(
            ws_host = host,
            duration_ms = duration.as_millis(),
            "WebSocket connected"
        );

        Ok(Self {
            provider,
            url: ws_url,
        })
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Subscribe to new heads.
    ///
    /// The stream ends when the connection drops.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::WebSocketSubscriptionError`] if the node rejects
    /// the subscription.
    #[instrument(skip(self))]
    pub async fn subscribe_blocks(&self) -> WatchResult<impl Stream<Item = BlockHead>> {
        let subscription = self.provider.subscribe_blocks().await.map_err(|e| {
            error!(error = %e, "Block subscription failed");
            WatchError::websocket_subscription("newHeads subscription failed", Some(Box::new(e)))
        })?;

        info!("Block subscription active");
        Ok(subscription.into_stream().map(|header| BlockHead {
            number: header.number,
            hash: header.hash,
        }))
    }
}

/// Backoff policy for WebSocket reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Attempts before giving up.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound on the un-jittered delay.
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl Backoff {
    /// Un-jittered delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Scale `delay` by a random factor in `[0.75, 1.25]`.
#[must_use]
pub fn with_jitter(delay: Duration) -> Duration {
    let factor = 0.75 + rand::random::<f64>() * 0.5;
    delay.mul_f64(factor)
}

/// WebSocket provider that reconnects on failure.
///
/// # Example
///
/// ```no_run
/// use eth_lock_watch::rpc::websocket::ReconnectingWebSocket;
///
/// # async fn example() -> eth_lock_watch::error::WatchResult<()> {
/// let mut ws = ReconnectingWebSocket::new("wss://eth-mainnet.g.alchemy.com/v2/KEY".to_string());
/// ws.connect().await?;
/// # Ok(())
/// # }
/// ```
pub struct ReconnectingWebSocket {
    url: String,
    provider: Option<WebSocketProvider>,
    backoff: Backoff,
}

impl ReconnectingWebSocket {
    /// Reconnecting WebSocket with the default [`Backoff`].
    #[must_use]
    pub fn new(url: String) -> Self {
        Self::with_backoff(url, Backoff::default())
    }

    /// Reconnecting WebSocket with a custom backoff policy.
    #[must_use]
    pub const fn with_backoff(url: String, backoff: Backoff) -> Self {
        Self {
            url,
            provider: None,
            backoff,
        }
    }

    /// Connect, retrying with backoff.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::MaxReconnectAttemptsExceeded`] once every
    /// attempt has failed.
    pub async fn connect(&mut self) -> WatchResult<&WebSocketProvider> {
        let mut attempt = 0;

        loop {
            match WebSocketProvider::connect(self.url.clone()).await {
                Ok(provider) => {
                    info!(attempts = attempt + 1, "WebSocket connection established");
                    return Ok(self.provider.insert(provider));
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.backoff.max_attempts {
                        error!(attempts = attempt, "Max reconnection attempts reached");
                        return Err(WatchError::max_reconnect_exceeded(attempt, e.to_string()));
                    }

                    let delay = with_jitter(self.backoff.delay_for(attempt));
                    warn!(
                        attempt,
                        max_attempts = self.backoff.max_attempts,
                        error = %e,
                        retry_in_ms = delay.as_millis(),
                        "WebSocket connection failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    debug!(attempt = attempt + 1, "Retrying WebSocket connection");
                }
            }
        }
    }

    /// Drop the current connection and connect again.
    ///
    /// # Errors
    ///
    /// See [`Self::connect`].
    pub async fn reconnect(&mut self) -> WatchResult<&WebSocketProvider> {
        warn!("Reconnecting WebSocket after disconnection");
        self.provider = None;
        self.connect().await
    }

    /// Current connection, if any.
    #[must_use]
    pub const fn provider(&self) -> Option<&WebSocketProvider> {
        self.provider.as_ref()
    }

    /// Whether a connection is held.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.provider.is_some()
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}
