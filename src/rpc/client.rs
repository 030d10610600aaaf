//! Node access behind the storage and transfer capability traits.
//!
//! [`ChainClient`] wraps an HTTP provider, plus an optional WebSocket URL
//! used only for head notifications. It implements:
//!
//! - [`StorageReader`] with `eth_getStorageAt`
//! - [`TransferFeed`] with `eth_getBlockByNumber`, `eth_getLogs` and a
//!   background head watcher
//!
//! ```text
//! watch_blocks:   WebSocket newHeads ──(connect fails after retries)──> HTTP polling
//!                        │                                                  │
//!                        └──────────────> mpsc::Sender<BlockHead> <─────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::providers::Provider as AlloyProvider;
use alloy::transports::{RpcError, TransportErrorKind};
use futures_util::stream::StreamExt;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use super::http::{create_provider, get_latest_block, Provider};
use super::websocket::{ReconnectingWebSocket, WebSocketProvider};
use crate::aggregator::{BlockHead, TransferFeed};
use crate::error::{WatchError, WatchResult};
use crate::events::{create_transfer_filter, decode_transfer_log, RawTransfer};
use crate::storage::slots::slot_hex;
use crate::storage::{StorageReader, StorageWord};

/// Buffered heads between the watcher task and its consumer.
const HEAD_CHANNEL_CAPACITY: usize = 64;

/// JSON-RPC "invalid params" error code.
const INVALID_PARAMS: i64 = -32602;

/// Node client shared by the resolver, the aggregator and the API.
///
/// Cloning is cheap and clones share the underlying connection.
#[derive(Clone)]
pub struct ChainClient {
    provider: Provider,
    ws_url: Option<String>,
    ws_active: Arc<AtomicBool>,
}

impl ChainClient {
    /// Client over an existing HTTP provider.
    #[must_use]
    pub fn new(provider: Provider, ws_url: Option<String>) -> Self {
        Self {
            provider,
            ws_url,
            ws_active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create the HTTP provider for `rpc_url` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::ConfigError`] if `rpc_url` is malformed.
    pub async fn connect(rpc_url: &str, ws_url: Option<String>) -> WatchResult<Self> {
        Ok(Self::new(create_provider(rpc_url).await?, ws_url))
    }

    /// Underlying HTTP provider.
    #[must_use]
    pub const fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Whether heads currently arrive over WebSocket rather than polling.
    #[must_use]
    pub fn ws_active(&self) -> bool {
        self.ws_active.load(Ordering::Relaxed)
    }

    /// Relay WebSocket heads until shutdown, reconnecting on disconnect.
    ///
    /// Returns `Ok` on shutdown or when the receiver is gone, `Err` once
    /// reconnection gives up.
    async fn forward_ws_heads(
        &self,
        ws_url: &str,
        tx: &mpsc::Sender<BlockHead>,
        shutdown: &CancellationToken,
    ) -> WatchResult<()> {
        let mut ws = ReconnectingWebSocket::new(ws_url.to_owned());
        ws.connect().await?;

        loop {
            let provider = ws
                .provider()
                .ok_or_else(|| WatchError::websocket_connection("no active connection", None))?;

            self.ws_active.store(true, Ordering::Relaxed);
            let relayed = relay_heads(provider, tx, shutdown).await;
            self.ws_active.store(false, Ordering::Relaxed);

            match relayed? {
                Relay::Stopped => return Ok(()),
                Relay::Disconnected => {
                    ws.reconnect().await?;
                }
            }
        }
    }
}

impl std::fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient")
            .field("ws_url", &self.ws_url.as_deref().map(super::websocket::endpoint_host))
            .field("ws_active", &self.ws_active())
            .finish_non_exhaustive()
    }
}

enum Relay {
    Stopped,
    Disconnected,
}

async fn relay_heads(
    provider: &WebSocketProvider,
    tx: &mpsc::Sender<BlockHead>,
    shutdown: &CancellationToken,
) -> WatchResult<Relay> {
    let heads = provider.subscribe_blocks().await?;
    let mut heads = std::pin::pin!(heads);

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => return Ok(Relay::Stopped),
            () = tx.closed() => return Ok(Relay::Stopped),
            head = heads.next() => match head {
                Some(head) => {
                    if tx.send(head).await.is_err() {
                        return Ok(Relay::Stopped);
                    }
                }
                None => {
                    warn!("Block subscription ended");
                    return Ok(Relay::Disconnected);
                }
            },
        }
    }
}

/// Poll the latest block and send it whenever it changes.
///
/// The first poll happens immediately.
async fn poll_heads(
    provider: &Provider,
    interval: Duration,
    tx: &mpsc::Sender<BlockHead>,
    shutdown: &CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = None;

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            () = tx.closed() => break,
            _ = ticker.tick() => {}
        }

        match get_latest_block(provider).await {
            Ok(head) if last != Some(head) && !shutdown.is_cancelled() => {
                last = Some(head);
                if tx.send(head).await.is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Head poll failed"),
        }
    }
}

fn storage_error(slot: U256, error: RpcError<TransportErrorKind>) -> WatchError {
    let context = format!("getStorageAt({})", slot_hex(slot));
    if let RpcError::ErrorResp(payload) = &error {
        if payload.code == INVALID_PARAMS {
            return WatchError::invalid_slot(format!("{context}: {}", payload.message));
        }
    }
    WatchError::node_unavailable(context, Some(Box::new(error)))
}

impl StorageReader for ChainClient {
    async fn storage_at(&self, contract: Address, slot: U256) -> WatchResult<StorageWord> {
        self.provider
            .get_storage_at(contract, slot)
            .await
            .map(StorageWord::from)
            .map_err(|e| storage_error(slot, e))
    }
}

impl TransferFeed for ChainClient {
    async fn latest_block(&self) -> WatchResult<BlockHead> {
        get_latest_block(&self.provider).await
    }

    #[instrument(skip(self), fields(token = %token))]
    async fn transfers(
        &self,
        token: Address,
        from_block: u64,
        to_block: u64,
    ) -> WatchResult<Vec<RawTransfer>> {
        let filter = create_transfer_filter(token, from_block, to_block);
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| {
                WatchError::node_unavailable(
                    format!("getLogs({from_block}..={to_block}) failed"),
                    Some(Box::new(e)),
                )
            })?;

        let transfers: Vec<RawTransfer> = logs
            .iter()
            .filter_map(|log| {
                decode_transfer_log(log)
                    .inspect_err(|e| warn!(error = %e, tx = ?log.transaction_hash, "Skipping undecodable log"))
                    .ok()
            })
            .collect();

        debug!(
            from_block,
            to_block,
            logs = logs.len(),
            transfers = transfers.len(),
            "Transfer logs fetched"
        );
        Ok(transfers)
    }

    fn watch_blocks(
        &self,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> mpsc::Receiver<BlockHead> {
        let (tx, rx) = mpsc::channel(HEAD_CHANNEL_CAPACITY);
        let client = self.clone();

        tokio::spawn(
            async move {
                if let Some(ws_url) = client.ws_url.as_deref() {
                    match client.forward_ws_heads(ws_url, &tx, &shutdown).await {
                        Ok(()) => return,
                        Err(e) => {
                            warn!(error = %e, "WebSocket heads unavailable, falling back to HTTP polling");
                        }
                    }
                }
                info!(interval_ms = interval.as_millis(), "Polling for new heads");
                poll_heads(&client.provider, interval, &tx, &shutdown).await;
                debug!("Head watcher stopped");
            }
            .instrument(info_span!("block_watch")),
        );

        rx
    }
}
