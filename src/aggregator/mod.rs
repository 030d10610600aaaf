//! Live aggregation of token `Transfer` events.
//!
//! [`LogAggregator`] owns all mutable aggregation state and is the only
//! writer of it. Two independent sources drive it:
//!
//! - **block notifications** from [`TransferFeed::watch_blocks`], which update
//!   the latest head
//! - **a polling timer** firing every `poll_interval`, on which the aggregator
//!   fetches `Transfer` logs for the blocks it has not covered yet and merges
//!   them into its [`AggregatedLogSet`]
//!
//! Both are handled inside one `select!` loop, so merges are serialized and
//! never re-entered. Consumers read state through an [`AggregatorHandle`] of
//! `watch` receivers.
//!
//! # Polling cycles
//!
//! ```text
//! cursor = first block not covered yet (None before the first cycle)
//! head   = latest block
//! range  = cursor.unwrap_or(head) ..= head, split into max_block_span chunks
//! ```
//!
//! Chunks are fetched in order. If one fails, the chunks before it are still
//! merged and the cursor stops at the failed chunk, so the next cycle retries
//! it. This holds for the very first cycle too: once a range has been
//! attempted, the cursor is pinned to its start. A failed cycle never clears
//! previously merged records.

mod set;

pub use set::AggregatedLogSet;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::{Address, B256};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{WatchError, WatchResult};
use crate::events::{sort_chain_order, RawTransfer, TransferRecord};

/// A chain head as delivered by block notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockHead {
    /// Block number.
    pub number: u64,
    /// Block hash.
    pub hash: B256,
}

/// Chain access the aggregator needs.
///
/// Implementations map transport failures to
/// [`WatchError::NodeUnavailable`].
pub trait TransferFeed {
    /// Latest block of the chain.
    fn latest_block(&self) -> impl Future<Output = WatchResult<BlockHead>> + Send;

    /// `Transfer` events emitted by `token` in `[from_block, to_block]`, in
    /// chain order.
    fn transfers(
        &self,
        token: Address,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = WatchResult<Vec<RawTransfer>>> + Send;

    /// Start delivering new heads on a channel.
    ///
    /// Delivery stops when `shutdown` fires or the receiver is dropped.
    /// `interval` is the polling period for feeds without push support.
    fn watch_blocks(&self, interval: Duration, shutdown: CancellationToken)
        -> mpsc::Receiver<BlockHead>;
}

/// Fixed parameters of one aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorSettings {
    /// Token whose `Transfer` events are aggregated.
    pub token: Address,
    /// Decimal exponent the raw value is scaled by.
    pub decimals: u8,
    /// Polling period.
    pub poll_interval: Duration,
    /// Maximum number of blocks per log query.
    pub max_block_span: u64,
}

/// Counters describing the polling loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregatorStats {
    /// Completed polling cycles, successful or not.
    pub cycles: u64,
    /// Cycles in which at least one query failed.
    pub failed_cycles: u64,
    /// Distinct records in the set.
    pub records: usize,
    /// First block not covered yet.
    pub next_block: Option<u64>,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

/// Read-only view of an aggregator.
#[derive(Debug, Clone)]
pub struct AggregatorHandle {
    /// Latest head delivered by block notifications.
    pub heads: watch::Receiver<Option<BlockHead>>,
    /// Aggregated transfers, newest first.
    pub transfers: watch::Receiver<Arc<Vec<TransferRecord>>>,
    /// Polling statistics.
    pub stats: watch::Receiver<AggregatorStats>,
}

impl AggregatorHandle {
    /// Latest head, if any has arrived.
    #[must_use]
    pub fn latest_head(&self) -> Option<BlockHead> {
        *self.heads.borrow()
    }

    /// Current transfer snapshot.
    #[must_use]
    pub fn transfers(&self) -> Arc<Vec<TransferRecord>> {
        Arc::clone(&self.transfers.borrow())
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> AggregatorStats {
        self.stats.borrow().clone()
    }
}

/// Logs gathered by one polling cycle, not yet merged.
#[derive(Debug, Default)]
pub struct CycleFetch {
    transfers: Vec<RawTransfer>,
    attempted_from: Option<u64>,
    covered_to: Option<u64>,
    error: Option<WatchError>,
}

impl CycleFetch {
    /// Raw transfers of the chunks that succeeded, in chain order.
    #[must_use]
    pub fn transfers(&self) -> &[RawTransfer] {
        &self.transfers
    }

    /// First block the cycle queried, if it queried anything.
    #[must_use]
    pub const fn attempted_from(&self) -> Option<u64> {
        self.attempted_from
    }

    /// Last block covered by a successful chunk.
    #[must_use]
    pub const fn covered_to(&self) -> Option<u64> {
        self.covered_to
    }

    /// Failure that cut the cycle short.
    #[must_use]
    pub const fn error(&self) -> Option<&WatchError> {
        self.error.as_ref()
    }
}

/// Single-writer aggregation loop over a [`TransferFeed`].
pub struct LogAggregator<F> {
    feed: F,
    settings: AggregatorSettings,
    set: AggregatedLogSet,
    next_block: Option<u64>,
    stats: AggregatorStats,
    head_tx: watch::Sender<Option<BlockHead>>,
    transfers_tx: watch::Sender<Arc<Vec<TransferRecord>>>,
    stats_tx: watch::Sender<AggregatorStats>,
}

impl<F: TransferFeed> LogAggregator<F> {
    /// Create an aggregator and the handle to observe it.
    #[must_use]
    pub fn new(feed: F, settings: AggregatorSettings) -> (Self, AggregatorHandle) {
        let (head_tx, heads) = watch::channel(None);
        let (transfers_tx, transfers) = watch::channel(Arc::new(Vec::new()));
        let (stats_tx, stats) = watch::channel(AggregatorStats::default());

        let aggregator = Self {
            feed,
            settings,
            set: AggregatedLogSet::new(),
            next_block: None,
            stats: AggregatorStats::default(),
            head_tx,
            transfers_tx,
            stats_tx,
        };
        let handle = AggregatorHandle {
            heads,
            transfers,
            stats,
        };
        (aggregator, handle)
    }

    /// Records merged so far, newest first.
    #[must_use]
    pub fn records(&self) -> &[TransferRecord] {
        self.set.records()
    }

    /// Current statistics.
    #[must_use]
    pub const fn stats(&self) -> &AggregatorStats {
        &self.stats
    }

    /// Apply a block notification.
    pub fn record_block(&mut self, head: BlockHead) {
        debug!(block = head.number, hash = %head.hash, "New head");
        self.head_tx.send_replace(Some(head));
    }

    /// Query the feed for the blocks not covered yet.
    ///
    /// Takes `&self`: nothing is mutated until [`Self::apply_cycle`], so a
    /// fetch abandoned mid-way leaves no trace.
    #[instrument(skip(self), fields(from_block = tracing::field::Empty, to_block = tracing::field::Empty))]
    pub async fn fetch_cycle(&self) -> CycleFetch {
        let head = match self.feed.latest_block().await {
            Ok(head) => head,
            Err(e) => {
                return CycleFetch {
                    error: Some(e),
                    ..CycleFetch::default()
                }
            }
        };

        let from = self.next_block.unwrap_or(head.number);
        if from > head.number {
            debug!(head = head.number, "No new blocks since last cycle");
            return CycleFetch::default();
        }

        let span = tracing::Span::current();
        span.record("from_block", from);
        span.record("to_block", head.number);

        let mut fetch = CycleFetch {
            attempted_from: Some(from),
            ..CycleFetch::default()
        };
        for (start, end) in block_chunks(from, head.number, self.settings.max_block_span) {
            match self.feed.transfers(self.settings.token, start, end).await {
                Ok(batch) => {
                    fetch.transfers.extend(batch);
                    fetch.covered_to = Some(end);
                }
                Err(e) => {
                    fetch.error = Some(e);
                    break;
                }
            }
        }
        sort_chain_order(&mut fetch.transfers);
        fetch
    }

    /// Merge a fetched cycle and advance the cursor past what it covered.
    ///
    /// Returns the number of new records.
    pub fn apply_cycle(&mut self, fetch: CycleFetch) -> usize {
        let batch = fetch
            .transfers
            .iter()
            .map(|raw| TransferRecord::normalize(raw, self.settings.decimals));
        let added = self.set.merge(batch);

        match (fetch.covered_to, self.next_block) {
            (Some(end), _) => self.next_block = Some(end.saturating_add(1)),
            // first cycle failed outright: retry its range next time
            (None, None) => self.next_block = fetch.attempted_from,
            (None, Some(_)) => {}
        }

        self.stats.cycles += 1;
        self.stats.records = self.set.len();
        self.stats.next_block = self.next_block;

        if let Some(error) = fetch.error {
            self.stats.failed_cycles += 1;
            warn!(
                error = %error,
                failed_cycles = self.stats.failed_cycles,
                kept = self.set.len(),
                "Polling cycle failed, keeping previous transfers"
            );
            self.stats.last_error = Some(error.to_string());
        }

        if added > 0 {
            info!(added, total = self.set.len(), "Merged new transfers");
            self.transfers_tx
                .send_replace(Arc::new(self.set.records().to_vec()));
        }
        self.stats_tx.send_replace(self.stats.clone());

        added
    }

    /// Run one full cycle.
    pub async fn poll_once(&mut self) -> usize {
        let fetch = self.fetch_cycle().await;
        self.apply_cycle(fetch)
    }

    /// Drive both sources until `shutdown` fires.
    ///
    /// The first poll happens immediately and covers only the current head.
    /// A poll still in flight when `shutdown` fires is dropped unapplied.
    pub async fn run(mut self, shutdown: CancellationToken) -> AggregatorStats {
        let started = Instant::now();
        let mut blocks = self
            .feed
            .watch_blocks(self.settings.poll_interval, shutdown.child_token());
        let mut blocks_open = true;

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            token = %self.settings.token,
            poll_interval_ms = self.settings.poll_interval.as_millis(),
            max_block_span = self.settings.max_block_span,
            "Transfer aggregator started"
        );

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                head = blocks.recv(), if blocks_open => match head {
                    Some(head) => self.record_block(head),
                    None => {
                        blocks_open = false;
                        warn!("Block notifications ended, continuing with polling only");
                    }
                },
                _ = ticker.tick() => {
                    let fetched = tokio::select! {
                        biased;
                        () = shutdown.cancelled() => None,
                        fetch = self.fetch_cycle() => Some(fetch),
                    };
                    match fetched {
                        Some(fetch) if !shutdown.is_cancelled() => {
                            self.apply_cycle(fetch);
                        }
                        _ => break,
                    }
                }
            }
        }

        info!(
            cycles = self.stats.cycles,
            failed_cycles = self.stats.failed_cycles,
            records = self.set.len(),
            duration_ms = started.elapsed().as_millis(),
            "Transfer aggregator stopped"
        );
        self.stats
    }
}

/// Split `[from, to]` into consecutive ranges of at most `span` blocks.
///
/// A `span` of zero is treated as one.
pub fn block_chunks(from: u64, to: u64, span: u64) -> impl Iterator<Item = (u64, u64)> {
    let span = span.max(1);
    let mut next = (from <= to).then_some(from);
    std::iter::from_fn(move || {
        let start = next?;
        let end = start.saturating_add(span - 1).min(to);
        next = (end < to).then(|| end + 1);
        Some((start, end))
    })
}

/// Fetch and normalize the `Transfer` events of the last `blocks` blocks.
///
/// Covers `[latest - blocks, latest]` in chunks of `max_block_span`.
///
/// # Errors
///
/// Returns the first failing query's error; nothing is returned partially.
#[instrument(skip(feed), fields(from_block = tracing::field::Empty, to_block = tracing::field::Empty))]
pub async fn fetch_history<F: TransferFeed>(
    feed: &F,
    token: Address,
    decimals: u8,
    blocks: u64,
    max_block_span: u64,
) -> WatchResult<Vec<TransferRecord>> {
    let started = Instant::now();
    let latest = feed.latest_block().await?.number;
    let from = latest.saturating_sub(blocks);

    let span = tracing::Span::current();
    span.record("from_block", from);
    span.record("to_block", latest);

    let mut raw = Vec::new();
    for (start, end) in block_chunks(from, latest, max_block_span) {
        raw.extend(feed.transfers(token, start, end).await?);
    }
    sort_chain_order(&mut raw);

    let records: Vec<TransferRecord> = raw
        .iter()
        .map(|transfer| TransferRecord::normalize(transfer, decimals))
        .collect();

    info!(
        count = records.len(),
        duration_ms = started.elapsed().as_millis(),
        "Historical transfers fetched"
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_chunks() {
        let chunks: Vec<_> = block_chunks(100, 125, 10).collect();
        assert_eq!(chunks, vec![(100, 109), (110, 119), (120, 125)]);
    }

    #[test]
    fn test_block_chunks_single_block() {
        assert_eq!(block_chunks(7, 7, 10).collect::<Vec<_>>(), vec![(7, 7)]);
    }

    #[test]
    fn test_block_chunks_empty_range() {
        assert_eq!(block_chunks(8, 7, 10).count(), 0);
    }

    #[test]
    fn test_block_chunks_zero_span() {
        assert_eq!(
            block_chunks(1, 3, 0).collect::<Vec<_>>(),
            vec![(1, 1), (2, 2), (3, 3)]
        );
    }

    #[test]
    fn test_block_chunks_at_u64_max() {
        let chunks: Vec<_> = block_chunks(u64::MAX - 1, u64::MAX, 10).collect();
        assert_eq!(chunks, vec![(u64::MAX - 1, u64::MAX)]);
    }

    #[test]
    fn test_stats_serialize() {
        let stats = AggregatorStats {
            cycles: 3,
            failed_cycles: 1,
            records: 2,
            next_block: Some(10),
            last_error: Some("Node unavailable: timeout".to_string()),
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["failed_cycles"], 1);
        assert_eq!(json["next_block"], 10);
    }
}
