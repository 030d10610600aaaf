//! In-memory chain access shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use eth_lock_watch::aggregator::{BlockHead, TransferFeed};
use eth_lock_watch::error::{WatchError, WatchResult};
use eth_lock_watch::events::RawTransfer;
use eth_lock_watch::storage::{encode_packed_word, ArrayLayout, StorageReader, StorageWord};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

/// Contract storage held in a map. Unset slots read as zero.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    slots: Arc<Mutex<HashMap<U256, StorageWord>>>,
    failing: Arc<Mutex<HashSet<U256>>>,
    stalled: Arc<Mutex<Option<U256>>>,
    reads: Arc<AtomicUsize>,
    stall_entered: Arc<Notify>,
}

impl MemoryStorage {
    /// Storage holding `length` at the length slot of the standard layout.
    pub fn with_length(length: u64) -> Self {
        let storage = Self::default();
        storage.set(ArrayLayout::locks().length_slot(), U256::from(length));
        storage
    }

    /// Write a raw value.
    pub fn set(&self, slot: U256, value: U256) {
        self.slots
            .lock()
            .unwrap()
            .insert(slot, StorageWord::from(value));
    }

    /// Write element `index` of the standard lock array.
    pub fn put_lock(&self, index: u64, holder: Address, start_time: u64, amount: U256) {
        let base = ArrayLayout::locks().element_slot(index).unwrap();
        self.slots
            .lock()
            .unwrap()
            .insert(base, encode_packed_word(holder, start_time));
        self.set(base + U256::from(1), amount);
    }

    /// Make reads of `slot` fail with `NodeUnavailable`.
    pub fn fail_at(&self, slot: U256) {
        self.failing.lock().unwrap().insert(slot);
    }

    /// Make reads of `slot` hang forever.
    pub fn stall_at(&self, slot: U256) {
        *self.stalled.lock().unwrap() = Some(slot);
    }

    /// Resolves once a read has reached the stalled slot.
    pub async fn stall_reached(&self) {
        self.stall_entered.notified().await;
    }

    /// Number of storage reads served so far, including failed ones.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl StorageReader for MemoryStorage {
    async fn storage_at(&self, _contract: Address, slot: U256) -> WatchResult<StorageWord> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let stalled = *self.stalled.lock().unwrap();
        if stalled == Some(slot) {
            self.stall_entered.notify_one();
            std::future::pending::<()>().await;
        }

        if self.failing.lock().unwrap().contains(&slot) {
            return Err(WatchError::node_unavailable("connection reset", None));
        }
        Ok(self
            .slots
            .lock()
            .unwrap()
            .get(&slot)
            .copied()
            .unwrap_or_default())
    }
}

/// One scripted answer to a `transfers` query.
pub type TransferReply = WatchResult<Vec<RawTransfer>>;

/// Transfer feed answering from scripted queues.
#[derive(Clone, Default)]
pub struct ScriptedFeed {
    heads: Arc<Mutex<VecDeque<WatchResult<BlockHead>>>>,
    replies: Arc<Mutex<VecDeque<TransferReply>>>,
    queries: Arc<Mutex<Vec<(u64, u64)>>>,
    pushed_heads: Arc<Mutex<Vec<BlockHead>>>,
}

impl ScriptedFeed {
    /// Queue an answer for the next `latest_block` call.
    pub fn push_head(&self, head: WatchResult<BlockHead>) {
        self.heads.lock().unwrap().push_back(head);
    }

    /// Queue an answer for the next `transfers` call.
    pub fn push_reply(&self, reply: TransferReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Heads delivered through `watch_blocks` as soon as it is called.
    pub fn push_notification(&self, head: BlockHead) {
        self.pushed_heads.lock().unwrap().push(head);
    }

    /// `(from, to)` ranges queried so far.
    pub fn queries(&self) -> Vec<(u64, u64)> {
        self.queries.lock().unwrap().clone()
    }
}

impl TransferFeed for ScriptedFeed {
    async fn latest_block(&self) -> WatchResult<BlockHead> {
        self.heads
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(WatchError::node_unavailable("no scripted head", None)))
    }

    async fn transfers(
        &self,
        _token: Address,
        from_block: u64,
        to_block: u64,
    ) -> WatchResult<Vec<RawTransfer>> {
        self.queries.lock().unwrap().push((from_block, to_block));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn watch_blocks(
        &self,
        _interval: Duration,
        shutdown: CancellationToken,
    ) -> mpsc::Receiver<BlockHead> {
        let (tx, rx) = mpsc::channel(16);
        let heads = self.pushed_heads.lock().unwrap().clone();
        tokio::spawn(async move {
            for head in heads {
                if tx.send(head).await.is_err() {
                    return;
                }
            }
            shutdown.cancelled().await;
        });
        rx
    }
}

/// Head with a hash derived from its number.
pub fn head(number: u64) -> BlockHead {
    BlockHead {
        number,
        hash: B256::left_padding_from(&number.to_be_bytes()),
    }
}

/// Raw transfer of `value` base units in `block`.
pub fn transfer(block: u64, log_index: u64, value: u64) -> RawTransfer {
    RawTransfer {
        block_number: block,
        log_index: Some(log_index),
        from: Address::repeat_byte(0x11),
        to: Address::repeat_byte(0x22),
        value: U256::from(value),
        transaction_hash: B256::left_padding_from(&(block * 1000 + log_index).to_be_bytes()),
    }
}
