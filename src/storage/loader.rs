//! Sequential pagination over the lock array.
//!
//! [`PaginatedLoader`] walks indices `0..length` one read at a time:
//!
//! ```text
//! Idle -> FetchingLength -> FetchingElement(0) -> FetchingElement(1) -> ... -> Done
//!               |                   |
//!               +-- length == 0 ----+-- Absent / last index / error / cancel --> Done
//! ```
//!
//! The length is read exactly once per session. Each decoded record is
//! published on a [`tokio::sync::watch`] channel as soon as it arrives, so
//! consumers observe progress without polling the loader.
//!
//! # Cancellation
//!
//! [`PaginatedLoader::run`] races every read against a
//! [`CancellationToken`]. Once the token fires the published snapshot is
//! frozen: a read that completes after cancellation is dropped and the state
//! is not republished.

use std::fmt;
use std::future::Future;
use std::time::Instant;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::resolver::{SlotResolver, StorageReader};
use super::LockRecord;
use crate::error::{WatchError, WatchResult};

/// How a loading session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Every index below the reported length was populated.
    Exhausted,
    /// An unwritten slot was found before the reported length was reached.
    Sentinel,
    /// The session was cancelled.
    Cancelled,
    /// A read failed; records gathered so far stay visible.
    Failed,
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Exhausted => "exhausted",
            Self::Sentinel => "sentinel",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Pagination state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoaderState {
    /// Not started.
    #[default]
    Idle,
    /// Reading the array length.
    FetchingLength,
    /// Resolving the element at this index.
    FetchingElement(u64),
    /// Finished; no further transitions.
    Done(Completion),
}

impl LoaderState {
    /// Whether the session has finished.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::FetchingLength => f.write_str("fetching_length"),
            Self::FetchingElement(index) => write!(f, "fetching_element({index})"),
            Self::Done(completion) => write!(f, "done({completion})"),
        }
    }
}

/// Read-only view of a loading session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoaderSnapshot {
    /// Current state.
    pub state: LoaderState,
    /// Length captured at `FetchingLength`, once known.
    pub length: Option<u64>,
    /// Records in ascending index order.
    pub records: Vec<LockRecord>,
}

/// Result of a session that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Why the session stopped.
    pub completion: Completion,
    /// Length reported by the contract, if it was read before stopping.
    pub length: Option<u64>,
    /// Records in ascending index order.
    pub records: Vec<LockRecord>,
}

/// Drives a [`SlotResolver`] across the populated part of the array.
///
/// A loader runs a single session. Never more than one read is in flight.
///
/// # Example
///
/// ```no_run
/// use eth_lock_watch::rpc::ChainClient;
/// use eth_lock_watch::storage::{PaginatedLoader, SlotResolver};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(client: ChainClient, contract: alloy::primitives::Address) -> eth_lock_watch::error::WatchResult<()> {
/// let mut loader = PaginatedLoader::new(SlotResolver::new(client, contract));
/// let progress = loader.subscribe();
/// let outcome = loader.run(&CancellationToken::new()).await?;
/// assert_eq!(outcome.records.len(), progress.borrow().records.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PaginatedLoader<R> {
    resolver: SlotResolver<R>,
    state: LoaderState,
    snapshot_tx: watch::Sender<LoaderSnapshot>,
}

impl<R: StorageReader> PaginatedLoader<R> {
    /// Create an idle loader.
    #[must_use]
    pub fn new(resolver: SlotResolver<R>) -> Self {
        let (snapshot_tx, _) = watch::channel(LoaderSnapshot::default());
        Self {
            resolver,
            state: LoaderState::Idle,
            snapshot_tx,
        }
    }

    /// Subscribe to snapshot updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LoaderSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Current state as seen by the loader itself.
    ///
    /// After cancellation this reports `Done(Cancelled)` while the published
    /// snapshot keeps its last pre-cancellation state.
    #[must_use]
    pub const fn state(&self) -> LoaderState {
        self.state
    }

    /// Clone of the latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> LoaderSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Run the session to completion.
    ///
    /// Stops at the first of: the reported length, an unwritten slot, a
    /// failed read, or cancellation.
    ///
    /// # Errors
    ///
    /// - [`WatchError::StateError`] if the loader already ran
    /// - any error from the length read or an element read; the snapshot
    ///   moves to `Done(Failed)` and keeps the records found so far
    #[instrument(skip_all, fields(contract = %self.resolver.contract()))]
    pub async fn run(&mut self, cancel: &CancellationToken) -> WatchResult<LoadOutcome> {
        if self.state != LoaderState::Idle {
            return Err(WatchError::state(
                format!("loader already ran (state: {})", self.state),
                None,
            ));
        }

        let started = Instant::now();
        self.transition(LoaderState::FetchingLength);

        let read = until_cancelled(cancel, self.resolver.length()).await;
        let length = match read {
            None => return Ok(self.cancelled()),
            Some(Err(e)) => return Err(self.fail(e)),
            Some(Ok(length)) => length,
        };

        self.snapshot_tx.send_modify(|s| s.length = Some(length));
        info!(length, "Array length cached for session");

        for index in 0..length {
            self.transition(LoaderState::FetchingElement(index));

            let read = until_cancelled(cancel, self.resolver.resolve(index)).await;
            match read {
                None => return Ok(self.cancelled()),
                Some(Err(e)) => return Err(self.fail(e)),
                Some(Ok(None)) => {
                    if index + 1 < length {
                        info!(index, length, "Unwritten slot before reported length");
                    }
                    return Ok(self.finish(Completion::Sentinel, started));
                }
                Some(Ok(Some(record))) => {
                    self.snapshot_tx.send_modify(|s| s.records.push(record));
                }
            }
        }

        Ok(self.finish(Completion::Exhausted, started))
    }

    fn transition(&mut self, next: LoaderState) {
        debug!(from = %self.state, to = %next, "Loader transition");
        self.state = next;
        self.snapshot_tx.send_modify(|s| s.state = next);
    }

    fn finish(&mut self, completion: Completion, started: Instant) -> LoadOutcome {
        self.transition(LoaderState::Done(completion));
        let snapshot = self.snapshot();
        info!(
            completion = %completion,
            records = snapshot.records.len(),
            duration_ms = started.elapsed().as_millis(),
            "Lock loading finished"
        );
        LoadOutcome {
            completion,
            length: snapshot.length,
            records: snapshot.records,
        }
    }

    fn fail(&mut self, error: WatchError) -> WatchError {
        warn!(state = %self.state, error = %error, "Lock loading halted");
        self.transition(LoaderState::Done(Completion::Failed));
        error
    }

    fn cancelled(&mut self) -> LoadOutcome {
        info!(state = %self.state, "Lock loading cancelled");
        // published snapshot stays frozen
        self.state = LoaderState::Done(Completion::Cancelled);
        let snapshot = self.snapshot();
        LoadOutcome {
            completion: Completion::Cancelled,
            length: snapshot.length,
            records: snapshot.records,
        }
    }
}

/// Await `fut` unless `cancel` fires first.
///
/// A result that races with cancellation is discarded.
async fn until_cancelled<T>(cancel: &CancellationToken, fut: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        out = fut => (!cancel.is_cancelled()).then_some(out),
    }
}
