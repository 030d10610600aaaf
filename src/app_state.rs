//! Shared application state for the API server and streaming.

use std::time::SystemTime;

use tokio::sync::watch;

use crate::aggregator::AggregatorHandle;
use crate::rpc::ChainClient;
use crate::storage::{LoaderSnapshot, SlotResolver};

/// Shared application state for API handlers.
///
/// Everything here is a read-only view or a cheap clone; the loader and the
/// aggregator run in their own tasks and own their state.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Resolver for on-demand reads of single elements and the length.
    pub resolver: SlotResolver<ChainClient>,
    /// Progress of the background pagination session.
    pub locks: watch::Receiver<LoaderSnapshot>,
    /// View of the live transfer aggregator.
    pub aggregator: AggregatorHandle,
    /// Client feeding head notifications.
    pub chain: ChainClient,
    /// Application start time for uptime tracking.
    pub start_time: SystemTime,
}

impl AppState {
    /// Create the state from running components.
    #[must_use]
    pub fn new(
        resolver: SlotResolver<ChainClient>,
        locks: watch::Receiver<LoaderSnapshot>,
        aggregator: AggregatorHandle,
        chain: ChainClient,
    ) -> Self {
        Self {
            resolver,
            locks,
            aggregator,
            chain,
            start_time: SystemTime::now(),
        }
    }

    /// Clone of the latest loader snapshot.
    #[must_use]
    pub fn locks_snapshot(&self) -> LoaderSnapshot {
        self.locks.borrow().clone()
    }
}
