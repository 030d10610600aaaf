//! API request and response models.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::aggregator::{AggregatorStats, BlockHead};
use crate::events::TransferRecord;
use crate::storage::{LoaderSnapshot, LockRecord};

/// One decoded lock element.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LockResponse {
    /// Position in the array
    pub index: u64,
    /// Lock holder (lowercase hex)
    pub holder: String,
    /// Lock start as Unix seconds
    pub start_time: u64,
    /// Lock start in the server's local time zone
    pub start_time_local: String,
    /// Locked amount as a decimal string
    pub amount: String,
}

impl From<&LockRecord> for LockResponse {
    fn from(record: &LockRecord) -> Self {
        Self {
            index: record.index,
            holder: record.holder_hex(),
            start_time: record.start_time,
            start_time_local: record.start_time_local(),
            amount: record.amount_decimal(),
        }
    }
}

/// Progress of the background pagination session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LocksResponse {
    /// Loader state (e.g. "fetching_element(3)", "done(sentinel)")
    pub state: String,
    /// Array length read at the start of the session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    /// Records decoded so far, ascending by index
    pub records: Vec<LockResponse>,
}

impl From<&LoaderSnapshot> for LocksResponse {
    fn from(snapshot: &LoaderSnapshot) -> Self {
        Self {
            state: snapshot.state.to_string(),
            length: snapshot.length,
            records: snapshot.records.iter().map(LockResponse::from).collect(),
        }
    }
}

/// Fresh array length.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LengthResponse {
    /// Lock contract address
    pub contract: String,
    /// Value of the array's length slot
    pub length: u64,
}

/// A chain head.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BlockResponse {
    /// Block number
    pub number: u64,
    /// Block hash
    pub hash: String,
}

impl From<BlockHead> for BlockResponse {
    fn from(head: BlockHead) -> Self {
        Self {
            number: head.number,
            hash: head.hash.to_string(),
        }
    }
}

/// One aggregated transfer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    /// Block number as a decimal string
    pub block_number: String,
    /// Sender
    pub from: String,
    /// Recipient
    pub to: String,
    /// Value scaled by the token's decimals
    pub value: String,
    /// Transaction hash
    pub transaction_hash: String,
}

impl From<&TransferRecord> for TransferResponse {
    fn from(record: &TransferRecord) -> Self {
        Self {
            block_number: record.block_number.to_string(),
            from: record.from.to_string(),
            to: record.to.to_string(),
            value: record.value.clone(),
            transaction_hash: record.transaction_hash.to_string(),
        }
    }
}

/// Aggregated transfers, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransfersResponse {
    /// Number of distinct transfers held
    pub total: usize,
    /// Returned transfers
    pub transfers: Vec<TransferResponse>,
}

/// Query parameters for the transfer list.
#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct TransfersQuery {
    /// Maximum number of transfers (max 1000)
    #[serde(default = "default_limit")]
    pub limit: usize,
}

const fn default_limit() -> usize {
    100
}

/// Polling counters of the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AggregatorInfo {
    /// Completed polling cycles
    pub cycles: u64,
    /// Cycles with a failed query
    pub failed_cycles: u64,
    /// Distinct transfers held
    pub records: usize,
    /// First block not covered yet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_block: Option<u64>,
    /// Most recent failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl From<AggregatorStats> for AggregatorInfo {
    fn from(stats: AggregatorStats) -> Self {
        Self {
            cycles: stats.cycles,
            failed_cycles: stats.failed_cycles,
            records: stats.records,
            next_block: stats.next_block,
            last_error: stats.last_error,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Overall health status
    pub status: HealthStatus,
    /// Application version
    pub version: String,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Loader state
    pub loader_state: String,
    /// Latest head delivered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_block: Option<BlockResponse>,
    /// Head source ("websocket" or "polling")
    pub head_source: String,
    /// Aggregator counters
    pub aggregator: AggregatorInfo,
}

/// Health status states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All services healthy
    Healthy,
    /// Partial degradation
    Degraded,
    /// Unhealthy state
    Unhealthy,
}

/// Error response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error type
    pub error: String,
    /// Human-readable message
    pub message: String,
}

/// Message pushed on the WebSocket stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamMessage {
    /// A new chain head.
    Block(BlockResponse),
    /// The aggregated set changed.
    Transfers(TransfersResponse),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Completion, LoaderState};
    use alloy::primitives::{address, b256, U256};

    #[test]
    fn test_lock_response_renders_strings() {
        let record = LockRecord {
            index: 0,
            holder: address!("ABC0000000000000000000000000000000000123"),
            start_time: 1_700_000_000,
            amount: U256::from(10).pow(U256::from(18)),
        };
        let response = LockResponse::from(&record);

        assert_eq!(response.holder, "0xabc0000000000000000000000000000000000123");
        assert_eq!(response.amount, "1000000000000000000");

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["startTime"], 1_700_000_000);
    }

    #[test]
    fn test_locks_response_state_label() {
        let snapshot = LoaderSnapshot {
            state: LoaderState::Done(Completion::Sentinel),
            length: Some(2),
            records: Vec::new(),
        };
        let response = LocksResponse::from(&snapshot);
        assert_eq!(response.state, "done(sentinel)");
        assert_eq!(response.length, Some(2));
    }

    #[test]
    fn test_stream_message_is_tagged() {
        let message = StreamMessage::Block(BlockResponse::from(BlockHead {
            number: 7,
            hash: b256!("00000000000000000000000000000000000000000000000000000000000000ff"),
        }));
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "block");
        assert_eq!(json["number"], 7);
    }
}
