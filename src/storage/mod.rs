//! Raw contract storage access for the lock contract's `LockInfo[]` array.
//!
//! ```solidity
//! struct LockInfo {
//!     address user;       // 20 bytes  ┐ one slot
//!     uint64  startTime;  //  8 bytes  ┘
//!     uint256 amount;     // 32 bytes    next slot
//! }
//! LockInfo[] private _locks; // slot 0
//! ```
//!
//! Layers, leaves first:
//!
//! 1. [`slots`] - slot arithmetic (`keccak256(p) + i * 2`)
//! 2. [`decoder`] - splitting 32-byte words into fields
//! 3. [`resolver`] - two storage reads per element, plus the length read
//! 4. [`loader`] - sequential pagination over `0..length`

pub mod decoder;
pub mod loader;
pub mod resolver;
pub mod slots;

use alloy::primitives::{Address, U256};
use chrono::{Local, TimeZone};

pub use decoder::{decode_amount, decode_packed_word, encode_packed_word, PackedHeader, StorageWord};
pub use loader::{Completion, LoadOutcome, LoaderSnapshot, LoaderState, PaginatedLoader};
pub use resolver::{SlotResolver, StorageReader};
pub use slots::{base_slot, checked_index, ArrayLayout};

/// One decoded `LockInfo` element.
///
/// Created once per successful two-word read and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Position of the element in the array.
    pub index: u64,
    /// Lock holder.
    pub holder: Address,
    /// Lock start as Unix seconds.
    pub start_time: u64,
    /// Locked amount in the token's smallest unit.
    pub amount: U256,
}

impl LockRecord {
    /// Holder rendered as lowercase `0x` + 40 hex characters.
    #[must_use]
    pub fn holder_hex(&self) -> String {
        alloy::primitives::hex::encode_prefixed(self.holder.as_slice())
    }

    /// Amount as an exact decimal string.
    #[must_use]
    pub fn amount_decimal(&self) -> String {
        self.amount.to_string()
    }

    /// Start time in the local time zone, or the raw seconds when the value
    /// is outside chrono's representable range.
    #[must_use]
    pub fn start_time_local(&self) -> String {
        i64::try_from(self.start_time)
            .ok()
            .and_then(|secs| Local.timestamp_opt(secs, 0).single())
            .map_or_else(
                || self.start_time.to_string(),
                |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn record() -> LockRecord {
        LockRecord {
            index: 0,
            holder: address!("AbCAbcabcabcabcabcabcabcabcabcabcabc0123"),
            start_time: 1_700_000_000,
            amount: U256::from(1_000_000_000_000_000_000_u128),
        }
    }

    #[test]
    fn test_holder_hex_is_lowercase() {
        let hex = record().holder_hex();
        assert_eq!(hex, "0xabcabcabcabcabcabcabcabcabcabcabcabc0123");
        assert_eq!(hex.len(), 42);
    }

    #[test]
    fn test_amount_decimal() {
        assert_eq!(record().amount_decimal(), "1000000000000000000");
    }

    #[test]
    fn test_start_time_local_renders_date() {
        let rendered = record().start_time_local();
        // 2023-11-14 in every time zone
        assert!(rendered.starts_with("2023-11-1"), "{rendered}");
    }

    #[test]
    fn test_start_time_out_of_range_falls_back() {
        let mut lock = record();
        lock.start_time = u64::MAX;
        assert_eq!(lock.start_time_local(), u64::MAX.to_string());
    }
}
