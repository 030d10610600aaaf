//! Storage slot arithmetic for dynamic arrays of structs.
//!
//! Solidity stores a dynamic array declared at slot `p` as follows:
//!
//! ```text
//! slot p                      -> array length
//! keccak256(p) + i * k        -> first word of element i
//! keccak256(p) + i * k + j    -> word j of element i   (k = words per element)
//! ```
//!
//! All arithmetic is done on 256-bit unsigned integers with checked
//! operations, so indices far beyond `u32::MAX` still produce exact slots.

use alloy::primitives::{keccak256, B256, U256};

use crate::error::{WatchError, WatchResult};

/// Declared slot of the `LockInfo[]` array in the lock contract.
pub const LOCKS_ARRAY_SLOT: U256 = U256::ZERO;

/// Number of 32-byte words one `LockInfo` element occupies.
///
/// `address user` and `uint64 startTime` share the first word,
/// `uint256 amount` fills the second.
pub const LOCK_STRUCT_WORDS: u64 = 2;

/// Compute the start of a dynamic array's backing storage.
///
/// This is `keccak256` of the declared slot encoded as a 32-byte big-endian
/// word. For slot 0 that is the hash of the all-zero word.
#[must_use]
pub fn array_data_base(declared_slot: U256) -> U256 {
    let hash = keccak256(B256::from(declared_slot.to_be_bytes::<32>()));
    U256::from_be_bytes(hash.0)
}

/// Compute the first slot of element `index` in a struct array.
///
/// Returns `array_base + index * struct_words`.
///
/// # Errors
///
/// Returns [`WatchError::InvalidIndex`] if the slot would leave the 256-bit
/// slot space.
///
/// # Example
///
/// ```
/// use alloy::primitives::U256;
/// use eth_lock_watch::storage::slots::base_slot;
///
/// let base = U256::from(1000);
/// assert_eq!(base_slot(base, 3, 2).unwrap(), U256::from(1006));
/// ```
pub fn base_slot(array_base: U256, index: u64, struct_words: u64) -> WatchResult<U256> {
    U256::from(index)
        .checked_mul(U256::from(struct_words))
        .and_then(|offset| array_base.checked_add(offset))
        .ok_or_else(|| {
            WatchError::invalid_index(format!(
                "element {index} of width {struct_words} overflows the slot space"
            ))
        })
}

/// Validate an externally supplied index.
///
/// Indices arrive signed from the command line and the HTTP API; anything
/// below zero is rejected before it reaches slot arithmetic.
///
/// # Errors
///
/// Returns [`WatchError::InvalidIndex`] for negative values.
pub fn checked_index(raw: i64) -> WatchResult<u64> {
    u64::try_from(raw).map_err(|_| WatchError::invalid_index(format!("index {raw} is negative")))
}

/// Storage layout of one dynamic struct array.
///
/// The keccak-derived base is computed once at construction and reused
/// for every element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayLayout {
    length_slot: U256,
    data_base: U256,
    struct_words: u64,
}

impl ArrayLayout {
    /// Layout of an array declared at `declared_slot` whose elements span
    /// `struct_words` words.
    #[must_use]
    pub fn new(declared_slot: U256, struct_words: u64) -> Self {
        Self {
            length_slot: declared_slot,
            data_base: array_data_base(declared_slot),
            struct_words,
        }
    }

    /// Layout of the lock contract's `LockInfo[]` array.
    #[must_use]
    pub fn locks() -> Self {
        Self::new(LOCKS_ARRAY_SLOT, LOCK_STRUCT_WORDS)
    }

    /// Slot holding the array length.
    #[must_use]
    pub const fn length_slot(&self) -> U256 {
        self.length_slot
    }

    /// First slot of the array's element region.
    #[must_use]
    pub const fn data_base(&self) -> U256 {
        self.data_base
    }

    /// Words per element.
    #[must_use]
    pub const fn struct_words(&self) -> u64 {
        self.struct_words
    }

    /// First slot of element `index`.
    ///
    /// # Errors
    ///
    /// See [`base_slot`].
    pub fn element_slot(&self, index: u64) -> WatchResult<U256> {
        base_slot(self.data_base, index, self.struct_words)
    }
}

/// Render a slot as the minimal `0x`-prefixed hex quantity used in logs
/// and JSON-RPC requests.
#[must_use]
pub fn slot_hex(slot: U256) -> String {
    format!("{slot:#x}")
}
