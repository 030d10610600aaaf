//! Decoding of raw 32-byte storage words.
//!
//! Solidity packs `address user` and `uint64 startTime` into one slot,
//! starting from the low-order end of the word:
//!
//! ```text
//! byte:  0    4                 12                                  32
//!        +----+-----------------+-----------------------------------+
//!        |zero|  startTime (8)  |         user address (20)         |
//!        +----+-----------------+-----------------------------------+
//! hex:   0    8                 24                                  64
//! ```
//!
//! The `amount` field occupies the following slot alone.

use alloy::primitives::{Address, B256, U256};
use std::fmt;

const PADDING_BYTES: usize = 4;
const TIMESTAMP_END: usize = 12;

/// A raw 32-byte value read from contract storage.
///
/// A slot that was never written reads back as all zero bits; see
/// [`StorageWord::is_unwritten`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StorageWord(B256);

impl StorageWord {
    /// The all-zero word returned for never-written slots.
    pub const ZERO: Self = Self(B256::ZERO);

    /// Wrap raw bytes.
    #[must_use]
    pub const fn new(bytes: B256) -> Self {
        Self(bytes)
    }

    /// Whether this is the never-written sentinel.
    #[must_use]
    pub fn is_unwritten(&self) -> bool {
        self.0 == B256::ZERO
    }

    /// Borrow the underlying bytes.
    #[must_use]
    pub const fn as_b256(&self) -> &B256 {
        &self.0
    }
}

impl From<U256> for StorageWord {
    fn from(value: U256) -> Self {
        Self(B256::from(value.to_be_bytes::<32>()))
    }
}

impl From<B256> for StorageWord {
    fn from(value: B256) -> Self {
        Self(value)
    }
}

impl fmt::Display for StorageWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fields unpacked from the first word of a lock element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedHeader {
    /// Lock holder (low 20 bytes of the word).
    pub holder: Address,
    /// Lock start as Unix seconds (the 8 bytes above the address).
    pub start_time: u64,
}

/// Split the packed `user`/`startTime` word.
///
/// Returns `None` for the all-zero sentinel, which marks an element that has
/// not been written yet.
#[must_use]
pub fn decode_packed_word(word: &StorageWord) -> Option<PackedHeader> {
    if word.is_unwritten() {
        return None;
    }

    let bytes = word.as_b256().as_slice();

    let mut timestamp = [0_u8; 8];
    timestamp.copy_from_slice(&bytes[PADDING_BYTES..TIMESTAMP_END]);

    Some(PackedHeader {
        holder: Address::from_slice(&bytes[TIMESTAMP_END..]),
        start_time: u64::from_be_bytes(timestamp),
    })
}

/// Pack a holder and start time the way the contract stores them.
///
/// Inverse of [`decode_packed_word`]; used to build fixtures.
#[must_use]
pub fn encode_packed_word(holder: Address, start_time: u64) -> StorageWord {
    let mut bytes = [0_u8; 32];
    bytes[PADDING_BYTES..TIMESTAMP_END].copy_from_slice(&start_time.to_be_bytes());
    bytes[TIMESTAMP_END..].copy_from_slice(holder.as_slice());
    StorageWord(B256::from(bytes))
}

/// Parse a full word as a big-endian unsigned 256-bit integer.
#[must_use]
pub fn decode_amount(word: &StorageWord) -> U256 {
    U256::from_be_bytes(word.as_b256().0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256};

    #[test]
    fn test_zero_word_is_sentinel() {
        assert!(StorageWord::ZERO.is_unwritten());
        assert_eq!(decode_packed_word(&StorageWord::ZERO), None);
        assert_eq!(decode_amount(&StorageWord::ZERO), U256::ZERO);
    }

    #[test]
    fn test_decode_known_word() {
        // startTime = 0x6553f100 (1_700_000_000), user = 0xabc...123
        let word = StorageWord::new(b256!(
            "00000000000000006553f100abcabcabcabcabcabcabcabcabcabcabcabc0123"
        ));
        let header = decode_packed_word(&word);
        assert_eq!(
            header,
            Some(PackedHeader {
                holder: address!("abcabcabcabcabcabcabcabcabcabcabcabc0123"),
                start_time: 1_700_000_000,
            })
        );
    }

    #[test]
    fn test_packed_word_round_trip() {
        let holder = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        let word = encode_packed_word(holder, 1_721_815_672);
        assert!(!word.is_unwritten());

        let header = decode_packed_word(&word);
        assert_eq!(header.map(|h| h.holder), Some(holder));
        assert_eq!(header.map(|h| h.start_time), Some(1_721_815_672));
    }

    #[test]
    fn test_padding_bytes_stay_zero() {
        let word = encode_packed_word(Address::repeat_byte(0xff), u64::MAX);
        assert_eq!(&word.as_b256()[..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_zero_start_time_with_holder_is_not_sentinel() {
        let holder = address!("0000000000000000000000000000000000000001");
        let word = encode_packed_word(holder, 0);
        assert_eq!(
            decode_packed_word(&word),
            Some(PackedHeader {
                holder,
                start_time: 0
            })
        );
    }

    #[test]
    fn test_decode_amount() {
        let word = StorageWord::from(U256::from(1_000_000_000_000_000_000_u128));
        assert_eq!(
            decode_amount(&word),
            U256::from(1_000_000_000_000_000_000_u128)
        );

        let max = StorageWord::new(B256::repeat_byte(0xff));
        assert_eq!(decode_amount(&max), U256::MAX);
    }
}
