//! Resolution of single array elements from raw storage reads.
//!
//! [`SlotResolver`] is generic over a [`StorageReader`], the one chain
//! capability it needs (`eth_getStorageAt`). The production implementation
//! lives in [`crate::rpc::ChainClient`]; tests use in-memory readers.

use std::future::Future;

use alloy::primitives::{Address, U256};
use tracing::{debug, instrument, warn};

use super::decoder::{decode_amount, decode_packed_word, StorageWord};
use super::slots::{slot_hex, ArrayLayout};
use super::LockRecord;
use crate::error::{WatchError, WatchResult};

/// Raw storage access.
///
/// Implementations map transport failures to
/// [`WatchError::NodeUnavailable`] and malformed slots to
/// [`WatchError::InvalidSlot`].
pub trait StorageReader {
    /// Read the 32-byte word at `slot` of `contract`.
    fn storage_at(
        &self,
        contract: Address,
        slot: U256,
    ) -> impl Future<Output = WatchResult<StorageWord>> + Send;
}

impl<R: StorageReader + Sync> StorageReader for &R {
    fn storage_at(
        &self,
        contract: Address,
        slot: U256,
    ) -> impl Future<Output = WatchResult<StorageWord>> + Send {
        (**self).storage_at(contract, slot)
    }
}

/// Decodes `LockInfo` elements of one contract.
#[derive(Debug, Clone)]
pub struct SlotResolver<R> {
    reader: R,
    contract: Address,
    layout: ArrayLayout,
}

impl<R: StorageReader> SlotResolver<R> {
    /// Resolver for `contract` with the standard lock array layout.
    pub fn new(reader: R, contract: Address) -> Self {
        Self::with_layout(reader, contract, ArrayLayout::locks())
    }

    /// Resolver for an array at a custom declared slot.
    pub const fn with_layout(reader: R, contract: Address, layout: ArrayLayout) -> Self {
        Self {
            reader,
            contract,
            layout,
        }
    }

    /// Contract being read.
    pub const fn contract(&self) -> Address {
        self.contract
    }

    /// Array layout in use.
    pub const fn layout(&self) -> &ArrayLayout {
        &self.layout
    }

    /// Read the array length from its declared slot.
    ///
    /// This is one storage read. Callers iterating the array should fetch it
    /// once per session rather than per element.
    ///
    /// # Errors
    ///
    /// - [`WatchError::NodeUnavailable`] if the read fails
    /// - [`WatchError::DecodingError`] if the length does not fit in 64 bits
    #[instrument(skip(self), fields(contract = %self.contract))]
    pub async fn length(&self) -> WatchResult<u64> {
        let word = self
            .reader
            .storage_at(self.contract, self.layout.length_slot())
            .await
            .inspect_err(|e| warn!(error = %e, "Array length read failed"))?;

        let length = decode_amount(&word);
        let length = u64::try_from(length).map_err(|e| {
            WatchError::decoding(
                format!("array length {length} does not fit in 64 bits"),
                Some(Box::new(e)),
            )
        })?;

        debug!(length, "Array length read");
        Ok(length)
    }

    /// Resolve element `index`.
    ///
    /// Reads the packed `user`/`startTime` word at the element's base slot
    /// and, unless it is the unwritten sentinel, the `amount` word right
    /// after it.
    ///
    /// Returns `Ok(None)` when the element has not been written.
    ///
    /// # Errors
    ///
    /// - [`WatchError::InvalidIndex`] if the slot overflows
    /// - [`WatchError::NodeUnavailable`] if either read fails (retriable)
    #[instrument(skip(self), fields(contract = %self.contract, slot = tracing::field::Empty))]
    pub async fn resolve(&self, index: u64) -> WatchResult<Option<LockRecord>> {
        let base = self.layout.element_slot(index)?;
        tracing::Span::current().record("slot", slot_hex(base).as_str());

        let packed = self
            .reader
            .storage_at(self.contract, base)
            .await
            .inspect_err(|e| warn!(index, error = %e, "Packed word read failed"))?;

        let Some(header) = decode_packed_word(&packed) else {
            debug!(index, "Slot not written");
            return Ok(None);
        };

        let amount_slot = base
            .checked_add(U256::from(1))
            .ok_or_else(|| WatchError::invalid_slot(format!("{} + 1 overflows", slot_hex(base))))?;

        let amount_word = self
            .reader
            .storage_at(self.contract, amount_slot)
            .await
            .inspect_err(|e| warn!(index, error = %e, "Amount word read failed"))?;

        let record = LockRecord {
            index,
            holder: header.holder,
            start_time: header.start_time,
            amount: decode_amount(&amount_word),
        };

        debug!(
            index,
            holder = %record.holder_hex(),
            start_time = record.start_time,
            amount = %record.amount,
            "Element resolved"
        );

        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::decoder::encode_packed_word;
    use alloy::primitives::address;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CONTRACT: Address = address!("B2B77A3c7600Aac203Bc1Bf7Cae12317efB3D508");

    #[derive(Default)]
    struct MapReader {
        words: HashMap<U256, StorageWord>,
        reads: AtomicUsize,
        fail_at: Option<U256>,
    }

    impl StorageReader for MapReader {
        async fn storage_at(&self, _contract: Address, slot: U256) -> WatchResult<StorageWord> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_at == Some(slot) {
                return Err(WatchError::node_unavailable("injected", None));
            }
            Ok(self.words.get(&slot).copied().unwrap_or_default())
        }
    }

    fn populated(holder: Address, start: u64, amount: u64) -> MapReader {
        let layout = ArrayLayout::locks();
        let base = layout.data_base();
        let mut reader = MapReader::default();
        reader.words.insert(U256::ZERO, StorageWord::from(U256::from(1)));
        reader.words.insert(base, encode_packed_word(holder, start));
        reader
            .words
            .insert(base + U256::from(1), StorageWord::from(U256::from(amount)));
        reader
    }

    #[tokio::test]
    async fn test_resolve_populated_element() {
        let holder = address!("1111111111111111111111111111111111111111");
        let resolver = SlotResolver::new(populated(holder, 1_700_000_000, 42), CONTRACT);

        let record = resolver.resolve(0).await;
        assert!(matches!(
            record,
            Ok(Some(LockRecord { index: 0, start_time: 1_700_000_000, .. }))
        ));
        if let Ok(Some(record)) = record {
            assert_eq!(record.holder, holder);
            assert_eq!(record.amount, U256::from(42));
        }
        assert_eq!(resolver.reader.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_resolve_unwritten_element_skips_amount_read() {
        let resolver = SlotResolver::new(MapReader::default(), CONTRACT);

        let record = resolver.resolve(5).await;
        assert!(matches!(record, Ok(None)));
        assert_eq!(resolver.reader.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_length() {
        let holder = address!("1111111111111111111111111111111111111111");
        let resolver = SlotResolver::new(populated(holder, 1, 1), CONTRACT);
        assert_eq!(resolver.length().await.ok(), Some(1));
    }

    #[tokio::test]
    async fn test_length_too_large_is_decoding_error() {
        let mut reader = MapReader::default();
        reader
            .words
            .insert(U256::ZERO, StorageWord::from(U256::from(u128::MAX)));
        let resolver = SlotResolver::new(reader, CONTRACT);
        assert!(matches!(
            resolver.length().await,
            Err(WatchError::DecodingError { .. })
        ));
    }

    #[tokio::test]
    async fn test_amount_read_failure_is_retriable_not_absent() {
        let holder = address!("1111111111111111111111111111111111111111");
        let mut reader = populated(holder, 1, 1);
        reader.fail_at = Some(ArrayLayout::locks().data_base() + U256::from(1));
        let resolver = SlotResolver::new(reader, CONTRACT);

        let result = resolver.resolve(0).await;
        assert!(matches!(&result, Err(e) if e.is_retriable()));
    }
}
