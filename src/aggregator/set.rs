//! Ordered, deduplicated collection of transfer records.

use std::collections::HashSet;

use crate::events::TransferRecord;

/// Transfers newest batch first, each distinct record exactly once.
///
/// A record keeps the position it had when it was first seen. Merging a
/// batch prepends only the records the set has not seen yet, in the order
/// the batch delivered them:
///
/// ```text
/// merge [T1, T2]  ->  [T1, T2]
/// merge [T2, T3]  ->  [T3, T1, T2]
/// ```
///
/// Equality is structural over every field of [`TransferRecord`].
#[derive(Debug, Clone, Default)]
pub struct AggregatedLogSet {
    records: Vec<TransferRecord>,
    seen: HashSet<TransferRecord>,
}

impl AggregatedLogSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch, returning how many records were new.
    pub fn merge<I>(&mut self, batch: I) -> usize
    where
        I: IntoIterator<Item = TransferRecord>,
    {
        let mut fresh: Vec<TransferRecord> = batch
            .into_iter()
            .filter(|record| self.seen.insert(record.clone()))
            .collect();

        let added = fresh.len();
        if added > 0 {
            fresh.append(&mut self.records);
            self.records = fresh;
        }
        added
    }

    /// Records, newest batch first.
    #[must_use]
    pub fn records(&self) -> &[TransferRecord] {
        &self.records
    }

    /// Number of distinct records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been merged yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether `record` is already in the set.
    #[must_use]
    pub fn contains(&self, record: &TransferRecord) -> bool {
        self.seen.contains(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, B256};

    fn transfer(block: u64, tag: u8) -> TransferRecord {
        TransferRecord {
            block_number: block,
            from: Address::repeat_byte(tag),
            to: Address::repeat_byte(tag.wrapping_add(1)),
            value: format!("{tag}.5"),
            transaction_hash: B256::repeat_byte(tag),
        }
    }

    #[test]
    fn test_newer_batch_precedes_and_duplicates_keep_first_position() {
        let (t1, t2, t3) = (transfer(1, 1), transfer(1, 2), transfer(2, 3));
        let mut set = AggregatedLogSet::new();

        assert_eq!(set.merge([t1.clone(), t2.clone()]), 2);
        assert_eq!(set.merge([t2.clone(), t3.clone()]), 1);

        assert_eq!(set.records(), &[t3, t1, t2]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let batch = vec![transfer(1, 1), transfer(2, 2)];
        let mut set = AggregatedLogSet::new();
        set.merge(batch.clone());
        let before = set.records().to_vec();

        assert_eq!(set.merge(batch), 0);
        assert_eq!(set.records(), before.as_slice());
    }

    #[test]
    fn test_duplicates_inside_one_batch_collapse() {
        let t1 = transfer(1, 1);
        let mut set = AggregatedLogSet::new();
        assert_eq!(set.merge([t1.clone(), t1.clone()]), 1);
        assert_eq!(set.len(), 1);
        assert!(set.contains(&t1));
    }

    #[test]
    fn test_same_transaction_distinct_transfers_both_kept() {
        let a = transfer(7, 1);
        let mut b = a.clone();
        b.value = "99".to_string();

        let mut set = AggregatedLogSet::new();
        assert_eq!(set.merge([a, b]), 2);
    }

    #[test]
    fn test_empty_batch_changes_nothing() {
        let mut set = AggregatedLogSet::new();
        assert_eq!(set.merge(Vec::new()), 0);
        assert!(set.is_empty());
    }
}
