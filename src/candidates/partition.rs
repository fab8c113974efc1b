//! Candidate partitioning.
//!
//! A partitioner splits the item matrix into disjoint shards that workers scan
//! in parallel. Shards are slot ranges of the item map: two disjoint ranges
//! never yield the same entry.

use crate::collections::LongObjectMap;
use crate::vectors::SharedVector;
use std::ops::Range;

pub trait CandidatePartitioner: Send + Sync {
    /// Disjoint slot ranges covering every candidate for `queries`.
    fn partition(&self, items: &LongObjectMap<SharedVector>, queries: &[Vec<f32>]) -> Vec<Range<usize>>;

    /// Called once for every item row created after the generation was built.
    fn add_item(&self, item_id: i64);
}

/// Splits the slot space into equal ranges, independent of the query.
#[derive(Debug, Clone)]
pub struct EvenPartitioner {
    partitions: usize,
}

impl EvenPartitioner {
    pub fn new(partitions: usize) -> Self {
        Self { partitions: partitions.max(1) }
    }
}

impl CandidatePartitioner for EvenPartitioner {
    fn partition(&self, items: &LongObjectMap<SharedVector>, _queries: &[Vec<f32>]) -> Vec<Range<usize>> {
        let slots = items.slot_count();
        let chunk = slots.div_ceil(self.partitions).max(1);
        (0..slots).step_by(chunk).map(|start| start..(start + chunk).min(slots)).collect()
    }

    fn add_item(&self, _item_id: i64) {
        // every slot is always covered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectors::FeatureVector;

    #[test]
    fn test_even_partition_covers_all_items() {
        let mut items = LongObjectMap::new();
        for i in 0..100 {
            items.put(i, FeatureVector::shared(vec![i as f32])).unwrap();
        }
        let ranges = EvenPartitioner::new(4).partition(&items, &[]);
        assert!(ranges.len() <= 4 && ranges.len() >= 2);
        let total: usize = ranges.iter().map(|r| items.iter_slots(r.clone()).count()).sum();
        assert_eq!(total, 100);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_single_partition() {
        let mut items = LongObjectMap::new();
        items.put(1, FeatureVector::shared(vec![1.0])).unwrap();
        let ranges = EvenPartitioner::new(1).partition(&items, &[]);
        assert_eq!(ranges, vec![0..items.slot_count()]);
    }
}
