use super::raw::RawTable;
use crate::error::ServingResult;
use std::ops::Range;

/// Map from `i64` to `V` backed by an open-addressing table.
#[derive(Debug, Clone)]
pub struct LongObjectMap<V> {
    table: RawTable<Option<V>>,
}

impl<V> Default for LongObjectMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> LongObjectMap<V> {
    pub fn new() -> Self {
        Self::with_capacity(2)
    }

    pub fn with_capacity(expected: usize) -> Self {
        Self { table: RawTable::with_capacity(expected) }
    }

    pub fn get(&self, key: i64) -> Option<&V> {
        self.table.get(key).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, key: i64) -> Option<&mut V> {
        self.table.get_mut(key).and_then(Option::as_mut)
    }

    /// Insert or replace, returning the previous value.
    pub fn put(&mut self, key: i64, value: V) -> ServingResult<Option<V>> {
        Ok(self.table.insert(key, Some(value))?.flatten())
    }

    /// Value for `key`, inserting `make()` first when absent.
    pub fn get_or_insert_with(&mut self, key: i64, make: impl FnOnce() -> V) -> ServingResult<&mut V> {
        let idx = self.table.slot_or_insert_with(key, || None)?;
        Ok(self.table.value_at_mut(idx).get_or_insert_with(make))
    }

    pub fn remove(&mut self, key: i64) -> Option<V> {
        self.table.remove(key).flatten()
    }

    pub fn contains_key(&self, key: i64) -> bool {
        self.table.index_of(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Number of slots; the upper bound for [`iter_slots`](Self::iter_slots) ranges.
    pub fn slot_count(&self) -> usize {
        self.table.slot_count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &V)> + '_ {
        self.iter_slots(0..self.slot_count())
    }

    /// Live entries stored in slots `range`. Disjoint ranges yield disjoint entries.
    pub fn iter_slots(&self, range: Range<usize>) -> impl Iterator<Item = (i64, &V)> + '_ {
        self.table
            .iter_slots(range)
            .filter_map(|(k, v)| v.as_ref().map(|v| (k, v)))
    }

    pub fn keys(&self) -> impl Iterator<Item = i64> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }
}
