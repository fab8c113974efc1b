use super::raw::RawTable;
use crate::error::ServingResult;

/// Map from `i64` to `f32`, values stored inline.
#[derive(Debug, Clone)]
pub struct LongFloatMap {
    table: RawTable<f32>,
}

impl Default for LongFloatMap {
    fn default() -> Self {
        Self::new()
    }
}

impl LongFloatMap {
    pub fn new() -> Self {
        Self::with_capacity(2)
    }

    pub fn with_capacity(expected: usize) -> Self {
        Self { table: RawTable::with_capacity(expected) }
    }

    pub fn get(&self, key: i64) -> Option<f32> {
        self.table.get(key).copied()
    }

    pub fn put(&mut self, key: i64, value: f32) -> ServingResult<Option<f32>> {
        self.table.insert(key, value)
    }

    /// Adds `delta` to the value for `key` (absent counts as 0) and returns the new value.
    pub fn increment(&mut self, key: i64, delta: f32) -> ServingResult<f32> {
        let idx = self.table.slot_or_insert_with(key, || 0.0)?;
        let slot = self.table.value_at_mut(idx);
        *slot += delta;
        Ok(*slot)
    }

    pub fn remove(&mut self, key: i64) -> Option<f32> {
        self.table.remove(key)
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

    pub fn iter(&self) -> impl Iterator<Item = (i64, f32)> + '_ {
        self.table.iter().map(|(k, v)| (k, *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment() {
        let mut counts = LongFloatMap::new();
        assert_eq!(counts.increment(3, 1.0).unwrap(), 1.0);
        assert_eq!(counts.increment(3, 2.5).unwrap(), 3.5);
        assert_eq!(counts.increment(4, -1.0).unwrap(), -1.0);
        assert_eq!(counts.get(3), Some(3.5));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn test_remove_then_increment_starts_from_zero() {
        let mut counts = LongFloatMap::new();
        counts.put(1, 10.0).unwrap();
        assert_eq!(counts.remove(1), Some(10.0));
        assert!(!counts.contains_key(1));
        assert_eq!(counts.increment(1, 1.0).unwrap(), 1.0);
    }
}
