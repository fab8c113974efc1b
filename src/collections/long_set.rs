use super::raw::RawTable;
use crate::error::ServingResult;

/// Set of `i64` backed by an open-addressing table (zero-sized values).
#[derive(Debug, Clone)]
pub struct LongSet {
    table: RawTable<()>,
}

impl Default for LongSet {
    fn default() -> Self {
        Self::new()
    }
}

impl LongSet {
    pub fn new() -> Self {
        Self::with_capacity(2)
    }

    pub fn with_capacity(expected: usize) -> Self {
        Self { table: RawTable::with_capacity(expected) }
    }

    /// Returns `true` if the key was newly added.
    pub fn insert(&mut self, key: i64) -> ServingResult<bool> {
        Ok(self.table.insert(key, ())?.is_none())
    }

    /// Returns `true` if the key was present.
    pub fn remove(&mut self, key: i64) -> bool {
        self.table.remove(key).is_some()
    }

    pub fn contains(&self, key: i64) -> bool {
        self.table.index_of(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.table.iter().map(|(k, _)| k)
    }

    /// Keys present in both sets.
    pub fn intersection(&self, other: &LongSet) -> LongSet {
        let (small, large) = if self.len() <= other.len() { (self, other) } else { (other, self) };
        let mut out = LongSet::with_capacity(small.len());
        for key in small.iter().filter(|k| large.contains(*k)) {
            // keys came from a live table, so they are never sentinels
            let _ = out.insert(key);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_contains_remove() {
        let mut set = LongSet::new();
        assert!(set.insert(1).unwrap());
        assert!(!set.insert(1).unwrap());
        assert!(set.contains(1));
        assert!(set.remove(1));
        assert!(!set.remove(1));
        assert!(set.is_empty());
    }

    #[test]
    fn test_intersection() {
        let mut a = LongSet::new();
        let mut b = LongSet::new();
        for k in 0..10 {
            a.insert(k).unwrap();
        }
        for k in 5..20 {
            b.insert(k).unwrap();
        }
        let both = a.intersection(&b);
        let mut keys: Vec<i64> = both.iter().collect();
        keys.sort();
        assert_eq!(keys, vec![5, 6, 7, 8, 9]);
    }
}
