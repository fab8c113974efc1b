//! Open-addressing core shared by the long-keyed containers.
//!
//! # Layout
//! Two parallel arrays: `keys: Vec<i64>` and `values: Vec<V>`.
//! - `key == EMPTY`   → slot never used (terminates a probe chain)
//! - `key == REMOVED` → tombstone (deleted, chain continues)
//!
//! Probing is double hashing over a twin-prime sized table.
//!
//! # Thread Safety
//! None. Wrap in `parking_lot::RwLock` and call reads under `read()`,
//! mutations under `write()`.

use super::primes::twin_prime_at_least;
use super::{EMPTY, REMOVED};
use crate::error::{ServingError, ServingResult};
use std::ops::Range;

/// Slots (live + tombstones) may occupy at most `1 / LOAD_FACTOR` of the table.
const LOAD_FACTOR: f64 = 1.5;

#[derive(Debug, Clone)]
pub(crate) struct RawTable<V> {
    keys: Vec<i64>,
    values: Vec<V>,
    /// Live entries
    size: usize,
    /// Live entries plus tombstones
    slots_used: usize,
}

#[inline]
fn hash(key: i64) -> usize {
    let k = key as u64;
    (((k ^ (k >> 32)) as u32) & 0x7FFF_FFFF) as usize
}

impl<V: Default> RawTable<V> {
    pub fn with_capacity(expected: usize) -> Self {
        let cap = twin_prime_at_least((expected as f64 * LOAD_FACTOR) as usize + 1);
        Self::allocate(cap)
    }

    fn allocate(cap: usize) -> Self {
        let mut values = Vec::with_capacity(cap);
        values.resize_with(cap, V::default);
        Self {
            keys: vec![EMPTY; cap],
            values,
            size: 0,
            slots_used: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.keys.len()
    }

    /// Slot holding `key`, or the EMPTY slot that ends its probe chain.
    fn find(&self, key: i64) -> usize {
        let len = self.keys.len();
        let h = hash(key);
        let jump = 1 + h % (len - 2);
        let mut idx = h % len;
        loop {
            let current = self.keys[idx];
            if current == EMPTY || current == key {
                return idx;
            }
            idx = (idx + len - jump) % len;
        }
    }

    /// Like `find`, but prefers reusing the first tombstone on the chain.
    fn find_for_add(&self, key: i64) -> usize {
        let len = self.keys.len();
        let h = hash(key);
        let jump = 1 + h % (len - 2);
        let mut idx = h % len;
        let mut first_removed = None;
        loop {
            let current = self.keys[idx];
            if current == key {
                return idx;
            }
            if current == EMPTY {
                return first_removed.unwrap_or(idx);
            }
            if current == REMOVED && first_removed.is_none() {
                first_removed = Some(idx);
            }
            idx = (idx + len - jump) % len;
        }
    }

    #[inline]
    fn is_sentinel(key: i64) -> bool {
        key == EMPTY || key == REMOVED
    }

    pub fn index_of(&self, key: i64) -> Option<usize> {
        if Self::is_sentinel(key) {
            return None;
        }
        let idx = self.find(key);
        (self.keys[idx] == key).then_some(idx)
    }

    pub fn get(&self, key: i64) -> Option<&V> {
        self.index_of(key).map(|i| &self.values[i])
    }

    pub fn get_mut(&mut self, key: i64) -> Option<&mut V> {
        self.index_of(key).map(move |i| &mut self.values[i])
    }

    /// Slot index for `key`, inserting `make()` first when absent.
    pub fn slot_or_insert_with(&mut self, key: i64, make: impl FnOnce() -> V) -> ServingResult<usize> {
        if Self::is_sentinel(key) {
            return Err(ServingError::InvalidKey(key));
        }
        if let Some(idx) = self.index_of(key) {
            return Ok(idx);
        }
        self.grow_if_needed();
        let idx = self.find_for_add(key);
        if self.keys[idx] == EMPTY {
            self.slots_used += 1;
        }
        self.keys[idx] = key;
        self.values[idx] = make();
        self.size += 1;
        Ok(idx)
    }

    pub fn insert(&mut self, key: i64, value: V) -> ServingResult<Option<V>> {
        if let Some(idx) = self.index_of(key) {
            return Ok(Some(std::mem::replace(&mut self.values[idx], value)));
        }
        self.slot_or_insert_with(key, || value)?;
        Ok(None)
    }

    pub fn remove(&mut self, key: i64) -> Option<V> {
        let idx = self.index_of(key)?;
        self.keys[idx] = REMOVED;
        self.size -= 1;
        Some(std::mem::take(&mut self.values[idx]))
    }

    #[inline]
    pub fn value_at_mut(&mut self, idx: usize) -> &mut V {
        &mut self.values[idx]
    }

    pub fn clear(&mut self) {
        self.keys.iter_mut().for_each(|k| *k = EMPTY);
        self.values.iter_mut().for_each(|v| *v = V::default());
        self.size = 0;
        self.slots_used = 0;
    }

    /// Grow when mostly live, compact in place when mostly tombstones.
    fn grow_if_needed(&mut self) {
        let cap = self.keys.len();
        if ((self.slots_used + 1) as f64) * LOAD_FACTOR < cap as f64 {
            return;
        }
        if (self.size as f64) * LOAD_FACTOR >= self.slots_used as f64 {
            self.rehash(twin_prime_at_least((LOAD_FACTOR * cap as f64) as usize + 1));
        } else {
            self.rehash(cap);
        }
    }

    fn rehash(&mut self, new_cap: usize) {
        let old_keys = std::mem::replace(&mut self.keys, vec![EMPTY; new_cap]);
        let mut fresh = Vec::with_capacity(new_cap);
        fresh.resize_with(new_cap, V::default);
        let old_values = std::mem::replace(&mut self.values, fresh);
        self.slots_used = self.size;
        for (key, value) in old_keys.into_iter().zip(old_values) {
            if !Self::is_sentinel(key) {
                let idx = self.find(key);
                self.keys[idx] = key;
                self.values[idx] = value;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &V)> + '_ {
        self.iter_slots(0..self.keys.len())
    }

    /// Live entries whose slot index falls in `range` (clamped to the table).
    pub fn iter_slots(&self, range: Range<usize>) -> impl Iterator<Item = (i64, &V)> + '_ {
        let end = range.end.min(self.keys.len());
        let start = range.start.min(end);
        self.keys[start..end]
            .iter()
            .zip(&self.values[start..end])
            .filter(|(k, _)| !Self::is_sentinel(**k))
            .map(|(k, v)| (*k, v))
    }
}
