//! String ↔ numeric ID mapping.
//!
//! Internally every user and item is an `i64`. The forward direction is a pure
//! function: IDs that look like signed integers of at most 18 digits are parsed
//! verbatim, anything else is hashed with seahash. Only hashed IDs need the
//! reverse table, but recording numeric ones is harmless.
//!
//! Hash collisions resolve last-write-wins: a later string with the same hash
//! takes over the reverse entry.

use crate::collections::{LongObjectMap, EMPTY, REMOVED};
use parking_lot::RwLock;

/// Longest digit run that is parsed rather than hashed. Keeps parsed IDs
/// well away from the container sentinels at the `i64` extremes.
const MAX_NUMERIC_DIGITS: usize = 18;

pub struct StringLongMapping {
    reverse: RwLock<LongObjectMap<String>>,
}

impl Default for StringLongMapping {
    fn default() -> Self {
        Self::new()
    }
}

impl StringLongMapping {
    pub fn new() -> Self {
        Self {
            reverse: RwLock::new(LongObjectMap::new()),
        }
    }

    /// Numeric ID for `id`.
    pub fn to_long(id: &str) -> i64 {
        if Self::is_numeric(id) {
            if let Ok(n) = id.parse::<i64>() {
                return n;
            }
        }
        Self::hash_id(id)
    }

    fn is_numeric(id: &str) -> bool {
        let digits = id.strip_prefix('-').unwrap_or(id);
        !digits.is_empty()
            && digits.len() <= MAX_NUMERIC_DIGITS
            && digits.bytes().all(|b| b.is_ascii_digit())
    }

    fn hash_id(id: &str) -> i64 {
        let h = seahash::hash(id.as_bytes()) as i64;
        match h {
            EMPTY => EMPTY + 1,
            REMOVED => REMOVED - 1,
            _ => h,
        }
    }

    /// Record `id` and return its numeric form.
    pub fn add(&self, id: &str) -> i64 {
        let numeric = Self::to_long(id);
        self.add_mapping(id, numeric);
        numeric
    }

    pub fn add_mapping(&self, id: &str, numeric: i64) {
        let mut reverse = self.reverse.write();
        if reverse.get(numeric).map(String::as_str) != Some(id) {
            // numeric never equals a sentinel: to_long maps them away
            let _ = reverse.put(numeric, id.to_string());
        }
    }

    /// Original string for `numeric`, or its decimal rendering when unrecorded.
    pub fn to_id_string(&self, numeric: i64) -> String {
        self.reverse
            .read()
            .get(numeric)
            .cloned()
            .unwrap_or_else(|| numeric.to_string())
    }

    pub fn len(&self) -> usize {
        self.reverse.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_ids_parse_verbatim() {
        assert_eq!(StringLongMapping::to_long("42"), 42);
        assert_eq!(StringLongMapping::to_long("-17"), -17);
        assert_eq!(StringLongMapping::to_long("000123"), 123);
        assert_eq!(StringLongMapping::to_long("999999999999999999"), 999_999_999_999_999_999);
    }

    #[test]
    fn test_long_or_non_numeric_ids_are_hashed() {
        let nineteen = "1234567890123456789";
        assert_ne!(StringLongMapping::to_long(nineteen), 1_234_567_890_123_456_789);
        assert_eq!(StringLongMapping::to_long("abc"), StringLongMapping::to_long("abc"));
        assert_ne!(StringLongMapping::to_long("abc"), StringLongMapping::to_long("abd"));
        assert_ne!(StringLongMapping::to_long("-"), 0);
        assert_eq!(StringLongMapping::to_long("+5"), StringLongMapping::hash_id("+5"));
    }

    #[test]
    fn test_round_trip() {
        let mapping = StringLongMapping::new();
        for id in ["alice", "item/7", "x y z", "12a"] {
            let n = mapping.add(id);
            assert_eq!(mapping.to_id_string(n), id);
        }
        assert_eq!(mapping.to_id_string(77), "77");
    }

    #[test]
    fn test_collision_last_write_wins() {
        let mapping = StringLongMapping::new();
        mapping.add_mapping("first", 5);
        mapping.add_mapping("second", 5);
        assert_eq!(mapping.to_id_string(5), "second");
    }
}
