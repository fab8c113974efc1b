//! Primitive associative containers keyed by `i64`.
//!
//! Open-addressing tables that store keys and values in flat arrays, with no
//! per-entry boxing:
//! - [`LongObjectMap`]: `i64 → V`
//! - [`LongFloatMap`]: `i64 → f32`, with in-place `increment`
//! - [`LongSet`]: set of `i64`
//!
//! Two key values are reserved as slot markers ([`EMPTY`], [`REMOVED`]);
//! inserting either fails with `ServingError::InvalidKey`.
//!
//! None of these are safe for concurrent mutation. The generation wraps each
//! one in a `parking_lot::RwLock` (or `Mutex`) and serializes writers itself.

mod primes;
mod raw;
mod long_object_map;
mod long_float_map;
mod long_set;

pub use long_object_map::LongObjectMap;
pub use long_float_map::LongFloatMap;
pub use long_set::LongSet;

/// Marks a slot that has never held a key.
pub const EMPTY: i64 = i64::MIN;
/// Marks a slot whose key was removed.
pub const REMOVED: i64 = i64::MAX;
