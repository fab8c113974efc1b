//! Rescoring hooks.
//!
//! Rescorers see string IDs, never numeric ones. Returning a non-finite score
//! from `rescore` vetoes the candidate just like `is_filtered`.

/// Adjusts or vetoes single-item candidates.
pub trait Rescorer: Send + Sync {
    fn is_filtered(&self, id: &str) -> bool;

    fn rescore(&self, id: &str, score: f64) -> f64;
}

/// Adjusts or vetoes (candidate, query item) pairs.
pub trait PairRescorer: Send + Sync {
    fn is_filtered(&self, candidate: &str, query: &str) -> bool;

    fn rescore(&self, candidate: &str, query: &str, score: f64) -> f64;
}
