//! Candidate Iterators
//!
//! Lazy, single-pass producers of scored candidates. Each one wraps a stream of
//! matrix entries (usually one shard of the item matrix) and yields
//! [`NumericIdValue`](crate::topn::NumericIdValue)s ready for top-N selection:
//! - [`RecommendIterator`]: mean dot product against one or more user vectors
//! - [`SimilarItemsIterator`]: mean cosine against one or more item vectors
//! - [`BecauseIterator`]: cosine of each known item against a target item
//! - [`PopularityIterator`]: interaction counts
//!
//! Filtered candidates and candidates whose score is not finite produce no
//! output; they never reach the heap.

mod rescorer;
mod partition;
mod recommend;
mod similar;
mod because;
mod popular;

pub use rescorer::{PairRescorer, Rescorer};
pub use partition::{CandidatePartitioner, EvenPartitioner};
pub use recommend::RecommendIterator;
pub use similar::SimilarItemsIterator;
pub use because::BecauseIterator;
pub use popular::PopularityIterator;

use crate::topn::NumericIdValue;

/// Final score check shared by every iterator.
#[inline]
pub(crate) fn scored(id: i64, score: f64) -> Option<NumericIdValue> {
    let value = score as f32;
    value.is_finite().then(|| NumericIdValue::new(id, value))
}
