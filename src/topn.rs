//! Bounded top-N selection over a stream of scored IDs.
//!
//! Keeps a min-heap of at most `n` entries. Once the heap is full, a candidate
//! only enters by replacing the current minimum in place, so the heap never
//! reallocates after warm-up.
//!
//! The parallel variant shares one heap behind a mutex. Each worker caches the
//! last heap minimum it saw; because the minimum of a full heap only rises, the
//! cache is a lower bound and anything at or below it can be skipped without
//! touching the lock.

use crate::error::{ServingError, ServingResult};
use parking_lot::Mutex;
use rayon::ThreadPool;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// A scored numeric ID.
///
/// Ordered ascending by value, then by ID, so a sorted-descending result
/// lists equal values by descending ID.
#[derive(Debug, Clone, Copy)]
pub struct NumericIdValue {
    pub id: i64,
    pub value: f32,
}

impl NumericIdValue {
    pub fn new(id: i64, value: f32) -> Self {
        Self { id, value }
    }
}

impl PartialEq for NumericIdValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NumericIdValue {}

impl PartialOrd for NumericIdValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NumericIdValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then_with(|| self.id.cmp(&other.id))
    }
}

type MinHeap = BinaryHeap<Reverse<NumericIdValue>>;

fn check_how_many(how_many: usize) -> ServingResult<()> {
    if how_many == 0 {
        return Err(ServingError::invalid_argument("howMany must be positive"));
    }
    Ok(())
}

/// Offer `candidate` to a heap bounded at `how_many`.
#[inline]
fn offer(heap: &mut MinHeap, how_many: usize, candidate: NumericIdValue) {
    if heap.len() < how_many {
        heap.push(Reverse(candidate));
    } else if let Some(mut min) = heap.peek_mut() {
        if candidate > min.0 {
            *min = Reverse(candidate);
        }
    }
}

fn into_sorted(heap: MinHeap) -> Vec<NumericIdValue> {
    let mut out: Vec<NumericIdValue> = heap.into_iter().map(|r| r.0).collect();
    out.sort_unstable_by(|a, b| b.cmp(a));
    out
}

/// The `how_many` greatest values, sorted descending.
pub fn select_top_n(
    values: impl IntoIterator<Item = NumericIdValue>,
    how_many: usize,
) -> ServingResult<Vec<NumericIdValue>> {
    check_how_many(how_many)?;
    let mut heap = MinHeap::with_capacity(how_many + 1);
    for candidate in values {
        offer(&mut heap, how_many, candidate);
    }
    Ok(into_sorted(heap))
}

/// Heap shared by several workers.
pub struct TopNConsumer {
    heap: Mutex<MinHeap>,
    how_many: usize,
}

impl TopNConsumer {
    pub fn new(how_many: usize) -> ServingResult<Self> {
        check_how_many(how_many)?;
        Ok(Self {
            heap: Mutex::new(MinHeap::with_capacity(how_many + 1)),
            how_many,
        })
    }

    /// A per-thread handle with its own cached threshold.
    pub fn worker(&self) -> TopNWorker<'_> {
        TopNWorker { shared: self, threshold: None }
    }

    pub fn into_sorted(self) -> Vec<NumericIdValue> {
        into_sorted(self.heap.into_inner())
    }
}

pub struct TopNWorker<'a> {
    shared: &'a TopNConsumer,
    /// Heap minimum as last seen while the heap was full.
    threshold: Option<NumericIdValue>,
}

impl TopNWorker<'_> {
    pub fn offer(&mut self, candidate: NumericIdValue) {
        if let Some(threshold) = self.threshold {
            if candidate <= threshold {
                return;
            }
        }
        let shared = self.shared;
        let how_many = shared.how_many;
        let mut heap = shared.heap.lock();
        offer(&mut heap, how_many, candidate);
        if heap.len() >= how_many {
            self.threshold = heap.peek().map(|r| r.0);
        }
    }
}

/// Run every shard on `pool` and merge into one top-N list.
///
/// A single shard runs on the calling thread.
pub fn select_top_n_parallel<I>(
    pool: &ThreadPool,
    shards: Vec<I>,
    how_many: usize,
) -> ServingResult<Vec<NumericIdValue>>
where
    I: Iterator<Item = NumericIdValue> + Send,
{
    check_how_many(how_many)?;
    if shards.len() <= 1 {
        return select_top_n(shards.into_iter().flatten(), how_many);
    }
    let consumer = TopNConsumer::new(how_many)?;
    pool.scope(|scope| {
        for shard in shards {
            let consumer = &consumer;
            scope.spawn(move |_| {
                let mut worker = consumer.worker();
                for candidate in shard {
                    worker.offer(candidate);
                }
            });
        }
    });
    Ok(consumer.into_sorted())
}
