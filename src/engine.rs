//! Serving engine
//!
//! Owns the current [`Generation`] behind an atomic pointer, a rayon pool for
//! candidate scans, the event log and the generation loader.
//!
//! Every query captures the generation once on entry and runs to completion
//! against it, even if `refresh` installs a newer one meanwhile.
//!
//! # Example
//! ```ignore
//! use foldwise::{EngineConfig, ServingEngine};
//!
//! let engine = ServingEngine::new(EngineConfig::new("./model"))?;
//! engine.set_preference("alice", "item-7", 1.0)?;
//! let top = engine.recommend("alice", 10)?;
//! ```

use crate::candidates::{
    BecauseIterator, PairRescorer, PopularityIterator, RecommendIterator, Rescorer, SimilarItemsIterator,
};
use crate::collections::LongSet;
use crate::config::EngineConfig;
use crate::error::{ServingError, ServingResult};
use crate::eventlog::EventLog;
use crate::foldin::{fold_in, fold_in_weight};
use crate::generation::{FeatureMatrix, Generation, KnownItems};
use crate::ids::StringLongMapping;
use crate::loader::{GenerationLoader, JsonSnapshotLoader};
use crate::topn::{select_top_n, select_top_n_parallel, NumericIdValue};
use crate::vectors::{cosine, dot, norm, SharedVector};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Ranked `(id, score)` pairs, best first.
pub type Ranked = Vec<(String, f32)>;

pub struct ServingEngine {
    config: EngineConfig,
    generation: ArcSwapOption<Generation>,
    pool: ThreadPool,
    event_log: Box<dyn EventLog>,
    loader: Box<dyn GenerationLoader>,
}

impl ServingEngine {
    /// Engine reading `model.json` snapshots from `config.model_dir`, with the
    /// configured event log. Loads a generation immediately if one exists.
    pub fn new(config: EngineConfig) -> ServingResult<Self> {
        let loader = JsonSnapshotLoader::new(config.track_known_items, config.partitions);
        let event_log = config.event_log.build()?;
        Self::with_components(config, Box::new(loader), event_log)
    }

    /// Engine with a custom loader and the configured event log.
    pub fn with_loader(config: EngineConfig, loader: impl GenerationLoader + 'static) -> ServingResult<Self> {
        let event_log = config.event_log.build()?;
        Self::with_components(config, Box::new(loader), event_log)
    }

    pub fn with_components(
        config: EngineConfig,
        loader: Box<dyn GenerationLoader>,
        event_log: Box<dyn EventLog>,
    ) -> ServingResult<Self> {
        let workers = config.worker_count();
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("foldwise-query-{}", i))
            .build()
            .map_err(|e| ServingError::config(format!("query pool: {}", e)))?;
        info!(
            workers,
            model_dir = %config.model_dir.display(),
            event_log = event_log.is_enabled(),
            "serving engine started"
        );
        let engine = Self { config, generation: ArcSwapOption::empty(), pool, event_log, loader };
        engine.refresh()?;
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn event_log(&self) -> &dyn EventLog {
        self.event_log.as_ref()
    }

    // =====================================================================
    // Generation lifecycle
    // =====================================================================

    /// The current generation, for callers that need several operations to
    /// see the same model.
    pub fn generation(&self) -> Option<Arc<Generation>> {
        self.generation.load_full()
    }

    fn current(&self) -> ServingResult<Arc<Generation>> {
        self.generation.load_full().ok_or(ServingError::NotReady)
    }

    pub fn is_ready(&self) -> bool {
        self.generation.load().is_some()
    }

    /// Ask the loader for a newer generation and install it if there is one.
    /// Returns whether a generation was installed.
    pub fn refresh(&self) -> ServingResult<bool> {
        match self.loader.load_latest_generation(&self.config.model_dir)? {
            Some(generation) => {
                self.install_generation(generation);
                Ok(true)
            }
            None => {
                debug!(model_dir = %self.config.model_dir.display(), "refresh found no new generation");
                Ok(false)
            }
        }
    }

    /// Atomically replace the current generation.
    pub fn install_generation(&self, generation: Generation) {
        info!(
            users = generation.num_users(),
            items = generation.num_items(),
            rank = ?generation.rank(),
            "installing generation"
        );
        self.generation.store(Some(Arc::new(generation)));
    }

    /// Rebuild the current generation's solvers from its matrices.
    pub fn recompute_solvers(&self) -> ServingResult<()> {
        self.current()?.recompute_solvers();
        Ok(())
    }

    /// Block until a generation is installed or `cancel` is set.
    /// Returns whether the engine became ready.
    pub fn await_ready(&self, cancel: &AtomicBool) -> bool {
        let poll = self.config.await_poll_interval();
        loop {
            if self.is_ready() {
                return true;
            }
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            std::thread::sleep(poll);
        }
    }

    pub fn await_ready_timeout(&self, timeout: Duration) -> bool {
        let poll = self.config.await_poll_interval();
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_ready() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(poll.min(deadline - now));
        }
    }

    // =====================================================================
    // Queries
    // =====================================================================

    /// Top items for one user, excluding items the user already knows.
    pub fn recommend(&self, user_id: &str, how_many: usize) -> ServingResult<Ranked> {
        self.recommend_to_many(&[user_id], how_many, false, None)
    }

    /// Top items by mean score across `user_ids`. Unknown users are ignored
    /// unless all of them are unknown. Without `include_known_items`, items
    /// known to every one of the users are excluded.
    pub fn recommend_to_many(
        &self,
        user_ids: &[&str],
        how_many: usize,
        include_known_items: bool,
        rescorer: Option<&dyn Rescorer>,
    ) -> ServingResult<Ranked> {
        check_how_many(how_many)?;
        let generation = self.current()?;

        let mut resolved = Vec::with_capacity(user_ids.len());
        let mut queries = Vec::with_capacity(user_ids.len());
        {
            let users = generation.users().read();
            for user in user_ids {
                let numeric = StringLongMapping::to_long(user);
                if let Some(row) = users.get(numeric) {
                    resolved.push(numeric);
                    queries.push(row.snapshot());
                }
            }
        }
        if queries.is_empty() {
            return Err(ServingError::no_such_user(user_ids.join(",")));
        }

        let exclude = if include_known_items { None } else { exclusion_set(&generation, &resolved) };
        let exclude = exclude.as_deref();

        let top = {
            let items = generation.items().read();
            let ranges = generation.partitioner().partition(&items, &queries);
            let shards = item_shards(&items, ranges)
                .into_iter()
                .map(|entries| RecommendIterator::new(entries, &queries, exclude, rescorer, generation.id_mapping()))
                .collect();
            select_top_n_parallel(&self.pool, shards, how_many)?
        };
        translate(&generation, top)
    }

    /// Top items for a user who exists only as a list of interactions.
    /// The supplied items are excluded from the result.
    pub fn recommend_to_anonymous(
        &self,
        item_ids: &[&str],
        values: Option<&[f32]>,
        how_many: usize,
        rescorer: Option<&dyn Rescorer>,
    ) -> ServingResult<Ranked> {
        check_how_many(how_many)?;
        let generation = self.current()?;
        let query = anonymous_vector(&generation, item_ids, values)?;
        let queries = vec![query];

        let mut known = LongSet::with_capacity(item_ids.len());
        for item in item_ids {
            known.insert(StringLongMapping::to_long(item))?;
        }
        let exclude = Mutex::new(known);

        let top = {
            let items = generation.items().read();
            let ranges = generation.partitioner().partition(&items, &queries);
            let shards = item_shards(&items, ranges)
                .into_iter()
                .map(|entries| {
                    RecommendIterator::new(entries, &queries, Some(&exclude), rescorer, generation.id_mapping())
                })
                .collect();
            select_top_n_parallel(&self.pool, shards, how_many)?
        };
        translate(&generation, top)
    }

    /// Items most similar on average to `item_ids`, never including them.
    pub fn most_similar_items(
        &self,
        item_ids: &[&str],
        how_many: usize,
        rescorer: Option<&dyn PairRescorer>,
    ) -> ServingResult<Ranked> {
        check_how_many(how_many)?;
        let generation = self.current()?;

        let top = {
            let items = generation.items().read();
            let mut query_ids = Vec::with_capacity(item_ids.len());
            let mut queries = Vec::with_capacity(item_ids.len());
            for item in item_ids {
                let numeric = StringLongMapping::to_long(item);
                if let Some(row) = items.get(numeric) {
                    query_ids.push(numeric);
                    queries.push(row.snapshot());
                }
            }
            if queries.is_empty() {
                return Err(ServingError::no_such_item(item_ids.join(",")));
            }

            let ranges = generation.partitioner().partition(&items, &queries);
            let shards = item_shards(&items, ranges)
                .into_iter()
                .map(|entries| {
                    SimilarItemsIterator::new(entries, &query_ids, &queries, rescorer, generation.id_mapping())
                })
                .collect();
            select_top_n_parallel(&self.pool, shards, how_many)?
        };
        translate(&generation, top)
    }

    /// Items with the most users knowing them.
    pub fn most_popular_items(&self, how_many: usize, rescorer: Option<&dyn Rescorer>) -> ServingResult<Ranked> {
        check_how_many(how_many)?;
        let generation = self.current()?;
        let counts = generation
            .item_counts()?
            .ok_or_else(|| ServingError::unsupported("popularity requires known-item tracking"))?;
        let top = select_top_n(PopularityIterator::new(counts.iter(), rescorer, generation.id_mapping()), how_many)?;
        translate(&generation, top)
    }

    /// `user · item`, or 0 when either is unknown.
    pub fn estimate_preference(&self, user_id: &str, item_id: &str) -> ServingResult<f32> {
        Ok(self.estimate_preferences(user_id, &[item_id])?.into_iter().next().unwrap_or(0.0))
    }

    /// Bulk [`estimate_preference`](Self::estimate_preference).
    pub fn estimate_preferences(&self, user_id: &str, item_ids: &[&str]) -> ServingResult<Vec<f32>> {
        let generation = self.current()?;
        let Some(user) = generation.user_row(StringLongMapping::to_long(user_id)) else {
            return Ok(vec![0.0; item_ids.len()]);
        };
        let user = user.snapshot();
        let items = generation.items().read();
        Ok(item_ids
            .iter()
            .map(|item| match items.get(StringLongMapping::to_long(item)) {
                Some(row) => dot(&user, &row.read()) as f32,
                None => 0.0,
            })
            .collect())
    }

    /// Estimate for `to_item_id` from an anonymous user's interactions.
    pub fn estimate_for_anonymous(
        &self,
        to_item_id: &str,
        item_ids: &[&str],
        values: Option<&[f32]>,
    ) -> ServingResult<f32> {
        let generation = self.current()?;
        let target = generation
            .item_row(StringLongMapping::to_long(to_item_id))
            .ok_or_else(|| ServingError::no_such_item(to_item_id))?;
        let query = anonymous_vector(&generation, item_ids, values)?;
        let estimate = dot(&query, &target.read()) as f32;
        Ok(estimate)
    }

    /// The user's known items ranked by similarity to `item_id`.
    pub fn recommended_because(&self, user_id: &str, item_id: &str, how_many: usize) -> ServingResult<Ranked> {
        check_how_many(how_many)?;
        let generation = self.current()?;
        if !generation.tracks_known_items() {
            return Err(ServingError::unsupported("explanations require known-item tracking"));
        }
        let user = StringLongMapping::to_long(user_id);
        if generation.user_row(user).is_none() {
            return Err(ServingError::no_such_user(user_id));
        }
        let target = generation
            .item_row(StringLongMapping::to_long(item_id))
            .ok_or_else(|| ServingError::no_such_item(item_id))?
            .snapshot();
        let Some(known) = generation.known_items_for(user) else {
            return Err(ServingError::no_such_user(user_id));
        };
        let known: Vec<i64> = known.lock().iter().collect();

        let top = {
            let items = generation.items().read();
            let entries = known.iter().filter_map(|id| items.get(*id).map(|row| (*id, row)));
            select_top_n(BecauseIterator::new(entries, &target), how_many)?
        };
        translate(&generation, top)
    }

    /// Cosine of each of `item_ids` against `to_item_id`. A zero-length
    /// vector on either side gives NaN.
    pub fn similarity_to_item(&self, to_item_id: &str, item_ids: &[&str]) -> ServingResult<Vec<f32>> {
        let generation = self.current()?;
        let items = generation.items().read();
        let target = items
            .get(StringLongMapping::to_long(to_item_id))
            .ok_or_else(|| ServingError::no_such_item(to_item_id))?
            .snapshot();
        item_ids
            .iter()
            .map(|item| {
                let row = items
                    .get(StringLongMapping::to_long(item))
                    .ok_or_else(|| ServingError::no_such_item(*item))?;
                let similarity = cosine(&row.read(), &target);
                Ok(similarity as f32)
            })
            .collect()
    }

    pub fn all_user_ids(&self) -> ServingResult<Vec<String>> {
        Ok(self.current()?.all_user_ids())
    }

    pub fn all_item_ids(&self) -> ServingResult<Vec<String>> {
        Ok(self.current()?.all_item_ids())
    }

    // =====================================================================
    // Updates
    // =====================================================================

    /// Record an interaction and fold it into the model.
    ///
    /// The event is logged first; a log failure is reported and ignored.
    /// Without a generation nothing else happens.
    pub fn set_preference(&self, user_id: &str, item_id: &str, value: f32) -> ServingResult<()> {
        if !value.is_finite() {
            return Err(ServingError::invalid_argument(format!("preference value {} is not finite", value)));
        }
        if let Err(e) = self.event_log.append(user_id, item_id, value) {
            warn!(error = %e, user_id, item_id, "event log append failed");
        }
        let Some(generation) = self.generation.load_full() else {
            debug!(user_id, item_id, "no generation; preference only logged");
            return Ok(());
        };

        let user = generation.id_mapping().add(user_id);
        let item = generation.id_mapping().add(item_id);
        let user_row = generation.user_row_or_create(user)?;
        let item_row = generation.item_row_or_create(item)?.map(|(row, _)| row);
        let user_solver = generation.user_solver();
        let item_solver = generation.item_solver();
        fold_in(user_row.as_deref(), item_row.as_deref(), value, user_solver.as_deref(), item_solver.as_deref())?;
        generation.add_known_item(user, item)
    }

    /// Forget an interaction. Only candidate eligibility changes; if it was
    /// the user's last known item the user is removed entirely.
    pub fn remove_preference(&self, user_id: &str, item_id: &str) -> ServingResult<()> {
        if let Err(e) = self.event_log.append_removal(user_id, item_id) {
            warn!(error = %e, user_id, item_id, "event log append failed");
        }
        let Some(generation) = self.generation.load_full() else {
            debug!(user_id, item_id, "no generation; removal only logged");
            return Ok(());
        };
        let user = StringLongMapping::to_long(user_id);
        let item = StringLongMapping::to_long(item_id);
        generation.remove_known_item(user, item);
        Ok(())
    }
}

fn check_how_many(how_many: usize) -> ServingResult<()> {
    if how_many == 0 {
        return Err(ServingError::invalid_argument("howMany must be positive"));
    }
    Ok(())
}

/// One entry iterator per slot range.
fn item_shards<'a>(
    items: &'a FeatureMatrix,
    ranges: Vec<Range<usize>>,
) -> Vec<impl Iterator<Item = (i64, &'a SharedVector)> + Send + 'a> {
    ranges.into_iter().map(|range| items.iter_slots(range)).collect()
}

/// Items to exclude for `users`: the single user's live set, or a fresh
/// intersection of all their sets.
fn exclusion_set(generation: &Generation, users: &[i64]) -> Option<KnownItems> {
    let (first, rest) = users.split_first()?;
    let first = generation.known_items_for(*first)?;
    if rest.is_empty() {
        return Some(first);
    }
    // one set locked at a time; the same user may appear twice
    let mut common = first.lock().clone();
    for user in rest {
        let set = generation.known_items_for(*user)?;
        common = common.intersection(&set.lock());
    }
    Some(Arc::new(Mutex::new(common)))
}

/// Synthetic user vector built by folding in each `(item, value)` in turn.
/// Values default to 1.0.
fn anonymous_vector(generation: &Generation, item_ids: &[&str], values: Option<&[f32]>) -> ServingResult<Vec<f32>> {
    if let Some(values) = values {
        if values.len() != item_ids.len() {
            return Err(ServingError::invalid_argument(format!(
                "{} item IDs but {} values",
                item_ids.len(),
                values.len()
            )));
        }
    }
    let rows: Vec<(Vec<f32>, f32)> = {
        let items = generation.items().read();
        item_ids
            .iter()
            .enumerate()
            .filter_map(|(i, item)| {
                let row = items.get(StringLongMapping::to_long(item))?;
                Some((row.snapshot(), values.map_or(1.0, |v| v[i])))
            })
            .collect()
    };
    let Some(rank) = rows.first().map(|(row, _)| row.len()) else {
        return Err(ServingError::no_such_item(item_ids.join(",")));
    };

    let mut query = vec![0.0f32; rank];
    let Some(solver) = generation.user_solver() else {
        return Ok(query);
    };
    for (row, value) in rows {
        let weight = fold_in_weight(dot(&query, &row), value);
        if weight == 0.0 {
            continue;
        }
        for (q, d) in query.iter_mut().zip(solver.solve(&row)) {
            *q += (weight * d) as f32;
        }
    }
    if !norm(&query).is_finite() {
        return Err(ServingError::corruption("non-finite anonymous user vector"));
    }
    Ok(query)
}

/// Numeric results back to string IDs.
fn translate(generation: &Generation, top: Vec<NumericIdValue>) -> ServingResult<Ranked> {
    let ids = generation.id_mapping();
    top.into_iter()
        .map(|hit| {
            if !hit.value.is_finite() {
                return Err(ServingError::corruption(format!("non-finite score for {}", hit.id)));
            }
            Ok((ids.to_id_string(hit.id), hit.value))
        })
        .collect()
}
