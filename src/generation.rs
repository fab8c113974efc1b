//! Generation: one loaded model plus its serving-time mutable state.
//!
//! # Locking
//! Each mutable map has its own `parking_lot::RwLock`:
//! - `users`, `items`: write side held only to insert or remove a row key
//! - `known_items`: write side held only to create or drop a user's set;
//!   membership changes go through the per-user `Mutex<LongSet>`
//!
//! Row contents are never written under a map lock; each [`FeatureVector`]
//! carries its own lock.
//!
//! Acquisition order when nesting is `known_items → users → items`. Nothing
//! ever holds a map lock while waiting for one earlier in that order.

use crate::candidates::{CandidatePartitioner, EvenPartitioner};
use crate::collections::{LongFloatMap, LongObjectMap, LongSet};
use crate::error::{ServingError, ServingResult};
use crate::ids::StringLongMapping;
use crate::solver::{CholeskySolver, Solver};
use crate::vectors::{FeatureVector, SharedVector};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// A user's known-item set, shared between the map and in-flight queries.
pub type KnownItems = Arc<Mutex<LongSet>>;

pub type FeatureMatrix = LongObjectMap<SharedVector>;

pub struct Generation {
    users: RwLock<FeatureMatrix>,
    items: RwLock<FeatureMatrix>,
    known_items: Option<RwLock<LongObjectMap<KnownItems>>>,
    id_mapping: StringLongMapping,
    /// Built from the item matrix: maps an item row to a user correction.
    user_solver: RwLock<Option<Arc<dyn Solver>>>,
    /// Built from the user matrix: maps a user row to an item correction.
    item_solver: RwLock<Option<Arc<dyn Solver>>>,
    partitioner: Box<dyn CandidatePartitioner>,
}

impl Generation {
    pub fn builder() -> GenerationBuilder {
        GenerationBuilder::default()
    }

    // --- accessors ---

    pub fn users(&self) -> &RwLock<FeatureMatrix> {
        &self.users
    }

    pub fn items(&self) -> &RwLock<FeatureMatrix> {
        &self.items
    }

    /// `None` when the deployment does not track known items.
    pub fn known_items(&self) -> Option<&RwLock<LongObjectMap<KnownItems>>> {
        self.known_items.as_ref()
    }

    pub fn tracks_known_items(&self) -> bool {
        self.known_items.is_some()
    }

    pub fn id_mapping(&self) -> &StringLongMapping {
        &self.id_mapping
    }

    pub fn user_solver(&self) -> Option<Arc<dyn Solver>> {
        self.user_solver.read().clone()
    }

    pub fn item_solver(&self) -> Option<Arc<dyn Solver>> {
        self.item_solver.read().clone()
    }

    pub fn partitioner(&self) -> &dyn CandidatePartitioner {
        self.partitioner.as_ref()
    }

    pub fn num_users(&self) -> usize {
        self.users.read().len()
    }

    pub fn num_items(&self) -> usize {
        self.items.read().len()
    }

    /// Common row length, if any row exists yet.
    pub fn rank(&self) -> Option<usize> {
        Self::any_rank(&self.users).or_else(|| Self::any_rank(&self.items))
    }

    fn any_rank(matrix: &RwLock<FeatureMatrix>) -> Option<usize> {
        matrix.read().values().next().map(|row| row.rank())
    }

    // --- row access ---

    pub fn user_row(&self, user_id: i64) -> Option<SharedVector> {
        self.users.read().get(user_id).cloned()
    }

    pub fn item_row(&self, item_id: i64) -> Option<SharedVector> {
        self.items.read().get(item_id).cloned()
    }

    /// Existing or freshly zeroed user row. `None` while the rank is unknown.
    pub fn user_row_or_create(&self, user_id: i64) -> ServingResult<Option<SharedVector>> {
        Ok(Self::row_or_create(&self.users, &self.items, user_id)?.map(|(row, _)| row))
    }

    /// Existing or freshly zeroed item row, plus whether it was just created.
    /// New items are announced to the partitioner.
    pub fn item_row_or_create(&self, item_id: i64) -> ServingResult<Option<(SharedVector, bool)>> {
        let created = Self::row_or_create(&self.items, &self.users, item_id)?;
        if let Some((_, true)) = created {
            self.partitioner.add_item(item_id);
        }
        Ok(created)
    }

    /// Read, detect the miss, then insert under the write lock. The rank
    /// lookup happens before the write lock is taken.
    fn row_or_create(
        matrix: &RwLock<FeatureMatrix>,
        other: &RwLock<FeatureMatrix>,
        id: i64,
    ) -> ServingResult<Option<(SharedVector, bool)>> {
        if let Some(row) = matrix.read().get(id) {
            return Ok(Some((row.clone(), false)));
        }
        let Some(rank) = Self::any_rank(matrix).or_else(|| Self::any_rank(other)) else {
            return Ok(None);
        };
        let mut guard = matrix.write();
        if let Some(row) = guard.get(id) {
            return Ok(Some((row.clone(), false)));
        }
        let row = Arc::new(FeatureVector::zeros(rank));
        guard.put(id, row.clone())?;
        Ok(Some((row, true)))
    }

    // --- known items ---

    pub fn known_items_for(&self, user_id: i64) -> Option<KnownItems> {
        self.known_items.as_ref()?.read().get(user_id).cloned()
    }

    /// Record `item_id` as known to `user_id`. No-op without tracking.
    pub fn add_known_item(&self, user_id: i64, item_id: i64) -> ServingResult<()> {
        let Some(known) = &self.known_items else {
            return Ok(());
        };
        {
            let map = known.read();
            if let Some(set) = map.get(user_id) {
                set.lock().insert(item_id)?;
                return Ok(());
            }
        }
        let mut map = known.write();
        let set = map.get_or_insert_with(user_id, || Arc::new(Mutex::new(LongSet::new())))?;
        set.lock().insert(item_id)?;
        Ok(())
    }

    /// Forget `item_id` for `user_id`. If that empties the user's set, the user
    /// disappears from both the known items and the user matrix. Returns
    /// whether the user was removed.
    pub fn remove_known_item(&self, user_id: i64, item_id: i64) -> bool {
        let Some(known) = &self.known_items else {
            return false;
        };
        let emptied = {
            let map = known.read();
            match map.get(user_id) {
                Some(set) => {
                    let mut set = set.lock();
                    set.remove(item_id);
                    set.is_empty()
                }
                None => false,
            }
        };
        if !emptied {
            return false;
        }

        let mut map = known.write();
        // another writer may have refilled the set meanwhile
        let still_empty = map.get(user_id).map(|s| s.lock().is_empty()).unwrap_or(false);
        if !still_empty {
            return false;
        }
        map.remove(user_id);
        self.users.write().remove(user_id);
        debug!(user_id, "removed user after last known item");
        true
    }

    /// Interaction counts per item across all users.
    pub fn item_counts(&self) -> ServingResult<Option<LongFloatMap>> {
        let Some(known) = &self.known_items else {
            return Ok(None);
        };
        let map = known.read();
        let mut counts = LongFloatMap::with_capacity(self.items.read().len());
        for set in map.values() {
            for item_id in set.lock().iter() {
                counts.increment(item_id, 1.0)?;
            }
        }
        Ok(Some(counts))
    }

    // --- solvers ---

    /// Rebuild both solvers from the current matrices.
    pub fn recompute_solvers(&self) {
        let start = Instant::now();
        let user_solver = Self::solver_for(&self.items);
        let item_solver = Self::solver_for(&self.users);
        info!(
            rank = ?self.rank(),
            user_solver = user_solver.is_some(),
            item_solver = item_solver.is_some(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "recomputed solvers"
        );
        *self.user_solver.write() = user_solver;
        *self.item_solver.write() = item_solver;
    }

    fn solver_for(matrix: &RwLock<FeatureMatrix>) -> Option<Arc<dyn Solver>> {
        let guard = matrix.read();
        CholeskySolver::from_rows(guard.values()).map(|s| Arc::new(s) as Arc<dyn Solver>)
    }

    /// String IDs of every user row.
    pub fn all_user_ids(&self) -> Vec<String> {
        self.users.read().keys().map(|id| self.id_mapping.to_id_string(id)).collect()
    }

    /// String IDs of every item row.
    pub fn all_item_ids(&self) -> Vec<String> {
        self.items.read().keys().map(|id| self.id_mapping.to_id_string(id)).collect()
    }
}

/// Assembles a [`Generation`] from string-keyed rows.
pub struct GenerationBuilder {
    users: FeatureMatrix,
    items: FeatureMatrix,
    known_items: Option<LongObjectMap<KnownItems>>,
    id_mapping: StringLongMapping,
    partitioner: Option<Box<dyn CandidatePartitioner>>,
    rank: Option<usize>,
}

impl Default for GenerationBuilder {
    fn default() -> Self {
        Self {
            users: LongObjectMap::new(),
            items: LongObjectMap::new(),
            known_items: Some(LongObjectMap::new()),
            id_mapping: StringLongMapping::new(),
            partitioner: None,
            rank: None,
        }
    }
}

impl GenerationBuilder {
    /// Enable or disable known-item tracking (enabled by default).
    pub fn track_known_items(mut self, track: bool) -> Self {
        self.known_items = if track { Some(LongObjectMap::new()) } else { None };
        self
    }

    pub fn partitioner(mut self, partitioner: impl CandidatePartitioner + 'static) -> Self {
        self.partitioner = Some(Box::new(partitioner));
        self
    }

    pub fn user(mut self, id: &str, features: Vec<f32>) -> ServingResult<Self> {
        self.check_rank(id, &features)?;
        let numeric = self.id_mapping.add(id);
        self.users.put(numeric, FeatureVector::shared(features))?;
        Ok(self)
    }

    pub fn item(mut self, id: &str, features: Vec<f32>) -> ServingResult<Self> {
        self.check_rank(id, &features)?;
        let numeric = self.id_mapping.add(id);
        self.items.put(numeric, FeatureVector::shared(features))?;
        Ok(self)
    }

    /// Record a known item. Ignored when tracking is disabled.
    pub fn known_item(mut self, user: &str, item: &str) -> ServingResult<Self> {
        let user_id = self.id_mapping.add(user);
        let item_id = self.id_mapping.add(item);
        if let Some(known) = self.known_items.as_mut() {
            known
                .get_or_insert_with(user_id, || Arc::new(Mutex::new(LongSet::new())))?
                .lock()
                .insert(item_id)?;
        }
        Ok(self)
    }

    fn check_rank(&mut self, id: &str, features: &[f32]) -> ServingResult<()> {
        match self.rank {
            Some(rank) if rank != features.len() => Err(ServingError::invalid_argument(format!(
                "row {} has {} features, expected {}",
                id,
                features.len(),
                rank
            ))),
            Some(_) => Ok(()),
            None if features.is_empty() => {
                Err(ServingError::invalid_argument(format!("row {} has no features", id)))
            }
            None => {
                self.rank = Some(features.len());
                Ok(())
            }
        }
    }

    pub fn build(self) -> Generation {
        let partitioner = self.partitioner.unwrap_or_else(|| Box::new(EvenPartitioner::new(num_cpus::get())));
        let generation = Generation {
            users: RwLock::new(self.users),
            items: RwLock::new(self.items),
            known_items: self.known_items.map(RwLock::new),
            id_mapping: self.id_mapping,
            user_solver: RwLock::new(None),
            item_solver: RwLock::new(None),
            partitioner,
        };
        generation.recompute_solvers();
        generation
    }
}
