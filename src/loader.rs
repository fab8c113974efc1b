//! Generation loaders
//!
//! The engine asks its loader for the newest generation at startup and on
//! every `refresh`. `Ok(None)` means there is nothing new to install.

use crate::candidates::EvenPartitioner;
use crate::error::{ServingError, ServingResult};
use crate::generation::Generation;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::time::{Instant, SystemTime};
use tracing::{debug, info};

/// Snapshot file name inside the model directory.
pub const MODEL_FILE: &str = "model.json";

pub trait GenerationLoader: Send + Sync {
    fn load_latest_generation(&self, local_path: &Path) -> ServingResult<Option<Generation>>;
}

#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    #[serde(default)]
    users: HashMap<String, Vec<f32>>,
    #[serde(default)]
    items: HashMap<String, Vec<f32>>,
    #[serde(default)]
    known_items: HashMap<String, Vec<String>>,
}

/// Loads `<local_path>/model.json`.
///
/// ```json
/// {"users": {"u1": [0.1, 0.2]}, "items": {"i1": [0.3, 0.4]}, "known_items": {"u1": ["i1"]}}
/// ```
///
/// A file whose modification time matches the last successful load is
/// reported as unchanged.
pub struct JsonSnapshotLoader {
    track_known_items: bool,
    partitions: usize,
    last_loaded: Mutex<Option<SystemTime>>,
}

impl JsonSnapshotLoader {
    pub fn new(track_known_items: bool, partitions: usize) -> Self {
        Self { track_known_items, partitions: partitions.max(1), last_loaded: Mutex::new(None) }
    }

    fn build(&self, snapshot: Snapshot) -> ServingResult<Generation> {
        let mut builder = Generation::builder()
            .track_known_items(self.track_known_items)
            .partitioner(EvenPartitioner::new(self.partitions));
        for (id, features) in snapshot.users {
            builder = builder.user(&id, features)?;
        }
        for (id, features) in snapshot.items {
            builder = builder.item(&id, features)?;
        }
        if self.track_known_items {
            for (user, items) in snapshot.known_items {
                for item in items {
                    builder = builder.known_item(&user, &item)?;
                }
            }
        }
        Ok(builder.build())
    }
}

impl GenerationLoader for JsonSnapshotLoader {
    fn load_latest_generation(&self, local_path: &Path) -> ServingResult<Option<Generation>> {
        let file = local_path.join(MODEL_FILE);
        let modified = match std::fs::metadata(&file) {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %file.display(), "no model snapshot");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let mut last = self.last_loaded.lock();
        if *last == Some(modified) {
            debug!(path = %file.display(), "model snapshot unchanged");
            return Ok(None);
        }

        let start = Instant::now();
        let text = std::fs::read_to_string(&file)?;
        let snapshot: Snapshot = serde_json::from_str(&text)
            .map_err(|e| ServingError::config(format!("{}: {}", file.display(), e)))?;
        let generation = self.build(snapshot)?;
        *last = Some(modified);
        info!(
            path = %file.display(),
            users = generation.num_users(),
            items = generation.num_items(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "loaded model snapshot"
        );
        Ok(Some(generation))
    }
}

/// Hands out pre-built generations in order, then `None`.
#[derive(Default)]
pub struct StaticLoader {
    queue: Mutex<VecDeque<Generation>>,
}

impl StaticLoader {
    pub fn new(generations: impl IntoIterator<Item = Generation>) -> Self {
        Self { queue: Mutex::new(generations.into_iter().collect()) }
    }

    /// Queue one more generation for the next `refresh`.
    pub fn push(&self, generation: Generation) {
        self.queue.lock().push_back(generation);
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl GenerationLoader for StaticLoader {
    fn load_latest_generation(&self, _local_path: &Path) -> ServingResult<Option<Generation>> {
        Ok(self.queue.lock().pop_front())
    }
}
