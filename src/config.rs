//! Engine configuration
//!
//! Every field has a default, so a JSON file only needs the keys it changes:
//!
//! ```json
//! {"model_dir": "/srv/model", "workers": 8, "event_log": {"mode": "sync", "path": "/srv/events"}}
//! ```

use crate::error::ServingResult;
use crate::eventlog::EventLogConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Local path handed to the generation loader
    pub model_dir: PathBuf,
    /// Query pool size. `None` means CPUs plus `extra_workers`
    pub workers: Option<usize>,
    pub extra_workers: usize,
    /// Shards requested from the default partitioner
    pub partitions: usize,
    /// `await_ready` poll interval in milliseconds
    pub await_poll_ms: u64,
    pub event_log: EventLogConfig,
    pub track_known_items: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("."),
            workers: None,
            extra_workers: 2,
            partitions: num_cpus::get(),
            await_poll_ms: 1000,
            event_log: EventLogConfig::default(),
            track_known_items: true,
        }
    }
}

impl EngineConfig {
    pub fn new(model_dir: impl AsRef<Path>) -> Self {
        Self { model_dir: model_dir.as_ref().to_path_buf(), ..Default::default() }
    }

    pub fn from_json_str(json: &str) -> ServingResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ServingResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn model_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.model_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn await_poll_ms(mut self, ms: u64) -> Self {
        self.await_poll_ms = ms;
        self
    }

    pub fn event_log(mut self, event_log: EventLogConfig) -> Self {
        self.event_log = event_log;
        self
    }

    pub fn track_known_items(mut self, track: bool) -> Self {
        self.track_known_items = track;
        self
    }

    /// Resolved pool size, never zero.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| num_cpus::get() + self.extra_workers).max(1)
    }

    pub fn await_poll_interval(&self) -> Duration {
        Duration::from_millis(self.await_poll_ms.max(1))
    }
}
