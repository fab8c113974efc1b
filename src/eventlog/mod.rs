//! Event Log Module
//!
//! Append-only record of every preference change accepted by the engine, in
//! the same CSV shape bulk ingest reads back (`user,item,value`, or
//! `user,item,` for a removal). Selectable at runtime:
//! - `Disabled`: nothing is written
//! - `Sync`: CSV file on disk with background group commit
//!
//! # Example
//! ```ignore
//! use foldwise::eventlog::{EventLogConfig, EventLogMode};
//!
//! let log = EventLogConfig::new(EventLogMode::Sync).path("./events").build()?;
//! log.append("alice", "item-7", 1.0)?;
//! ```

mod traits;
mod noop;
mod disk;

pub use traits::EventLog;
pub use noop::NoOpEventLog;
pub use disk::{DiskEventLog, EVENTS_FILE};

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Event log mode, parsed case-insensitively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventLogMode {
    /// No log
    #[default]
    Disabled,
    /// CSV file with group commit and fsync on `sync()`
    Sync,
}

impl EventLogMode {
    /// Unknown names fall back to the default.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "off" | "disabled" | "none" | "noop" => EventLogMode::Disabled,
            "sync" | "disk" | "durable" | "csv" => EventLogMode::Sync,
            _ => EventLogMode::default(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventLogMode::Disabled => "disabled",
            EventLogMode::Sync => "sync",
        }
    }
}

impl From<String> for EventLogMode {
    fn from(s: String) -> Self {
        EventLogMode::parse(&s)
    }
}

impl From<EventLogMode> for String {
    fn from(mode: EventLogMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Event log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    pub mode: EventLogMode,
    /// Directory holding `events.csv`
    pub path: Option<PathBuf>,
    /// Group commit interval in milliseconds
    pub group_commit_ms: u64,
    /// Pending entries that trigger an early flush
    pub max_batch: usize,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            mode: EventLogMode::default(),
            path: None,
            group_commit_ms: 10,
            max_batch: 1000,
        }
    }
}

impl EventLogConfig {
    pub fn new(mode: EventLogMode) -> Self {
        Self { mode, ..Default::default() }
    }

    pub fn mode(mut self, mode: EventLogMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn group_commit_ms(mut self, ms: u64) -> Self {
        self.group_commit_ms = ms;
        self
    }

    pub fn max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    /// Create the log selected by `mode`.
    pub fn build(&self) -> io::Result<Box<dyn EventLog>> {
        match (self.mode, self.path.as_deref()) {
            (EventLogMode::Disabled, _) => Ok(Box::new(NoOpEventLog::new())),
            (EventLogMode::Sync, Some(path)) => Ok(Box::new(DiskEventLog::with_config(path, self)?)),
            (EventLogMode::Sync, None) => {
                warn!("event log mode is sync but no path is configured; events are not recorded");
                Ok(Box::new(NoOpEventLog::new()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(EventLogMode::parse("SYNC"), EventLogMode::Sync);
        assert_eq!(EventLogMode::parse("off"), EventLogMode::Disabled);
        assert_eq!(EventLogMode::parse("bogus"), EventLogMode::Disabled);
    }

    #[test]
    fn test_config_from_json() {
        let cfg: EventLogConfig = serde_json::from_str(r#"{"mode":"Disk","max_batch":5}"#).unwrap();
        assert_eq!(cfg.mode, EventLogMode::Sync);
        assert_eq!(cfg.max_batch, 5);
        assert_eq!(cfg.group_commit_ms, 10);
    }

    #[test]
    fn test_build_selects_implementation() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!EventLogConfig::default().build().unwrap().is_enabled());
        assert!(!EventLogConfig::new(EventLogMode::Sync).build().unwrap().is_enabled());
        let log = EventLogConfig::new(EventLogMode::Sync).path(dir.path()).build().unwrap();
        assert!(log.is_enabled());
    }
}
