//! Disk-based event log with group commit
//!
//! Appends go to an in-memory queue. A background thread writes the queue out
//! every `group_commit_ms`, or sooner once `max_batch` entries are waiting.
//! `sync()` drains the queue on the caller's thread and fsyncs.

use super::{EventLog, EventLogConfig};
use parking_lot::{Condvar, Mutex};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Result, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// File name inside the configured directory.
pub const EVENTS_FILE: &str = "events.csv";

/// One pending line. `value == None` is a removal.
struct Event {
    user: String,
    item: String,
    value: Option<f32>,
}

struct Shared {
    file: Mutex<BufWriter<File>>,
    pending: Mutex<Vec<Event>>,
    signal: Condvar,
    shutdown: AtomicBool,
    bytes: AtomicU64,
}

impl Shared {
    fn encode(batch: &[Event]) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
        for event in batch {
            let value = event.value.map(|v| v.to_string()).unwrap_or_default();
            writer.write_record([event.user.as_str(), event.item.as_str(), value.as_str()])?;
        }
        writer.into_inner().map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }

    /// Take the queue and write it out. The queue is taken under the file
    /// lock so batches reach the file in the order they were taken.
    /// Returns the number of events written.
    fn flush_pending(&self) -> Result<usize> {
        let mut file = self.file.lock();
        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return Ok(0);
        }
        let encoded = Self::encode(&batch)?;
        file.write_all(&encoded)?;
        file.flush()?;
        self.bytes.fetch_add(encoded.len() as u64, Ordering::Relaxed);
        Ok(batch.len())
    }
}

/// CSV event log on disk.
pub struct DiskEventLog {
    shared: Arc<Shared>,
    path: PathBuf,
    entries: AtomicU64,
    max_batch: usize,
    flush_thread: Option<JoinHandle<()>>,
}

impl DiskEventLog {
    /// Open `<dir>/events.csv` for appending with default group commit.
    pub fn new(dir: &Path) -> Result<Self> {
        Self::with_config(dir, &EventLogConfig::default())
    }

    pub fn with_config(dir: &Path, config: &EventLogConfig) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(EVENTS_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let existing = file.metadata()?.len();

        let shared = Arc::new(Shared {
            file: Mutex::new(BufWriter::with_capacity(64 * 1024, file)),
            pending: Mutex::new(Vec::new()),
            signal: Condvar::new(),
            shutdown: AtomicBool::new(false),
            bytes: AtomicU64::new(existing),
        });

        let interval = Duration::from_millis(config.group_commit_ms.max(1));
        let flush_thread = Self::start_flush_thread(Arc::clone(&shared), interval);
        debug!(path = %path.display(), existing_bytes = existing, "opened event log");

        Ok(Self {
            shared,
            path,
            entries: AtomicU64::new(0),
            max_batch: config.max_batch.max(1),
            flush_thread: Some(flush_thread),
        })
    }

    fn start_flush_thread(shared: Arc<Shared>, interval: Duration) -> JoinHandle<()> {
        thread::spawn(move || loop {
            {
                let mut pending = shared.pending.lock();
                if pending.is_empty() && !shared.shutdown.load(Ordering::Acquire) {
                    shared.signal.wait_for(&mut pending, interval);
                }
            }
            if let Err(e) = shared.flush_pending() {
                warn!(error = %e, "event log flush failed");
            }
            if shared.shutdown.load(Ordering::Acquire) {
                // drain whatever raced in before shutdown was observed
                if let Err(e) = shared.flush_pending() {
                    warn!(error = %e, "final event log flush failed");
                }
                break;
            }
        })
    }

    fn push(&self, event: Event) -> Result<()> {
        let mut pending = self.shared.pending.lock();
        pending.push(event);
        if pending.len() >= self.max_batch {
            self.shared.signal.notify_one();
        }
        self.entries.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Full path of the CSV file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes on disk, including what the file held when opened.
    pub fn size_bytes(&self) -> u64 {
        self.shared.bytes.load(Ordering::Relaxed)
    }
}

impl Drop for DiskEventLog {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.signal.notify_all();
        if let Some(handle) = self.flush_thread.take() {
            let _ = handle.join();
        }
    }
}

impl EventLog for DiskEventLog {
    fn append(&self, user: &str, item: &str, value: f32) -> Result<()> {
        self.push(Event { user: user.to_string(), item: item.to_string(), value: Some(value) })
    }

    fn append_removal(&self, user: &str, item: &str) -> Result<()> {
        self.push(Event { user: user.to_string(), item: item.to_string(), value: None })
    }

    fn sync(&self) -> Result<()> {
        self.shared.flush_pending()?;
        let file = self.shared.file.lock();
        file.get_ref().sync_all()
    }

    fn entries_written(&self) -> u64 {
        self.entries.load(Ordering::Relaxed)
    }

    fn is_enabled(&self) -> bool {
        true
    }
}
