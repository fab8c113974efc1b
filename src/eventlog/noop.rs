use super::EventLog;
use std::io::Result;
use std::sync::atomic::{AtomicU64, Ordering};

/// Event log that records nothing.
#[derive(Default)]
pub struct NoOpEventLog {
    entries: AtomicU64,
}

impl NoOpEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventLog for NoOpEventLog {
    fn append(&self, _user: &str, _item: &str, _value: f32) -> Result<()> {
        self.entries.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn append_removal(&self, _user: &str, _item: &str) -> Result<()> {
        self.entries.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn entries_written(&self) -> u64 {
        self.entries.load(Ordering::Relaxed)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_counts() {
        let log = NoOpEventLog::new();
        log.append("u", "i", 2.0).unwrap();
        log.append_removal("u", "i").unwrap();
        log.sync().unwrap();
        assert_eq!(log.entries_written(), 2);
        assert!(!log.is_enabled());
    }
}
