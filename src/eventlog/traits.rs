use std::io::Result;

/// Append-only preference event log.
///
/// Implementations:
/// - `NoOpEventLog`: counts entries, writes nothing
/// - `DiskEventLog`: CSV file with group commit
pub trait EventLog: Send + Sync {
    /// Record a preference `value` of `user` for `item`.
    fn append(&self, user: &str, item: &str, value: f32) -> Result<()>;

    /// Record the removal of a preference.
    fn append_removal(&self, user: &str, item: &str) -> Result<()>;

    /// Write out everything pending and fsync.
    fn sync(&self) -> Result<()>;

    /// Entries accepted so far.
    fn entries_written(&self) -> u64;

    fn is_enabled(&self) -> bool;
}
