//! Bulk ingest of `user,item[,value]` records.
//!
//! - no value: preference of 1.0
//! - empty value: removal
//! - anything else must parse as a number
//!
//! This is the format the disk event log writes, so an event log can be
//! replayed straight into an engine.

use crate::engine::ServingEngine;
use crate::error::{ServingError, ServingResult};
use std::io::Read;
use std::time::Instant;
use tracing::info;

/// One parsed ingest record.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestRecord {
    Set { user: String, item: String, value: f32 },
    Remove { user: String, item: String },
}

impl IngestRecord {
    /// Parse one CSV record. `line` is for error messages.
    pub fn from_fields(record: &csv::StringRecord, line: u64) -> ServingResult<Self> {
        let (Some(user), Some(item)) = (record.get(0), record.get(1)) else {
            return Err(ServingError::invalid_argument(format!(
                "line {}: expected user,item[,value] but got {} field(s)",
                line,
                record.len()
            )));
        };
        let (user, item) = (user.to_string(), item.to_string());
        match record.get(2).map(str::trim) {
            None => Ok(IngestRecord::Set { user, item, value: 1.0 }),
            Some("") => Ok(IngestRecord::Remove { user, item }),
            Some(token) => match token.parse::<f32>() {
                Ok(value) if value.is_finite() => Ok(IngestRecord::Set { user, item, value }),
                _ => Err(ServingError::invalid_argument(format!("line {}: bad value {:?}", line, token))),
            },
        }
    }
}

impl ServingEngine {
    /// Apply every record from `reader` in order. Returns the number applied.
    /// Stops at the first malformed record; earlier records stay applied.
    pub fn ingest<R: Read>(&self, reader: R) -> ServingResult<usize> {
        let start = Instant::now();
        let mut records = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(b',')
            .from_reader(reader);

        let mut applied = 0usize;
        let mut removals = 0usize;
        for (i, record) in records.records().enumerate() {
            let line = i as u64 + 1;
            let record = record.map_err(|e| ServingError::invalid_argument(format!("line {}: {}", line, e)))?;
            match IngestRecord::from_fields(&record, line)? {
                IngestRecord::Set { user, item, value } => self.set_preference(&user, &item, value)?,
                IngestRecord::Remove { user, item } => {
                    self.remove_preference(&user, &item)?;
                    removals += 1;
                }
            }
            applied += 1;
        }

        info!(
            records = applied,
            removals,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ingest complete"
        );
        Ok(applied)
    }
}
