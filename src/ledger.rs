//! Append-only ledgers for skipped and failed article IDs.
//!
//! Each non-success outcome is recorded as one CSV row `{id, url, reason}`
//! the moment it happens. Every [`Ledger::append`] call opens the file in
//! append mode, writes one row, and flushes before returning, so a row
//! survives a process crash at any point after the call returns. Rows are
//! never rewritten or deduplicated within a run.

use crate::models::ArticleId;
use std::error::Error;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One durable append-only CSV file.
///
/// Two independent ledgers are kept per run: one for skipped IDs, one for
/// failed IDs.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first if the file does not exist
    /// yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or written. Callers
    /// treat this as fatal: an unwritable ledger means losing the account of
    /// non-success IDs.
    pub fn append(&self, id: ArticleId, url: &str, reason: &str) -> Result<(), Box<dyn Error>> {
        let write_header = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if write_header {
            writer.write_record(["id", "url", "reason"])?;
        }
        writer.write_record([id.to_string().as_str(), url, reason])?;
        writer.flush()?;
        debug!(path = %self.path.display(), id, reason, "ledger row appended");
        Ok(())
    }
}
