//! Batch artifact writers.
//!
//! A flushed batch becomes exactly one local artifact whose file name embeds
//! the ID range it covers, so artifacts from different batches and different
//! runs never collide:
//!
//! ```text
//! output_dir/
//! ├── tfc_articles_4889_to_4938.csv
//! ├── tfc_articles_4939_to_4988.csv
//! └── ...
//! ```
//!
//! # Submodules
//!
//! - [`tabular`]: CSV artifact, one row per record
//! - [`jsonl`]: line-delimited JSON artifact, one object per record
//!
//! The local artifact is the source of truth; publishing it anywhere else is
//! the caller's concern and strictly follows a successful local write.

pub mod jsonl;
pub mod tabular;

use crate::models::{ArticleId, Record};
use clap::ValueEnum;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Which artifact format a flushed batch is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Tabular CSV, columns `url,title,date,content`.
    Csv,
    /// Line-delimited JSON, one record object per line.
    Jsonl,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Jsonl => "jsonl",
        }
    }
}

/// File name for a batch covering `[first, last]`.
pub fn batch_file_name(format: OutputFormat, first: ArticleId, last: ArticleId) -> String {
    format!("tfc_articles_{first}_to_{last}.{}", format.extension())
}

/// Serialize one batch to a local artifact and return its path.
///
/// Creates `dir` if needed. The write is one atomic hand-off from the
/// caller's point of view: on `Ok` the full batch is on local durable
/// storage under the returned path.
///
/// # Errors
///
/// Returns an error if the directory cannot be created, a record fails to
/// serialize, or the file cannot be written. Callers treat this as fatal —
/// losing a batch silently is the one thing the harvester must never do.
pub async fn write_batch(
    format: OutputFormat,
    dir: &Path,
    first: ArticleId,
    last: ArticleId,
    records: &[Record],
) -> Result<PathBuf, Box<dyn Error>> {
    fs::create_dir_all(dir).await?;
    let path = dir.join(batch_file_name(format, first, last));

    let bytes = match format {
        OutputFormat::Csv => tabular::serialize(records)?,
        OutputFormat::Jsonl => jsonl::serialize(records)?,
    };
    fs::write(&path, bytes).await?;

    info!(path = %path.display(), records = records.len(), "wrote batch artifact");
    Ok(path)
}
