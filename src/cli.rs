//! Command-line interface definitions for the harvester.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Range and bucket options can also be provided via environment variables.

use crate::outputs::OutputFormat;
use clap::Parser;

/// Command-line arguments for the TFC article harvester.
///
/// # Examples
///
/// ```sh
/// # Harvest a range to ./harvest as CSV batches, no publishing
/// tfc_harvest --start-id 4889 --end-id 5200
///
/// # JSONL batches, published to a bucket
/// tfc_harvest --start-id 4889 --end-id 5200 --format jsonl --bucket fakenewsbda
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// First article ID to harvest (inclusive)
    #[arg(long, env = "TFC_START_ID")]
    pub start_id: u64,

    /// Last article ID to harvest (inclusive)
    #[arg(long, env = "TFC_END_ID")]
    pub end_id: u64,

    /// Article URL prefix; the article ID is appended to it
    #[arg(long, default_value = "https://tfc-taiwan.org.tw/articles/")]
    pub base_url: String,

    /// Successful records buffered before a batch is flushed
    #[arg(long, default_value_t = 50)]
    pub batch_size: usize,

    /// Fetch attempts per article before the item counts as failed
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Seconds between fetch attempts on the same article
    #[arg(long, default_value_t = 3)]
    pub retry_delay_secs: u64,

    /// Per-attempt request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// Consecutive failures tolerated before the long backoff pause
    #[arg(long, default_value_t = 10)]
    pub max_consecutive_failures: u32,

    /// Politeness delay between articles, in seconds
    #[arg(long, default_value_t = 12)]
    pub item_delay_secs: u64,

    /// Pause after the consecutive-failure limit is reached, in seconds
    #[arg(long, default_value_t = 3600)]
    pub failure_backoff_secs: u64,

    /// Pause after each flushed batch, in seconds
    #[arg(long, default_value_t = 1800)]
    pub post_flush_pause_secs: u64,

    /// Directory for batch artifacts and ledgers
    #[arg(short, long, default_value = "./harvest")]
    pub output_dir: String,

    /// S3 bucket to publish batch artifacts to (publishing disabled when unset)
    #[arg(long, env = "TFC_BUCKET")]
    pub bucket: Option<String>,

    /// Custom S3-compatible endpoint URL
    #[arg(long, env = "TFC_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// Batch artifact format
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,
}
