//! # TFC Harvest
//!
//! A resilient sequential harvester for Taiwan FactCheck Center articles.
//! It walks a closed numeric ID range one article at a time, extracts
//! structured fields (title, date, body) from each page, and persists
//! results durably while tolerating missing pages, transient network
//! failures, and rate limits.
//!
//! ## Features
//!
//! - Bounded per-item retries with a fixed inter-attempt delay; 404s are
//!   never retried
//! - Consecutive-failure circuit breaker that pauses a sustained-outage run
//! - Periodic batch flush to CSV or JSONL artifacts named by ID range, with
//!   optional best-effort publishing to S3-compatible object storage
//! - Crash-safe append-only ledgers for every skipped and failed ID
//! - Fixed politeness pacing between articles
//!
//! ## Usage
//!
//! ```sh
//! tfc_harvest --start-id 4889 --end-id 5200 -o ./harvest
//! ```
//!
//! ## Architecture
//!
//! One strictly sequential loop: ID → fetch → extract → classify →
//! {batch | ledger} → sink. The orchestrator in [`harvest`] is the only
//! stateful coordinator; fetching, extraction, and publishing sit behind
//! traits so the loop is testable without a network.

use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};
use url::Url;

mod classify;
mod cli;
mod extract;
mod fetch;
mod harvest;
mod ledger;
mod models;
mod outputs;
mod publish;
mod utils;

use cli::Cli;
use extract::SiteExtractor;
use fetch::{Fetcher, ReqwestTransport, TokioSleep};
use harvest::{HarvestConfig, Harvester};
use publish::S3Publisher;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("tfc_harvest starting up");

    let args = Cli::parse();
    info!(
        start_id = args.start_id,
        end_id = args.end_id,
        batch_size = args.batch_size,
        format = ?args.format,
        "Parsed CLI arguments"
    );
    if args.end_id < args.start_id {
        warn!(
            start_id = args.start_id,
            end_id = args.end_id,
            "end_id is below start_id; the range is empty and nothing will be fetched"
        );
    }

    // Validate the base URL up front; a typo here would burn the whole range.
    if let Err(e) = Url::parse(&args.base_url) {
        error!(base_url = %args.base_url, error = %e, "base URL is not a valid URL");
        return Err(Box::new(e) as Box<dyn Error>);
    }
    let mut base_url = args.base_url.clone();
    if !base_url.ends_with('/') {
        base_url.push('/');
    }

    // Early check: batch artifacts and ledgers must be writable, or failing
    // items would be lost silently.
    let output_dir = PathBuf::from(&args.output_dir);
    if let Err(e) = ensure_writable_dir(&output_dir).await {
        error!(
            path = %output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let transport = ReqwestTransport::new(Duration::from_secs(args.request_timeout_secs))?;
    let fetcher = Fetcher::new(
        transport,
        TokioSleep,
        args.retries,
        Duration::from_secs(args.retry_delay_secs),
    );

    let publisher = match &args.bucket {
        Some(bucket) => {
            info!(%bucket, "Publishing enabled");
            Some(S3Publisher::new(bucket.clone(), args.s3_endpoint.clone()).await)
        }
        None => {
            info!("No bucket configured; batch artifacts stay local");
            None
        }
    };

    // On interrupt: finish the current item, flush the buffered batch, exit.
    // A second interrupt mid-fetch still loses at most the in-memory batch.
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current article and flushing");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let config = HarvestConfig {
        start_id: args.start_id,
        end_id: args.end_id,
        base_url,
        batch_size: args.batch_size.max(1),
        max_consecutive_failures: args.max_consecutive_failures,
        item_delay: Duration::from_secs(args.item_delay_secs),
        failure_backoff: Duration::from_secs(args.failure_backoff_secs),
        post_flush_pause: Duration::from_secs(args.post_flush_pause_secs),
        output_dir,
        format: args.format,
    };

    let mut harvester = Harvester::new(
        config,
        fetcher,
        TokioSleep,
        SiteExtractor::default(),
        publisher,
        shutdown,
    );
    let summary = harvester.run().await?;

    let elapsed = start_time.elapsed();
    info!(
        succeeded = summary.succeeded,
        skipped = summary.skipped,
        failed = summary.failed,
        batches = summary.batches_flushed,
        secs = elapsed.as_secs(),
        "Execution complete"
    );

    Ok(())
}
