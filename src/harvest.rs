//! The harvest loop.
//!
//! Drives the whole process: iterates the ID range in increasing order, one
//! item fully fetched, classified, routed, and paced before the next begins.
//! The only cross-iteration state is the batch, the consecutive-failure
//! counter, and the current ID — all owned by [`Harvester`], never by module
//! globals.
//!
//! Per-item routing:
//! - `Success` goes into the batch and resets the failure counter.
//! - `Skipped` is appended to the skip ledger immediately.
//! - `Failed` is appended to the fail ledger immediately and bumps the
//!   counter; a run of failures reaching the limit trips a long circuit
//!   breaker pause.
//!
//! Reaching the batch threshold flushes the batch to one local artifact,
//! best-effort publishes it, and pauses before resuming. A trailing partial
//! batch is flushed on loop exit and on interrupt — a range end must never
//! silently drop buffered records. A single item's exhausted retries never
//! aborts the loop; only an unwritable local filesystem does.

use crate::classify::classify;
use crate::extract::Extract;
use crate::fetch::{FetchArticle, Sleep};
use crate::ledger::Ledger;
use crate::models::{ArticleId, Outcome, Record};
use crate::outputs::{self, OutputFormat};
use crate::publish::Publish;
use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// File name of the skip ledger, under the output directory.
pub const SKIP_LEDGER_FILE: &str = "skipped_articles.csv";
/// File name of the fail ledger, under the output directory.
pub const FAIL_LEDGER_FILE: &str = "failed_articles.csv";

/// Everything the loop needs to know, resolved once at startup.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// First article ID, inclusive.
    pub start_id: ArticleId,
    /// Last article ID, inclusive.
    pub end_id: ArticleId,
    /// URL prefix the article ID is appended to.
    pub base_url: String,
    /// Successful records buffered before a flush (`B`).
    pub batch_size: usize,
    /// Consecutive failures tolerated before the circuit breaker trips.
    pub max_consecutive_failures: u32,
    /// Politeness delay after every item, regardless of outcome.
    pub item_delay: Duration,
    /// Circuit breaker pause after a run of consecutive failures.
    pub failure_backoff: Duration,
    /// Pause after each threshold-triggered flush.
    pub post_flush_pause: Duration,
    /// Directory for batch artifacts and ledgers.
    pub output_dir: PathBuf,
    /// Batch artifact format.
    pub format: OutputFormat,
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub batches_flushed: usize,
}

/// The orchestrator. Exclusively owns the batch and the failure counter.
pub struct Harvester<F, S, E, P> {
    config: HarvestConfig,
    fetcher: F,
    sleeper: S,
    extractor: E,
    /// `None` disables publishing; the local artifact still gets written.
    publisher: Option<P>,
    skip_ledger: Ledger,
    fail_ledger: Ledger,
    /// Set externally (e.g., by the interrupt handler) to stop after the
    /// current item and flush what is buffered.
    shutdown: Arc<AtomicBool>,
    batch: Vec<(ArticleId, Record)>,
    consecutive_failures: u32,
    summary: HarvestSummary,
}

impl<F, S, E, P> Harvester<F, S, E, P>
where
    F: FetchArticle,
    S: Sleep,
    E: Extract,
    P: Publish,
{
    pub fn new(
        config: HarvestConfig,
        fetcher: F,
        sleeper: S,
        extractor: E,
        publisher: Option<P>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let skip_ledger = Ledger::new(config.output_dir.join(SKIP_LEDGER_FILE));
        let fail_ledger = Ledger::new(config.output_dir.join(FAIL_LEDGER_FILE));
        Self {
            config,
            fetcher,
            sleeper,
            extractor,
            publisher,
            skip_ledger,
            fail_ledger,
            shutdown,
            batch: Vec::new(),
            consecutive_failures: 0,
            summary: HarvestSummary::default(),
        }
    }

    fn article_url(&self, id: ArticleId) -> String {
        format!("{}{}", self.config.base_url, id)
    }

    /// Run the harvest over the configured range.
    ///
    /// # Errors
    ///
    /// Item-level fetch and extraction problems are absorbed into ledger
    /// rows and never surface here. Only unrecoverable conditions — a
    /// ledger or batch artifact that cannot be written — abort the run.
    #[instrument(level = "info", skip_all, fields(start_id = self.config.start_id, end_id = self.config.end_id))]
    pub async fn run(&mut self) -> Result<HarvestSummary, Box<dyn Error>> {
        for id in self.config.start_id..=self.config.end_id {
            if self.shutdown.load(Ordering::Relaxed) {
                warn!(next_id = id, "shutdown requested; stopping before next item");
                break;
            }

            let url = self.article_url(id);
            info!(id, %url, "harvesting article");
            let result = self.fetcher.fetch(&url).await;
            let outcome = classify(id, &url, result, &self.extractor);
            self.route(id, &url, outcome)?;

            if self.consecutive_failures >= self.config.max_consecutive_failures {
                warn!(
                    failures = self.consecutive_failures,
                    pause_secs = self.config.failure_backoff.as_secs(),
                    "consecutive failure limit reached; backing off"
                );
                self.sleeper.sleep(self.config.failure_backoff).await;
                self.consecutive_failures = 0;
            }

            if self.batch.len() >= self.config.batch_size {
                self.flush().await?;
                info!(
                    pause_secs = self.config.post_flush_pause.as_secs(),
                    "batch flushed; pausing before resuming"
                );
                self.sleeper.sleep(self.config.post_flush_pause).await;
            }

            // Politeness interval, applied after every outcome.
            self.sleeper.sleep(self.config.item_delay).await;
        }

        // Trailing partial batch: flushed so a range end or interrupt never
        // drops buffered records.
        self.flush().await?;

        info!(
            succeeded = self.summary.succeeded,
            skipped = self.summary.skipped,
            failed = self.summary.failed,
            batches = self.summary.batches_flushed,
            "harvest finished"
        );
        Ok(self.summary.clone())
    }

    fn route(&mut self, id: ArticleId, url: &str, outcome: Outcome) -> Result<(), Box<dyn Error>> {
        match outcome {
            Outcome::Success(record) => {
                info!(id, title = %record.title, "harvested");
                self.batch.push((id, record));
                self.consecutive_failures = 0;
                self.summary.succeeded += 1;
            }
            Outcome::Skipped(reason) => {
                info!(id, %reason, "skipped");
                self.skip_ledger.append(id, url, &reason)?;
                self.summary.skipped += 1;
            }
            Outcome::Failed(reason) => {
                warn!(id, %reason, "failed");
                self.fail_ledger.append(id, url, &reason)?;
                self.consecutive_failures += 1;
                self.summary.failed += 1;
            }
        }
        Ok(())
    }

    /// Write the buffered batch to one local artifact, then best-effort
    /// publish it. A no-op on an empty batch. The batch is cleared only
    /// after the local write succeeded; entries move to the sink exactly
    /// once.
    async fn flush(&mut self) -> Result<(), Box<dyn Error>> {
        let (Some((first, _)), Some((last, _))) = (self.batch.first(), self.batch.last()) else {
            return Ok(());
        };
        let (first, last) = (*first, *last);
        let records: Vec<Record> = self.batch.iter().map(|(_, r)| r.clone()).collect();

        let path = outputs::write_batch(
            self.config.format,
            &self.config.output_dir,
            first,
            last,
            &records,
        )
        .await?;

        if let Some(publisher) = &self.publisher {
            let remote_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| outputs::batch_file_name(self.config.format, first, last));
            if let Err(e) = publisher.upload(&path, &remote_name).await {
                // Best-effort: the local artifact is the source of truth.
                error!(error = %e, path = %path.display(), "publish failed; keeping local artifact");
            }
        }

        self.batch.clear();
        self.summary.batches_flushed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::SiteExtractor;
    use crate::fetch::{Fetcher, HttpResponse, Transport};
    use crate::models::FetchResult;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    const VALID_PAGE: &str = r#"<html><body>
        <h1 class="page-title">查核報告</h1>
        <time>發布日期／2024-01-05</time>
        <div class="node__content"><p>內文。</p></div>
    </body></html>"#;

    /// Fetch double returning a fixed final result per URL.
    struct OutcomeFetch {
        map: HashMap<String, FetchResult>,
    }

    impl FetchArticle for OutcomeFetch {
        async fn fetch(&self, url: &str) -> FetchResult {
            self.map
                .get(url)
                .cloned()
                .unwrap_or(FetchResult::NotFound)
        }
    }

    /// Transport double routing per-URL scripted responses, counting calls.
    struct RouteTransport {
        routes: Mutex<HashMap<String, VecDeque<Result<HttpResponse, String>>>>,
        calls: AtomicUsize,
    }

    impl RouteTransport {
        fn new(routes: HashMap<String, VecDeque<Result<HttpResponse, String>>>) -> Self {
            Self {
                routes: Mutex::new(routes),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Transport for RouteTransport {
        async fn get(&self, url: &str) -> Result<HttpResponse, Box<dyn Error>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut routes = self.routes.lock().unwrap();
            let queue = routes.get_mut(url).expect("unexpected url");
            match queue.pop_front().expect("script exhausted") {
                Ok(response) => Ok(response),
                Err(message) => Err(message.into()),
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSleep {
        naps: Arc<Mutex<Vec<Duration>>>,
    }

    impl RecordingSleep {
        fn naps(&self) -> Vec<Duration> {
            self.naps.lock().unwrap().clone()
        }
    }

    impl Sleep for RecordingSleep {
        async fn sleep(&self, duration: Duration) {
            self.naps.lock().unwrap().push(duration);
        }
    }

    #[derive(Default)]
    struct StubPublisher {
        fail: bool,
        uploads: Mutex<Vec<String>>,
    }

    impl Publish for &StubPublisher {
        async fn upload(&self, _local: &std::path::Path, remote: &str) -> Result<(), Box<dyn Error>> {
            if self.fail {
                return Err("bucket unavailable".into());
            }
            self.uploads.lock().unwrap().push(remote.to_string());
            Ok(())
        }
    }

    fn config(dir: &std::path::Path, start: ArticleId, end: ArticleId) -> HarvestConfig {
        HarvestConfig {
            start_id: start,
            end_id: end,
            base_url: "http://example.test/articles/".to_string(),
            batch_size: 50,
            max_consecutive_failures: 10,
            item_delay: Duration::from_secs(12),
            failure_backoff: Duration::from_secs(3600),
            post_flush_pause: Duration::from_secs(1800),
            output_dir: dir.to_path_buf(),
            format: OutputFormat::Csv,
        }
    }

    fn url(id: ArticleId) -> String {
        format!("http://example.test/articles/{id}")
    }

    fn no_publisher() -> Option<&'static StubPublisher> {
        None
    }

    fn not_shutdown() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[tokio::test]
    async fn failure_run_trips_circuit_breaker_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), 1, 6);
        cfg.max_consecutive_failures = 3;
        cfg.item_delay = Duration::from_secs(1);

        // Failed, Failed, Success, then Failed x3: one backoff, after the
        // run of failures reaches the limit.
        let mut map = HashMap::new();
        map.insert(url(1), FetchResult::HttpError(500));
        map.insert(url(2), FetchResult::HttpError(500));
        map.insert(url(3), FetchResult::Ok(VALID_PAGE.to_string()));
        map.insert(url(4), FetchResult::HttpError(500));
        map.insert(url(5), FetchResult::HttpError(500));
        map.insert(url(6), FetchResult::HttpError(500));

        let sleeper = RecordingSleep::default();
        let mut harvester = Harvester::new(
            cfg,
            OutcomeFetch { map },
            sleeper.clone(),
            SiteExtractor::default(),
            no_publisher(),
            not_shutdown(),
        );
        let summary = harvester.run().await.unwrap();

        assert_eq!(summary.failed, 5);
        assert_eq!(summary.succeeded, 1);
        let naps = sleeper.naps();
        let backoffs: Vec<&Duration> =
            naps.iter().filter(|d| **d == Duration::from_secs(3600)).collect();
        assert_eq!(backoffs.len(), 1);
        // The backoff happens in the sixth iteration, before its item delay.
        assert_eq!(
            naps,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(1),
                Duration::from_secs(1),
                Duration::from_secs(1),
                Duration::from_secs(1),
                Duration::from_secs(3600),
                Duration::from_secs(1),
            ]
        );
    }

    #[tokio::test]
    async fn skips_do_not_touch_the_failure_counter() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), 1, 4);
        cfg.max_consecutive_failures = 2;

        // Failed, Skipped, Failed: a not-found is not a transport health
        // signal, so the skip neither increments nor resets the counter.
        // The two failures straddling it reach the limit of 2 and trip the
        // breaker once.
        let mut map = HashMap::new();
        map.insert(url(1), FetchResult::HttpError(500));
        map.insert(url(2), FetchResult::NotFound);
        map.insert(url(3), FetchResult::HttpError(500));
        map.insert(url(4), FetchResult::Ok(VALID_PAGE.to_string()));

        let sleeper = RecordingSleep::default();
        let mut harvester = Harvester::new(
            cfg,
            OutcomeFetch { map },
            sleeper.clone(),
            SiteExtractor::default(),
            no_publisher(),
            not_shutdown(),
        );
        let summary = harvester.run().await.unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 2);
        let backoffs = sleeper
            .naps()
            .iter()
            .filter(|d| **d == Duration::from_secs(3600))
            .count();
        assert_eq!(backoffs, 1);
    }

    #[tokio::test]
    async fn batch_flushes_at_threshold_and_on_exit() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), 1, 3);
        cfg.batch_size = 2;

        let map = (1..=3)
            .map(|id| (url(id), FetchResult::Ok(VALID_PAGE.to_string())))
            .collect();

        let sleeper = RecordingSleep::default();
        let mut harvester = Harvester::new(
            cfg,
            OutcomeFetch { map },
            sleeper.clone(),
            SiteExtractor::default(),
            no_publisher(),
            not_shutdown(),
        );
        let summary = harvester.run().await.unwrap();

        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.batches_flushed, 2);

        let threshold_batch = dir.path().join("tfc_articles_1_to_2.csv");
        let trailing_batch = dir.path().join("tfc_articles_3_to_3.csv");
        assert!(threshold_batch.exists());
        assert!(trailing_batch.exists());

        let mut reader = csv::Reader::from_path(&threshold_batch).unwrap();
        assert_eq!(reader.records().count(), 2);
        let mut reader = csv::Reader::from_path(&trailing_batch).unwrap();
        assert_eq!(reader.records().count(), 1);

        // Exactly one post-flush pause: the trailing flush does not pause.
        let pauses = sleeper
            .naps()
            .iter()
            .filter(|d| **d == Duration::from_secs(1800))
            .count();
        assert_eq!(pauses, 1);
    }

    #[tokio::test]
    async fn end_to_end_range_with_retries_and_ledgers() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), 100, 104);
        cfg.batch_size = 3;

        let ok = |body: &str| {
            Ok(HttpResponse {
                status: 200,
                body: body.to_string(),
            })
        };
        let status = |code: u16| {
            Ok(HttpResponse {
                status: code,
                body: String::new(),
            })
        };
        let mut routes = HashMap::new();
        routes.insert(url(100), VecDeque::from([ok(VALID_PAGE)]));
        routes.insert(url(101), VecDeque::from([status(404)]));
        routes.insert(url(102), VecDeque::from([ok(VALID_PAGE)]));
        routes.insert(
            url(103),
            VecDeque::from([status(500), status(500), status(500)]),
        );
        routes.insert(url(104), VecDeque::from([ok(VALID_PAGE)]));
        let transport = RouteTransport::new(routes);

        let sleeper = RecordingSleep::default();
        let fetcher = Fetcher::new(&transport, sleeper.clone(), 3, Duration::from_secs(3));
        let mut harvester = Harvester::new(
            cfg,
            fetcher,
            sleeper.clone(),
            SiteExtractor::default(),
            no_publisher(),
            not_shutdown(),
        );
        let summary = harvester.run().await.unwrap();

        assert_eq!(
            summary,
            HarvestSummary {
                succeeded: 3,
                skipped: 1,
                failed: 1,
                batches_flushed: 1,
            }
        );
        // 1 + 1 + 1 + 3 + 1 transport invocations.
        assert_eq!(transport.calls.load(Ordering::SeqCst), 7);

        let batch = dir.path().join("tfc_articles_100_to_104.csv");
        let mut reader = csv::Reader::from_path(&batch).unwrap();
        let rows: Vec<Record> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].url, url(100));
        assert_eq!(rows[1].url, url(102));
        assert_eq!(rows[2].url, url(104));

        let skips = std::fs::read_to_string(dir.path().join(SKIP_LEDGER_FILE)).unwrap();
        assert!(skips.contains(&format!("101,{},not found", url(101))));
        let fails = std::fs::read_to_string(dir.path().join(FAIL_LEDGER_FILE)).unwrap();
        assert!(fails.contains(&format!("103,{},status code 500", url(103))));
    }

    #[tokio::test]
    async fn publish_failure_keeps_local_artifact_and_run_alive() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), 1, 2);
        cfg.batch_size = 1;

        let map = (1..=2)
            .map(|id| (url(id), FetchResult::Ok(VALID_PAGE.to_string())))
            .collect();
        let publisher = StubPublisher {
            fail: true,
            ..StubPublisher::default()
        };

        let mut harvester = Harvester::new(
            cfg,
            OutcomeFetch { map },
            RecordingSleep::default(),
            SiteExtractor::default(),
            Some(&publisher),
            not_shutdown(),
        );
        let summary = harvester.run().await.unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.batches_flushed, 2);
        assert!(dir.path().join("tfc_articles_1_to_1.csv").exists());
        assert!(dir.path().join("tfc_articles_2_to_2.csv").exists());
        // No upload was recorded and none was retried.
        assert!(publisher.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn published_artifact_uses_batch_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), 9, 9);
        cfg.batch_size = 1;
        cfg.format = OutputFormat::Jsonl;

        let map = HashMap::from([(url(9), FetchResult::Ok(VALID_PAGE.to_string()))]);
        let publisher = StubPublisher::default();

        let mut harvester = Harvester::new(
            cfg,
            OutcomeFetch { map },
            RecordingSleep::default(),
            SiteExtractor::default(),
            Some(&publisher),
            not_shutdown(),
        );
        harvester.run().await.unwrap();

        assert_eq!(
            *publisher.uploads.lock().unwrap(),
            vec!["tfc_articles_9_to_9.jsonl".to_string()]
        );
    }

    #[tokio::test]
    async fn shutdown_flag_stops_before_the_next_item() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), 1, 1000);

        let mut harvester = Harvester::new(
            cfg,
            OutcomeFetch { map: HashMap::new() },
            RecordingSleep::default(),
            SiteExtractor::default(),
            no_publisher(),
            Arc::new(AtomicBool::new(true)),
        );
        let summary = harvester.run().await.unwrap();

        assert_eq!(summary, HarvestSummary::default());
    }
}
