//! Page fetching with a bounded retry budget.
//!
//! This module wraps a transport behind the [`Transport`] trait and layers a
//! fixed-delay retry policy on top of it, mirroring the taxonomy the rest of
//! the harvester works with:
//!
//! - HTTP 404 short-circuits immediately as [`FetchResult::NotFound`] — a
//!   missing page is not going to appear on immediate retry.
//! - Any other non-200 status is retried up to the attempt budget; the last
//!   attempt's status is returned as [`FetchResult::HttpError`].
//! - Transport-level errors (timeout, connection failure) are retried
//!   identically and end as [`FetchResult::TransportError`].
//!
//! # Architecture
//!
//! The module uses a trait-based design for testability:
//! - [`Transport`]: one raw HTTP GET, status plus body
//! - [`ReqwestTransport`]: the production transport with a fixed browser-like
//!   header set and a bounded per-attempt timeout
//! - [`Fetcher`]: applies the retry budget and inter-attempt delay to any
//!   transport, sleeping through an injected [`Sleep`] so retry behaviour can
//!   be tested without wall-clock waits
//! - [`FetchArticle`]: the capability the harvest loop consumes

use crate::models::FetchResult;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};
use std::error::Error;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Client identity presented on every request. A fixed set is enough to get
/// past trivial bot-blocking; no per-request randomization.
const FETCH_USER_AGENT: &str = "Mozilla/5.0";
const FETCH_ACCEPT_LANGUAGE: &str = "zh-TW,zh;q=0.9";

/// A raw HTTP response: status code and decoded body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub status: u16,
    /// The response body as text.
    pub body: String,
}

/// One blocking-style HTTP GET. Errors are transport-level only; any status
/// code at all is a successful `get`.
pub trait Transport {
    async fn get(&self, url: &str) -> Result<HttpResponse, Box<dyn Error>>;
}

impl<T: Transport> Transport for &T {
    async fn get(&self, url: &str) -> Result<HttpResponse, Box<dyn Error>> {
        (**self).get(url).await
    }
}

/// Time source for inter-attempt delays.
///
/// Injected so tests can observe requested delays instead of serving them.
pub trait Sleep {
    async fn sleep(&self, duration: Duration);
}

/// Production [`Sleep`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleep;

impl Sleep for TokioSleep {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Production [`Transport`] backed by a shared [`reqwest::Client`].
///
/// The client carries a constant `User-Agent` and `Accept-Language` header
/// pair and a per-attempt timeout; connection reuse and TLS are reqwest's
/// concern.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build the transport with the given per-attempt timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be constructed
    /// (e.g., TLS backend initialization failure).
    pub fn new(timeout: Duration) -> Result<Self, Box<dyn Error>> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(FETCH_USER_AGENT));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static(FETCH_ACCEPT_LANGUAGE),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, Box<dyn Error>> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

/// The capability the harvest loop consumes: fetch one URL to a final
/// [`FetchResult`], retry budget already applied.
pub trait FetchArticle {
    async fn fetch(&self, url: &str) -> FetchResult;
}

/// Retry wrapper around any [`Transport`].
///
/// Retries transport errors and non-200/non-404 statuses up to `attempts`
/// times with a fixed delay between attempts. A 404 returns immediately.
///
/// # Example
///
/// ```ignore
/// let transport = ReqwestTransport::new(Duration::from_secs(10))?;
/// let fetcher = Fetcher::new(transport, TokioSleep, 3, Duration::from_secs(3));
/// let result = fetcher.fetch("https://tfc-taiwan.org.tw/articles/4889").await;
/// ```
#[derive(Debug)]
pub struct Fetcher<T, S> {
    transport: T,
    sleeper: S,
    /// Total attempt budget (`R`), not additional retries.
    attempts: u32,
    /// Fixed delay between attempts.
    retry_delay: Duration,
}

impl<T, S> Fetcher<T, S>
where
    T: Transport,
    S: Sleep,
{
    /// Create a new fetcher.
    ///
    /// # Arguments
    ///
    /// * `transport` - The underlying HTTP transport
    /// * `sleeper` - Timer used for inter-attempt delays
    /// * `attempts` - Total attempt budget per item (3 recommended)
    /// * `retry_delay` - Fixed delay between attempts (3 seconds recommended)
    pub fn new(transport: T, sleeper: S, attempts: u32, retry_delay: Duration) -> Self {
        Self {
            transport,
            sleeper,
            attempts: attempts.max(1),
            retry_delay,
        }
    }
}

impl<T, S> FetchArticle for Fetcher<T, S>
where
    T: Transport,
    S: Sleep,
{
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> FetchResult {
        let mut last = FetchResult::TransportError("no attempt made".to_string());

        for attempt in 1..=self.attempts {
            match self.transport.get(url).await {
                Ok(response) if response.status == 404 => {
                    debug!(attempt, "page does not exist (404); not retrying");
                    return FetchResult::NotFound;
                }
                Ok(response) if response.status == 200 => {
                    debug!(attempt, bytes = response.body.len(), "fetched page");
                    return FetchResult::Ok(response.body);
                }
                Ok(response) => {
                    warn!(
                        attempt,
                        max = self.attempts,
                        status = response.status,
                        "unexpected status"
                    );
                    last = FetchResult::HttpError(response.status);
                }
                Err(e) => {
                    warn!(attempt, max = self.attempts, error = %e, "transport error");
                    last = FetchResult::TransportError(e.to_string());
                }
            }

            if attempt < self.attempts {
                self.sleeper.sleep(self.retry_delay).await;
            }
        }

        warn!(attempts = self.attempts, ?last, "exhausted fetch attempts");
        last
    }
}
