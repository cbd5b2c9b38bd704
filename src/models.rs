//! Data models for harvested articles and per-item results.
//!
//! This module defines the core data structures used throughout the harvester:
//! - [`FetchResult`]: the classified result of fetching one page
//! - [`Record`]: the structured fields extracted from one article
//! - [`Outcome`]: the final disposition of one article ID
//!
//! A [`Record`] is always schema-complete: a field the extractor could not
//! locate is filled with an explicit placeholder rather than omitted, so
//! every batch artifact carries the same columns.

use serde::{Deserialize, Serialize};

/// Numeric identifier of a candidate article page.
///
/// The harvest domain is a closed range `[start_id, end_id]`, traversed in
/// increasing order with each ID visited exactly once per run.
pub type ArticleId = u64;

/// The result of fetching one page, after the retry budget has been applied.
///
/// An item's final result is the result of its last attempt, or
/// [`FetchResult::TransportError`] once all attempts are exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// HTTP 200 with the response body.
    Ok(String),
    /// HTTP 404. Definitive: the page does not exist and is not retried.
    NotFound,
    /// Any other HTTP status, carried from the last attempt.
    HttpError(u16),
    /// Timeout, connection error, or other transport-level failure.
    TransportError(String),
}

/// Structured fields extracted from one article page.
///
/// # Fields
///
/// * `url` - The URL the article was fetched from
/// * `title` - The article headline, or a placeholder when missing
/// * `date` - The publication date text, or a placeholder when missing
/// * `content` - The article body text, or a placeholder when missing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Record {
    /// The source URL of the article.
    pub url: String,
    /// The article headline.
    pub title: String,
    /// The publication date as displayed on the page.
    pub date: String,
    /// The article body text, paragraphs joined by newlines.
    pub content: String,
}

/// Final disposition of one article ID.
///
/// `Skipped` is reserved for a definitive not-found; anything
/// retryable-but-exhausted lands in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The page was fetched and extracted. Placeholder fields are still a
    /// success; only total absence of the page is not.
    Success(Record),
    /// The page definitively does not exist.
    Skipped(String),
    /// The retry budget was exhausted, or extraction itself failed.
    Failed(String),
}
