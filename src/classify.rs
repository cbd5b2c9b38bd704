//! Outcome classification for one article ID.
//!
//! A pure mapping from a final [`FetchResult`] to the [`Outcome`] the harvest
//! loop routes on. Classification has no hidden state: the same input always
//! yields the same outcome.

use crate::extract::Extract;
use crate::models::{ArticleId, FetchResult, Outcome};
use tracing::debug;

/// Reason recorded for a definitive not-found.
pub const REASON_NOT_FOUND: &str = "not found";

/// Classify the final fetch result of one article ID.
///
/// - `NotFound` is a skip, never a failure: a missing page says nothing
///   about transport health.
/// - `HttpError` and `TransportError` arrive here with the retry budget
///   already spent and become failures.
/// - A fetched page is handed to the extractor. A record with placeholder
///   fields is still a success; only an extraction error is a failure, and
///   it is not worth re-fetching.
pub fn classify<E: Extract>(
    id: ArticleId,
    url: &str,
    result: FetchResult,
    extractor: &E,
) -> Outcome {
    let outcome = match result {
        FetchResult::NotFound => Outcome::Skipped(REASON_NOT_FOUND.to_string()),
        FetchResult::HttpError(status) => Outcome::Failed(format!("status code {status}")),
        FetchResult::TransportError(message) => Outcome::Failed(message),
        FetchResult::Ok(html) => match extractor.extract(&html) {
            Ok(fields) => Outcome::Success(fields.into_record(url)),
            Err(e) => Outcome::Failed(format!("extraction error: {e}")),
        },
    };
    debug!(id, kind = outcome_kind(&outcome), "classified");
    outcome
}

fn outcome_kind(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Success(_) => "success",
        Outcome::Skipped(_) => "skipped",
        Outcome::Failed(_) => "failed",
    }
}
