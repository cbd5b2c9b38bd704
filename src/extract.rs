//! Field extraction from article HTML.
//!
//! Extraction is a cascade of lookup strategies per field, tried in order
//! until one produces text. The Taiwan FactCheck Center has shuffled its
//! markup over the years, so each field carries several candidates:
//!
//! | Field | Candidates, in order |
//! |-------|----------------------|
//! | title | `h1.page-title` |
//! | date | `time`, `span.date`, `div.entity-list-date` |
//! | content | paragraphs under `div.node__content`, `div.article-content`, `div.content`, then every paragraph in the document |
//!
//! A field whose whole cascade misses is filled with an explicit placeholder
//! so the record schema stays complete. Extraction never fails for
//! malformed-but-parseable HTML; `Html::parse_document` is lenient.

use crate::models::Record;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::error::Error;
use tracing::debug;

static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

/// Placeholder for a title the cascade could not locate.
pub const MISSING_TITLE: &str = "標題缺失";
/// Placeholder for a date the cascade could not locate.
pub const MISSING_DATE: &str = "日期缺失";
/// Placeholder for a body the cascade could not locate.
pub const MISSING_CONTENT: &str = "內容缺失";

/// Label prefixes stripped from the extracted date text.
const DATE_PREFIXES: [&str; 2] = ["發布日期／", "發布日期/"];

/// The three extracted fields, before a URL is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fields {
    pub title: String,
    pub date: String,
    pub content: String,
}

impl Fields {
    /// Attach the source URL, producing a complete [`Record`].
    pub fn into_record(self, url: &str) -> Record {
        Record {
            url: url.to_string(),
            title: self.title,
            date: self.date,
            content: self.content,
        }
    }
}

/// The extraction capability the classifier consumes.
///
/// Implementations must return all three fields, substituting placeholders
/// for anything they cannot locate. The `Result` exists for implementations
/// with genuinely fallible backends; [`SiteExtractor`] never errors.
pub trait Extract {
    fn extract(&self, html: &str) -> Result<Fields, Box<dyn Error>>;
}

/// One way of locating a field's text within a parsed document.
#[derive(Debug, Clone)]
enum FieldStrategy {
    /// The trimmed text of the first element matching the selector.
    FirstMatch(Selector),
    /// Non-empty paragraphs under the first element matching the selector,
    /// joined by newlines.
    ParagraphsUnder(Selector),
    /// Every non-empty paragraph in the document, joined by newlines.
    AllParagraphs,
}

impl FieldStrategy {
    fn first(css: &str) -> Self {
        // Selectors are static strings; a parse failure is a programming error.
        Self::FirstMatch(Selector::parse(css).unwrap())
    }

    fn paragraphs_under(css: &str) -> Self {
        Self::ParagraphsUnder(Selector::parse(css).unwrap())
    }

    /// Try to locate the field. `None` means this strategy found nothing and
    /// the cascade moves on.
    fn locate(&self, document: &Html) -> Option<String> {
        match self {
            Self::FirstMatch(selector) => {
                let element = document.select(selector).next()?;
                non_empty(element.text().collect::<String>().trim())
            }
            Self::ParagraphsUnder(selector) => {
                let element = document.select(selector).next()?;
                non_empty(&join_paragraphs(element))
            }
            Self::AllParagraphs => {
                let text = document
                    .select(&PARAGRAPH)
                    .map(|p| p.text().collect::<String>().trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                non_empty(&text)
            }
        }
    }
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn join_paragraphs(element: ElementRef<'_>) -> String {
    element
        .select(&PARAGRAPH)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extractor for Taiwan FactCheck Center article pages.
///
/// Holds the per-field strategy cascades; adding a new markup variant is a
/// matter of appending a strategy, not of growing branching logic.
#[derive(Debug, Clone)]
pub struct SiteExtractor {
    title: Vec<FieldStrategy>,
    date: Vec<FieldStrategy>,
    content: Vec<FieldStrategy>,
}

impl Default for SiteExtractor {
    fn default() -> Self {
        Self {
            title: vec![FieldStrategy::first("h1.page-title")],
            date: vec![
                FieldStrategy::first("time"),
                FieldStrategy::first("span.date"),
                FieldStrategy::first("div.entity-list-date"),
            ],
            content: vec![
                FieldStrategy::paragraphs_under("div.node__content"),
                FieldStrategy::paragraphs_under("div.article-content"),
                FieldStrategy::paragraphs_under("div.content"),
                FieldStrategy::AllParagraphs,
            ],
        }
    }
}

impl SiteExtractor {
    fn locate(strategies: &[FieldStrategy], document: &Html) -> Option<String> {
        strategies.iter().find_map(|s| s.locate(document))
    }
}

impl Extract for SiteExtractor {
    fn extract(&self, html: &str) -> Result<Fields, Box<dyn Error>> {
        let document = Html::parse_document(html);

        let title =
            Self::locate(&self.title, &document).unwrap_or_else(|| MISSING_TITLE.to_string());
        let date = Self::locate(&self.date, &document)
            .map(|raw| clean_date(&raw))
            .unwrap_or_else(|| MISSING_DATE.to_string());
        let content =
            Self::locate(&self.content, &document).unwrap_or_else(|| MISSING_CONTENT.to_string());

        debug!(
            title_found = title != MISSING_TITLE,
            date_found = date != MISSING_DATE,
            content_bytes = content.len(),
            "extracted fields"
        );

        Ok(Fields {
            title,
            date,
            content,
        })
    }
}

/// Strip the site's date label prefix and surrounding whitespace.
fn clean_date(raw: &str) -> String {
    let mut date = raw.trim();
    for prefix in DATE_PREFIXES {
        date = date.strip_prefix(prefix).unwrap_or(date);
    }
    date.trim().to_string()
}
