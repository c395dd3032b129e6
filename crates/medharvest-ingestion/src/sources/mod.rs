//! Literature source adapters.
//!
//! Each adapter turns one upstream format into normalized [`RawRecord`]s.
//! Adapters fail independently; the orchestrator logs and skips a failed one.

pub mod arxiv;
pub mod medrxiv;
pub mod medrxiv_search;
pub mod partner;
pub mod preprint_feed;
pub mod pubmed;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use medharvest_common::SearchWindow;
use regex::Regex;

use crate::models::{RawRecord, SourceKind};

lazy_static! {
    static ref DOI: Regex = Regex::new(r"10\.\d{4,}/[^\s]+").unwrap();
}

/// What to look for, shared by every adapter in a run.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub keyword: String,
    pub window: SearchWindow,
    pub max_results: usize,
    /// Reference instant for lookback windows.
    pub now: DateTime<Utc>,
}

impl SearchQuery {
    pub fn new(keyword: impl Into<String>, window: SearchWindow, max_results: usize) -> Self {
        Self { keyword: keyword.into(), window, max_results, now: Utc::now() }
    }

    /// Case-insensitive keyword containment in title or summary.
    pub fn matches_keyword(&self, title: &str, summary: &str) -> bool {
        let kw = self.keyword.to_lowercase();
        title.to_lowercase().contains(&kw) || summary.to_lowercase().contains(&kw)
    }

    /// Window check for a parsed date; records without one are kept.
    pub fn admits(&self, published: Option<DateTime<Utc>>) -> bool {
        published.map_or(true, |p| self.window.admits(p, self.now))
    }

    /// Per-request result cap used by paged APIs.
    pub fn page_size(&self) -> usize {
        self.max_results.min(100)
    }
}

/// Common interface for all literature sources.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Fetch normalized records matching `query`.
    async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<RawRecord>>;
}

/// First DOI-looking substring of `text`.
pub fn extract_doi(text: &str) -> Option<String> {
    DOI.find(text).map(|m| m.as_str().to_string())
}

/// Parse the date formats the feeds use: RFC 3339, RFC 2822, bare
/// `YYYY-MM-DD` and `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// `published_at` text: ISO date-time when parsed, else the raw value.
pub fn iso_or_raw(parsed: Option<DateTime<Utc>>, raw: &str) -> String {
    match parsed {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
        None => raw.trim().to_string(),
    }
}
