//! Deduplication across sources.
//!
//! Records are stable-sorted by source priority, then walked once:
//! Stage 1: identifier exact match
//! Stage 2: URL exact match
//! Stage 3: fuzzy title match against already-accepted records
//!
//! The earliest record in priority order survives; records are never mutated.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::models::RawRecord;

/// Titles strictly more similar than this are the same article.
pub const TITLE_SIMILARITY_THRESHOLD: f64 = 0.90;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\w\s]").unwrap();
}

/// Result of a deduplication check.
#[derive(Debug, Clone, PartialEq)]
pub enum DedupResult {
    /// Record is new, keep it.
    New,
    /// Identifier already seen.
    DuplicateId(String),
    /// Landing URL already seen.
    DuplicateUrl(String),
    /// Title is a near match of an accepted record.
    ProbableDuplicate { similarity: f64 },
}

impl DedupResult {
    pub fn is_new(&self) -> bool {
        matches!(self, DedupResult::New)
    }
}

/// Lowercase, drop punctuation, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    NON_WORD
        .replace_all(&title.to_lowercase(), "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Edit-distance similarity of two normalized titles, in `[0, 1]`.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Single-pass duplicate tracker. Feed records in priority order.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen_ids: HashSet<String>,
    seen_urls: HashSet<String>,
    accepted_titles: Vec<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `record`, registering its identifier and URL as seen, and
    /// its title as accepted when it turns out to be new.
    pub fn check(&mut self, record: &RawRecord) -> DedupResult {
        if !record.identifier.is_empty() && !self.seen_ids.insert(record.identifier.clone()) {
            return DedupResult::DuplicateId(record.identifier.clone());
        }

        if !record.url.is_empty() && !self.seen_urls.insert(record.url.clone()) {
            return DedupResult::DuplicateUrl(record.url.clone());
        }

        let normalized = normalize_title(&record.title);
        if !normalized.is_empty() {
            for existing in &self.accepted_titles {
                let similarity = title_similarity(&normalized, existing);
                if similarity > TITLE_SIMILARITY_THRESHOLD {
                    return DedupResult::ProbableDuplicate { similarity };
                }
            }
        }

        self.accepted_titles.push(normalized);
        DedupResult::New
    }
}

/// Merge records from every source into a unique set.
pub fn deduplicate(mut records: Vec<RawRecord>) -> Vec<RawRecord> {
    records.sort_by_key(|r| r.source.priority());

    let mut dedup = Deduplicator::new();
    let before = records.len();
    let unique: Vec<RawRecord> = records
        .into_iter()
        .filter(|r| match dedup.check(r) {
            DedupResult::New => true,
            dup => {
                debug!(id = %r.identifier, source = %r.source, ?dup, "Dropping duplicate");
                false
            }
        })
        .collect();

    debug!(before, after = unique.len(), "Deduplication complete");
    unique
}
