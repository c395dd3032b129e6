//! Data models for the harvest pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::authors;

/// Upper bound (in characters) for `what_done` and `ai_role`.
pub const CAP_LONG: usize = 2000;
/// Upper bound (in characters) for `models`, `data_sources` and `metrics`.
pub const CAP_SHORT: usize = 500;

// ── Source ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Biomodel,
    MedRxiv,
    BioRxiv,
    PubMed,
    Arxiv,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Biomodel => "biomodel",
            SourceKind::MedRxiv  => "medrxiv",
            SourceKind::BioRxiv  => "biorxiv",
            SourceKind::PubMed   => "pubmed",
            SourceKind::Arxiv    => "arxiv",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "biomodel" => Some(SourceKind::Biomodel),
            "medrxiv"  => Some(SourceKind::MedRxiv),
            "biorxiv"  => Some(SourceKind::BioRxiv),
            "pubmed"   => Some(SourceKind::PubMed),
            "arxiv"    => Some(SourceKind::Arxiv),
            _ => None,
        }
    }

    /// Dedup priority, lower wins: partner API, then medRxiv, then the rest tied.
    pub fn priority(&self) -> u8 {
        match self {
            SourceKind::Biomodel => 0,
            SourceKind::MedRxiv  => 1,
            _ => 2,
        }
    }

    /// Rule for the `corresponding_author` field of this source's records.
    pub fn lead_author(&self) -> authors::LeadAuthor {
        match self {
            SourceKind::Biomodel => authors::LeadAuthor::FirstFlagged,
            _ => authors::LeadAuthor::LastCorresponding,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Authors & affiliations ────────────────────────────────────────────────────

/// One author as delivered by a source: a bare name or a structured record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthorEntry {
    Plain(String),
    Structured {
        name: String,
        #[serde(default)]
        is_corresponding: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        affiliation_index: Option<usize>,
    },
}

impl AuthorEntry {
    pub fn plain(name: impl Into<String>) -> Self {
        AuthorEntry::Plain(name.into())
    }

    /// Decode an arbitrary JSON author value. Anything that is neither a
    /// string nor an object with a name is kept as its JSON text.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => AuthorEntry::Plain(s.clone()),
            Value::Object(obj) => {
                let name = obj
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| {
                        let first = obj.get("firstname").and_then(Value::as_str).unwrap_or("");
                        let last = obj.get("lastname").and_then(Value::as_str).unwrap_or("");
                        format!("{first} {last}").trim().to_string()
                    });
                let is_corresponding = ["is_corresponding", "corresponding", "corresponding_author"]
                    .iter()
                    .any(|k| obj.get(*k).and_then(Value::as_bool).unwrap_or(false));
                let affiliation_index = obj
                    .get("affiliation_index")
                    .and_then(Value::as_u64)
                    .map(|i| i as usize);
                AuthorEntry::Structured { name, is_corresponding, affiliation_index }
            }
            other => AuthorEntry::Plain(other.to_string()),
        }
    }

    /// Raw name, markers included.
    pub fn raw_name(&self) -> &str {
        match self {
            AuthorEntry::Plain(n) => n,
            AuthorEntry::Structured { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AffiliationEntry {
    Plain(String),
    Institution { name: String },
}

impl AffiliationEntry {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => AffiliationEntry::Plain(s.clone()),
            Value::Object(obj) => {
                let name = ["name", "institution"]
                    .iter()
                    .filter_map(|k| obj.get(*k).and_then(Value::as_str))
                    .find(|s| !s.is_empty())
                    .unwrap_or("")
                    .to_string();
                AffiliationEntry::Institution { name }
            }
            other => AffiliationEntry::Plain(other.to_string()),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            AffiliationEntry::Plain(s) => s,
            AffiliationEntry::Institution { name } => name,
        }
    }
}

// ── RawRecord ─────────────────────────────────────────────────────────────────

/// One fetched article before extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// DOI when known, else a source-native ID or the landing URL.
    #[serde(rename = "id")]
    pub identifier: String,
    pub title: String,
    pub authors: Vec<AuthorEntry>,
    pub affiliations: Vec<AffiliationEntry>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// ISO-8601 date or date-time, or empty.
    pub published_at: String,
    pub url: String,
    pub source: SourceKind,
    pub corresponding_author: String,
    pub last_corresponding_author: String,
    pub last_corresponding_affiliation: String,
}

impl RawRecord {
    pub fn new(source: SourceKind) -> Self {
        Self {
            identifier: String::new(),
            title: String::new(),
            authors: Vec::new(),
            affiliations: Vec::new(),
            abstract_text: String::new(),
            published_at: String::new(),
            url: String::new(),
            source,
            corresponding_author: String::new(),
            last_corresponding_author: String::new(),
            last_corresponding_affiliation: String::new(),
        }
    }

    /// Adapter-side normalization: trims text fields, fills the identifier
    /// fallback chain (identifier, URL, `source:title`) and runs the resolver.
    /// Returns `None` for entries with no identifier, URL or title at all.
    pub fn normalize(mut self) -> Option<Self> {
        self.identifier = self.identifier.trim().to_string();
        self.title = collapse_whitespace(&self.title);
        self.url = self.url.trim().to_string();
        self.abstract_text = self.abstract_text.trim().to_string();
        self.published_at = self.published_at.trim().to_string();

        if self.identifier.is_empty() {
            self.identifier = if !self.url.is_empty() {
                self.url.clone()
            } else if !self.title.is_empty() {
                format!("{}:{}", self.source, self.title)
            } else {
                return None;
            };
        }

        let resolved = authors::resolve_with(&self.authors, &self.affiliations, self.source.lead_author());
        self.corresponding_author = resolved.corresponding_author;
        self.last_corresponding_author = resolved.last_corresponding_author;
        self.last_corresponding_affiliation = resolved.last_corresponding_affiliation;
        Some(self)
    }

    /// Four-digit year at the start of `published_at`, or the first one found.
    pub fn published_year(&self) -> Option<i32> {
        lazy_static::lazy_static! {
            static ref YEAR: regex::Regex = regex::Regex::new(r"\b(\d{4})\b").unwrap();
        }
        YEAR.captures(&self.published_at)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max` characters on a char boundary.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

// ── ExtractionResult ──────────────────────────────────────────────────────────

/// The five structured fields pulled from an abstract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub what_done: String,
    pub ai_role: String,
    pub models: String,
    pub data_sources: String,
    pub metrics: String,
}

impl ExtractionResult {
    pub const FIELDS: [&'static str; 5] = ["what_done", "ai_role", "models", "data_sources", "metrics"];

    /// Build from a parsed model reply. Missing keys and nulls become empty,
    /// other non-strings become their JSON text; every field is capped.
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        let field = |key: &str| match obj.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => other.to_string(),
        };
        Self {
            what_done: field("what_done"),
            ai_role: field("ai_role"),
            models: field("models"),
            data_sources: field("data_sources"),
            metrics: field("metrics"),
        }
        .capped()
    }

    pub fn capped(self) -> Self {
        Self {
            what_done: truncate_chars(&self.what_done, CAP_LONG),
            ai_role: truncate_chars(&self.ai_role, CAP_LONG),
            models: truncate_chars(&self.models, CAP_SHORT),
            data_sources: truncate_chars(&self.data_sources, CAP_SHORT),
            metrics: truncate_chars(&self.metrics, CAP_SHORT),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.what_done.is_empty()
            && self.ai_role.is_empty()
            && self.models.is_empty()
            && self.data_sources.is_empty()
            && self.metrics.is_empty()
    }
}

// ── ProcessedRecord ───────────────────────────────────────────────────────────

/// RawRecord + ExtractionResult + review flag, flattened into one JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    #[serde(flatten)]
    pub record: RawRecord,
    #[serde(flatten)]
    pub extraction: ExtractionResult,
    pub needs_manual_review: bool,
    /// Kept only when a remote reply needed lenient JSON recovery.
    #[serde(default)]
    pub raw_llm_output: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_priority_order() {
        assert!(SourceKind::Biomodel.priority() < SourceKind::MedRxiv.priority());
        assert!(SourceKind::MedRxiv.priority() < SourceKind::PubMed.priority());
        assert_eq!(SourceKind::PubMed.priority(), SourceKind::Arxiv.priority());
        assert_eq!(SourceKind::BioRxiv.priority(), SourceKind::Arxiv.priority());
    }

    #[test]
    fn test_source_kind_round_trip_names() {
        for s in [SourceKind::Biomodel, SourceKind::MedRxiv, SourceKind::BioRxiv, SourceKind::PubMed, SourceKind::Arxiv] {
            assert_eq!(SourceKind::parse(s.as_str()), Some(s));
            assert_eq!(serde_json::to_value(s).unwrap(), json!(s.as_str()));
        }
        assert_eq!(SourceKind::parse("scopus"), None);
    }

    #[test]
    fn test_author_from_value_shapes() {
        assert_eq!(AuthorEntry::from_value(&json!("Ada Lovelace")), AuthorEntry::plain("Ada Lovelace"));
        assert_eq!(
            AuthorEntry::from_value(&json!({"name": "B. Chen", "corresponding": true, "affiliation_index": 1})),
            AuthorEntry::Structured { name: "B. Chen".into(), is_corresponding: true, affiliation_index: Some(1) }
        );
        assert_eq!(
            AuthorEntry::from_value(&json!({"firstname": "Carla", "lastname": "Diaz"})).raw_name(),
            "Carla Diaz"
        );
        assert_eq!(AuthorEntry::from_value(&json!(42)), AuthorEntry::plain("42"));
    }

    #[test]
    fn test_affiliation_from_value_shapes() {
        assert_eq!(AffiliationEntry::from_value(&json!("MIT")).text(), "MIT");
        assert_eq!(AffiliationEntry::from_value(&json!({"institution": "ETH Zurich"})).text(), "ETH Zurich");
        assert_eq!(AffiliationEntry::from_value(&json!(null)).text(), "null");
    }

    #[test]
    fn test_normalize_identifier_falls_back_to_url() {
        let mut r = RawRecord::new(SourceKind::BioRxiv);
        r.url = " https://www.biorxiv.org/content/x ".into();
        r.title = "  A   title ".into();
        let r = r.normalize().unwrap();
        assert_eq!(r.identifier, "https://www.biorxiv.org/content/x");
        assert_eq!(r.title, "A title");
    }

    #[test]
    fn test_normalize_identifier_falls_back_to_title() {
        let mut r = RawRecord::new(SourceKind::MedRxiv);
        r.title = "Only a title".into();
        assert_eq!(r.normalize().unwrap().identifier, "medrxiv:Only a title");
    }

    #[test]
    fn test_normalize_drops_empty_entry() {
        assert!(RawRecord::new(SourceKind::Arxiv).normalize().is_none());
    }

    #[test]
    fn test_normalize_runs_resolver() {
        let mut r = RawRecord::new(SourceKind::PubMed);
        r.identifier = "10.1/abc".into();
        r.authors = vec![AuthorEntry::plain("A"), AuthorEntry::plain("B")];
        r.affiliations = vec![AffiliationEntry::Plain("Inst A".into()), AffiliationEntry::Plain("Inst B".into())];
        let r = r.normalize().unwrap();
        assert_eq!(r.last_corresponding_author, "B");
        assert_eq!(r.last_corresponding_affiliation, "Inst B");
    }

    #[test]
    fn test_published_year() {
        let mut r = RawRecord::new(SourceKind::PubMed);
        r.published_at = "2025-03-01T00:00:00".into();
        assert_eq!(r.published_year(), Some(2025));
        r.published_at = "2023-12-30 (revised 2024-01-04)".into();
        assert_eq!(r.published_year(), Some(2023));
        r.published_at = String::new();
        assert_eq!(r.published_year(), None);
    }

    #[test]
    fn test_extraction_from_object_coerces_and_caps() {
        let obj = json!({
            "what_done": "x".repeat(CAP_LONG + 50),
            "ai_role": null,
            "models": ["CNN", "LSTM"],
            "metrics": 0.95
        });
        let r = ExtractionResult::from_object(obj.as_object().unwrap());
        assert_eq!(r.what_done.chars().count(), CAP_LONG);
        assert_eq!(r.ai_role, "");
        assert_eq!(r.models, "[\"CNN\",\"LSTM\"]");
        assert_eq!(r.data_sources, "");
        assert_eq!(r.metrics, "0.95");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("αβγδ", 2), "αβ");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }

    #[test]
    fn test_processed_record_json_is_flat() {
        let mut r = RawRecord::new(SourceKind::MedRxiv);
        r.identifier = "10.1101/2025.01.01.1".into();
        let p = ProcessedRecord {
            record: r,
            extraction: ExtractionResult { models: "CNN".into(), ..Default::default() },
            needs_manual_review: false,
            raw_llm_output: None,
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["id"], "10.1101/2025.01.01.1");
        assert_eq!(v["source"], "medrxiv");
        assert_eq!(v["models"], "CNN");
        assert_eq!(v["abstract"], "");
        let back: ProcessedRecord = serde_json::from_value(v).unwrap();
        assert_eq!(back, p);
    }
}
