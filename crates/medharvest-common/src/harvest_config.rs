//! Harvest run configuration.
//!
//! Loaded from TOML by the agent binary and then overridden from the
//! environment; every field has a serde default so an empty file is valid.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backoff::RetryPolicy;
use crate::error::HarvestError;

pub const DEFAULT_GLM_BASE_URL: &str = "https://open.bigmodel.cn/api/paas/v4";
pub const DEFAULT_GLM_MODEL: &str = "glm-4-flash";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_OUTPUT_LANGUAGE: &str = "English";
/// Placeholder the partner API ships with; treated as "not configured".
pub const PARTNER_PLACEHOLDER_URL: &str = "https://api.biomodel.example.com";

/// Complete harvest configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

// ── Search ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_keyword")]
    pub keyword: String,

    /// Lookback window in days. Ignored when `year` is set.
    #[serde(default = "default_days")]
    pub days: Option<u32>,

    /// Publication year filter; overrides and disables `days`.
    #[serde(default)]
    pub year: Option<i32>,

    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
}

fn default_keyword() -> String { "artificial intelligence".to_string() }
fn default_days() -> Option<u32> { Some(30) }
fn default_max_articles() -> usize { 200 }

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            keyword: default_keyword(),
            days: default_days(),
            year: None,
            max_articles: default_max_articles(),
        }
    }
}

impl SearchConfig {
    pub fn window(&self) -> SearchWindow {
        match (self.year, self.days) {
            (Some(year), _) => SearchWindow::Year(year),
            (None, Some(days)) if days > 0 => SearchWindow::LookbackDays(days),
            _ => SearchWindow::Unbounded,
        }
    }
}

/// Publication-date window of a run. Year and lookback are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchWindow {
    LookbackDays(u32),
    Year(i32),
    Unbounded,
}

impl SearchWindow {
    /// Earliest admitted publication instant for a lookback window.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            SearchWindow::LookbackDays(days) => Some(now - ChronoDuration::days(i64::from(*days))),
            _ => None,
        }
    }

    /// Whether a record published at `published` falls inside the window.
    pub fn admits(&self, published: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            SearchWindow::Year(year) => published.year() == *year,
            SearchWindow::LookbackDays(_) => self.cutoff(now).map_or(true, |c| published >= c),
            SearchWindow::Unbounded => true,
        }
    }

    pub fn year(&self) -> Option<i32> {
        match self {
            SearchWindow::Year(y) => Some(*y),
            _ => None,
        }
    }
}

// ── Sources ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Partner literature API ("biomodel"); enabled only with a key and a real URL.
    #[serde(default)]
    pub partner: PartnerApiConfig,

    #[serde(default = "default_true")]
    pub medrxiv: bool,

    #[serde(default = "default_true")]
    pub biorxiv: bool,

    #[serde(default = "default_true")]
    pub pubmed: bool,

    #[serde(default = "default_true")]
    pub arxiv: bool,

    /// Optional NCBI API key for higher rate limits.
    #[serde(default)]
    pub pubmed_api_key: Option<String>,

    /// Below this many feed records, medRxiv tops up from its search page.
    #[serde(default = "default_search_top_up")]
    pub medrxiv_search_top_up_below: usize,
}

fn default_true() -> bool { true }
fn default_search_top_up() -> usize { 50 }

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            partner: PartnerApiConfig::default(),
            medrxiv: true,
            biorxiv: true,
            pubmed: true,
            arxiv: true,
            pubmed_api_key: None,
            medrxiv_search_top_up_below: default_search_top_up(),
        }
    }
}

impl SourcesConfig {
    pub fn enabled_sources(&self) -> Vec<&'static str> {
        let mut sources = Vec::new();
        if self.partner.is_enabled() { sources.push("biomodel"); }
        if self.medrxiv { sources.push("medrxiv"); }
        if self.biorxiv { sources.push("biorxiv"); }
        if self.pubmed { sources.push("pubmed"); }
        if self.arxiv { sources.push("arxiv"); }
        sources
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartnerApiConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl PartnerApiConfig {
    pub fn has_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// A usable base URL: set, non-empty and not the shipped placeholder.
    pub fn usable_base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .filter(|u| !u.is_empty() && *u != PARTNER_PLACEHOLDER_URL)
    }

    pub fn is_enabled(&self) -> bool {
        self.has_key()
    }
}

// ── Extraction ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// First remote tier (GLM by default).
    #[serde(default = "default_primary")]
    pub primary: Option<RemoteTierConfig>,

    /// Second remote tier (OpenAI by default).
    #[serde(default = "default_secondary")]
    pub secondary: Option<RemoteTierConfig>,

    /// Abstracts shorter than this (trimmed, in characters) skip extraction.
    #[serde(default = "default_min_abstract_chars")]
    pub min_abstract_chars: usize,

    /// Courtesy delay after each extraction call.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Max extraction calls in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Language for the `what_done` and `ai_role` values of remote tiers.
    #[serde(default = "default_output_language")]
    pub output_language: String,
}

fn default_primary() -> Option<RemoteTierConfig> {
    Some(RemoteTierConfig::new("glm", DEFAULT_GLM_BASE_URL, DEFAULT_GLM_MODEL))
}
fn default_secondary() -> Option<RemoteTierConfig> {
    Some(RemoteTierConfig::new("openai", DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL))
}
fn default_min_abstract_chars() -> usize { 50 }
fn default_request_delay_ms() -> u64 { 500 }
fn default_concurrency() -> usize { 3 }
fn default_output_language() -> String { DEFAULT_OUTPUT_LANGUAGE.to_string() }

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            secondary: default_secondary(),
            min_abstract_chars: default_min_abstract_chars(),
            request_delay_ms: default_request_delay_ms(),
            concurrency: default_concurrency(),
            output_language: default_output_language(),
        }
    }
}

impl ExtractionConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// One OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTierConfig {
    pub name: String,
    pub base_url: String,
    pub model: String,

    /// Absent or blank disables the tier.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: f32,
}

fn default_timeout_secs() -> u64 { 30 }
fn default_max_tokens() -> u32 { 3000 }

impl RemoteTierConfig {
    pub fn new(name: &str, base_url: &str, model: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

// ── Retry ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 { 5 }
fn default_base_delay_ms() -> u64 { 1_000 }
fn default_max_delay_ms() -> u64 { 32_000 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

// ── Output ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_cache_path")]
    pub cache_path: String,

    /// Report files are named `{prefix}-{timestamp}.{ext}`.
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

fn default_data_dir() -> String { "data".to_string() }
fn default_cache_path() -> String { ".cache/processed.json".to_string() }
fn default_file_prefix() -> String { "medrxiv-ai".to_string() }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cache_path: default_cache_path(),
            file_prefix: default_file_prefix(),
        }
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

impl HarvestConfig {
    /// Reject configurations a run cannot proceed with.
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.sources.enabled_sources().is_empty() {
            return Err(HarvestError::Config("no data sources enabled".to_string()));
        }
        if self.search.max_articles == 0 {
            return Err(HarvestError::Config("search.max_articles must be > 0".to_string()));
        }
        if self.search.keyword.trim().is_empty() {
            return Err(HarvestError::Config("search.keyword must not be empty".to_string()));
        }
        if self.extraction.output_language.trim().is_empty() {
            return Err(HarvestError::Config("extraction.output_language must not be empty".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(HarvestError::Config("retry.max_attempts must be > 0".to_string()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(HarvestError::Config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Remote tiers in fallback order, skipping those without credentials.
    pub fn enabled_tiers(&self) -> Vec<&RemoteTierConfig> {
        [&self.extraction.primary, &self.extraction.secondary]
            .into_iter()
            .flatten()
            .filter(|t| t.is_enabled())
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_config_is_valid() {
        let config = HarvestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.search.keyword, "artificial intelligence");
        assert_eq!(config.search.window(), SearchWindow::LookbackDays(30));
        assert!(config.enabled_tiers().is_empty(), "no keys means no remote tiers");
    }

    #[test]
    fn test_year_overrides_days() {
        let search = SearchConfig { year: Some(2025), days: Some(7), ..Default::default() };
        assert_eq!(search.window(), SearchWindow::Year(2025));
    }

    #[test]
    fn test_zero_days_is_unbounded() {
        let search = SearchConfig { days: Some(0), ..Default::default() };
        assert_eq!(search.window(), SearchWindow::Unbounded);
    }

    #[test]
    fn test_window_admits() {
        let now = Utc.with_ymd_and_hms(2025, 6, 30, 0, 0, 0).unwrap();
        let recent = Utc.with_ymd_and_hms(2025, 6, 20, 0, 0, 0).unwrap();
        let old = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let lookback = SearchWindow::LookbackDays(30);
        assert!(lookback.admits(recent, now));
        assert!(!lookback.admits(old, now));

        let year = SearchWindow::Year(2024);
        assert!(year.admits(old, now));
        assert!(!year.admits(recent, now));

        assert!(SearchWindow::Unbounded.admits(old, now));
    }

    #[test]
    fn test_no_sources_is_fatal() {
        let mut config = HarvestConfig::default();
        config.sources.medrxiv = false;
        config.sources.biorxiv = false;
        config.sources.pubmed = false;
        config.sources.arxiv = false;
        assert!(matches!(config.validate(), Err(HarvestError::Config(_))));
    }

    #[test]
    fn test_bad_retry_bounds_rejected() {
        let mut config = HarvestConfig::default();
        config.retry.base_delay_ms = 10_000;
        config.retry.max_delay_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tiers_enabled_by_key_in_order() {
        let mut config = HarvestConfig::default();
        if let Some(s) = config.extraction.secondary.as_mut() {
            s.api_key = Some("sk-test".to_string());
        }
        let tiers = config.enabled_tiers();
        assert_eq!(tiers.len(), 1);
        assert_eq!(tiers[0].name, "openai");

        if let Some(p) = config.extraction.primary.as_mut() {
            p.api_key = Some("glm-key".to_string());
        }
        let names: Vec<_> = config.enabled_tiers().iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["glm", "openai"]);
    }

    #[test]
    fn test_blank_key_disables_tier() {
        let mut tier = RemoteTierConfig::new("glm", DEFAULT_GLM_BASE_URL, DEFAULT_GLM_MODEL);
        tier.api_key = Some("   ".to_string());
        assert!(!tier.is_enabled());
    }

    #[test]
    fn test_partner_placeholder_url_is_unusable() {
        let partner = PartnerApiConfig {
            base_url: Some(PARTNER_PLACEHOLDER_URL.to_string()),
            api_key: Some("key".to_string()),
        };
        assert!(partner.is_enabled());
        assert_eq!(partner.usable_base_url(), None);

        let partner = PartnerApiConfig {
            base_url: Some("https://api.partner.org/".to_string()),
            api_key: Some("key".to_string()),
        };
        assert_eq!(partner.usable_base_url(), Some("https://api.partner.org"));
    }

    #[test]
    fn test_toml_partial_uses_defaults() {
        let config: HarvestConfig = toml::from_str(
            r#"
            [search]
            keyword = "deep learning"
            year = 2025

            [retry]
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.search.keyword, "deep learning");
        assert_eq!(config.search.window(), SearchWindow::Year(2025));
        assert_eq!(config.search.max_articles, 200);
        assert_eq!(config.retry.policy().max_attempts, 3);
        assert_eq!(config.extraction.min_abstract_chars, 50);
        assert_eq!(config.extraction.output_language, DEFAULT_OUTPUT_LANGUAGE);
    }

    #[test]
    fn test_output_language_from_toml_and_blank_rejected() {
        let mut config: HarvestConfig = toml::from_str(
            r#"
            [extraction]
            output_language = "Chinese"
            "#,
        )
        .unwrap();
        assert_eq!(config.extraction.output_language, "Chinese");
        assert!(config.validate().is_ok());

        config.extraction.output_language = "  ".to_string();
        assert!(matches!(config.validate(), Err(HarvestError::Config(_))));
    }
}
