//! Tiered extraction engine.
//!
//! Remote tiers are tried in configured order (primary, then secondary);
//! each retries only inside its own HTTP layer. The first tier that returns
//! a usable JSON object wins. When none does, the rule table in
//! [`heuristics`] runs and the result is flagged for manual review.

pub mod heuristics;
pub mod prompt;

use std::sync::Arc;

use medharvest_common::harvest_config::DEFAULT_OUTPUT_LANGUAGE;
use medharvest_llm::{parse_json_object, LlmBackend};
use tracing::{debug, info, warn};

use crate::models::ExtractionResult;

/// Outcome of extracting one abstract.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub result: ExtractionResult,
    pub needs_review: bool,
    /// The remote reply, kept when it only parsed through lenient recovery.
    pub raw_output: Option<String>,
    /// Tier that produced the result ("heuristic" for the rule table,
    /// "skipped" when the abstract was too short to try).
    pub tier: String,
}

impl Extraction {
    /// All-empty result for abstracts too short to send anywhere.
    pub fn skipped() -> Self {
        Self {
            result: ExtractionResult::default(),
            needs_review: true,
            raw_output: None,
            tier: "skipped".to_string(),
        }
    }
}

pub struct ExtractionEngine {
    tiers: Vec<Arc<dyn LlmBackend>>,
    /// Language the remote tiers write `what_done` and `ai_role` in.
    language: String,
}

impl ExtractionEngine {
    pub fn new(tiers: Vec<Arc<dyn LlmBackend>>) -> Self {
        Self { tiers, language: DEFAULT_OUTPUT_LANGUAGE.to_string() }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Heuristic-only engine.
    pub fn heuristic_only() -> Self {
        Self::new(Vec::new())
    }

    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    /// Extract the five fields from `abstract_text`. Never fails.
    pub async fn extract(&self, abstract_text: &str) -> Extraction {
        for tier in &self.tiers {
            match self.try_tier(tier.as_ref(), abstract_text).await {
                Some(extraction) => {
                    info!(tier = tier.name(), "Extracted with remote tier");
                    return extraction;
                }
                None => debug!(tier = tier.name(), "Falling through to next tier"),
            }
        }

        debug!("Using heuristic extraction");
        Extraction {
            result: heuristics::extract(abstract_text),
            needs_review: true,
            raw_output: None,
            tier: "heuristic".to_string(),
        }
    }

    async fn try_tier(&self, tier: &dyn LlmBackend, abstract_text: &str) -> Option<Extraction> {
        let resp = match tier.complete(prompt::build_request(abstract_text, &self.language)).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(tier = tier.name(), error = %e, "Remote extraction failed");
                return None;
            }
        };

        let Some((obj, recovery)) = parse_json_object(&resp.content) else {
            warn!(tier = tier.name(), "Reply contained no JSON object");
            return None;
        };

        if !ExtractionResult::FIELDS.iter().any(|f| obj.contains_key(*f)) {
            warn!(tier = tier.name(), "Reply JSON has none of the expected fields");
            return None;
        }

        Some(Extraction {
            result: ExtractionResult::from_object(&obj),
            needs_review: false,
            raw_output: recovery.is_fallback().then(|| resp.content.clone()),
            tier: tier.name().to_string(),
        })
    }
}
