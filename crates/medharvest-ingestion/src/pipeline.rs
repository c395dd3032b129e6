//! End-to-end harvest run.
//!
//! Orchestrates one invocation:
//!   1. Query every enabled source concurrently
//!   2. Deduplicate (priority order, identifier / URL / fuzzy title)
//!   3. Apply the year filter and the article cap
//!   4. Extract each record: cache hit, short-abstract skip, or engine
//!   5. Flush the cache and compute run statistics
//!
//! A failed source is logged and recorded in the run's error list; only a
//! cache flush failure aborts the run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use medharvest_common::harvest_config::HarvestConfig;
use medharvest_common::HarvestError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cache::ExtractionCache;
use crate::dedup::deduplicate;
use crate::extraction::{Extraction, ExtractionEngine};
use crate::models::{ProcessedRecord, RawRecord, SourceKind};
use crate::sources::arxiv::ArxivClient;
use crate::sources::medrxiv::MedrxivSource;
use crate::sources::partner::PartnerApiClient;
use crate::sources::preprint_feed::PreprintFeedClient;
use crate::sources::pubmed::PubMedClient;
use crate::sources::{LiteratureSource, SearchQuery};

/// Abstracts shorter than this are reported as candidates for enrichment.
const ENRICHMENT_THRESHOLD: usize = 100;

// ── Run outcome ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub count: usize,
    pub article_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub total: usize,
    /// Records fetched across all sources, before deduplication.
    pub fetched: usize,
    pub source_breakdown: BTreeMap<SourceKind, usize>,
    pub needs_manual_review: ReviewSummary,
    /// Wall-clock seconds.
    pub execution_time: f64,
}

impl RunStatistics {
    pub fn compute(articles: &[ProcessedRecord], fetched: usize, elapsed: Duration) -> Self {
        let mut source_breakdown = BTreeMap::new();
        for a in articles {
            *source_breakdown.entry(a.record.source).or_insert(0) += 1;
        }
        let article_ids: Vec<String> = articles
            .iter()
            .filter(|a| a.needs_manual_review)
            .map(|a| a.record.identifier.clone())
            .collect();

        Self {
            total: articles.len(),
            fetched,
            source_breakdown,
            needs_manual_review: ReviewSummary { count: article_ids.len(), article_ids },
            execution_time: elapsed.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestReport {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub keyword: String,
    pub articles: Vec<ProcessedRecord>,
    pub statistics: RunStatistics,
    /// One line per source that failed entirely.
    pub errors: Vec<String>,
}

// ── Source wiring ─────────────────────────────────────────────────────────────

/// Instantiate every source enabled in `config`, in priority order.
pub fn build_sources(config: &HarvestConfig) -> Result<Vec<Arc<dyn LiteratureSource>>, HarvestError> {
    let retry = config.retry.policy();
    let sources = &config.sources;
    let mut built: Vec<Arc<dyn LiteratureSource>> = Vec::new();

    if sources.partner.is_enabled() {
        built.push(Arc::new(PartnerApiClient::new(&sources.partner, retry.clone())?));
    }
    if sources.medrxiv {
        built.push(Arc::new(MedrxivSource::new(retry.clone(), sources.medrxiv_search_top_up_below)?));
    }
    if sources.biorxiv {
        built.push(Arc::new(PreprintFeedClient::new_biorxiv(retry.clone())?));
    }
    if sources.pubmed {
        built.push(Arc::new(PubMedClient::new(sources.pubmed_api_key.clone(), retry.clone())?));
    }
    if sources.arxiv {
        built.push(Arc::new(ArxivClient::new(retry)?));
    }

    if built.is_empty() {
        return Err(HarvestError::Config("no usable data sources are enabled".to_string()));
    }
    Ok(built)
}

// ── Harvester ─────────────────────────────────────────────────────────────────

pub struct Harvester {
    config:  HarvestConfig,
    sources: Vec<Arc<dyn LiteratureSource>>,
    engine:  Arc<ExtractionEngine>,
    cache:   Arc<dyn ExtractionCache>,
}

impl Harvester {
    pub fn new(
        config: HarvestConfig,
        sources: Vec<Arc<dyn LiteratureSource>>,
        engine: Arc<ExtractionEngine>,
        cache: Arc<dyn ExtractionCache>,
    ) -> Self {
        Self { config, sources, engine, cache }
    }

    pub fn source_kinds(&self) -> Vec<SourceKind> {
        self.sources.iter().map(|s| s.kind()).collect()
    }

    /// Run one harvest. Fails only when the cache cannot be persisted.
    #[instrument(skip(self), fields(keyword = %self.config.search.keyword))]
    pub async fn run(&self) -> anyhow::Result<HarvestReport> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let search = &self.config.search;
        let window = search.window();
        let query = SearchQuery::new(search.keyword.clone(), window, search.max_articles);

        info!(%run_id, ?window, max = search.max_articles, sources = self.sources.len(), "Starting harvest");

        // ── 1. Fetch ──────────────────────────────────────────────────────────
        let query_ref = &query;
        let fetched = join_all(self.sources.iter().map(|source| async move {
            (source.kind(), source.search(query_ref).await)
        }))
        .await;

        let mut records: Vec<RawRecord> = Vec::new();
        let mut errors = Vec::new();
        for (kind, result) in fetched {
            match result {
                Ok(found) => {
                    info!(source = %kind, count = found.len(), "Source returned records");
                    records.extend(found);
                }
                Err(e) => {
                    warn!(source = %kind, error = %e, "Source failed, continuing without it");
                    errors.push(format!("{kind}: {e:#}"));
                }
            }
        }
        let fetched_count = records.len();

        // ── 2–3. Dedup, year filter, cap ──────────────────────────────────────
        let mut records = deduplicate(records);
        debug!(before = fetched_count, after = records.len(), "Deduplicated");

        if let Some(year) = window.year() {
            records.retain(|r| r.published_year() == Some(year));
        }
        records.truncate(search.max_articles);

        let thin = records
            .iter()
            .filter(|r| r.abstract_text.chars().count() < ENRICHMENT_THRESHOLD)
            .count();
        if thin > 0 {
            info!(count = thin, "Records with short or missing abstracts, no enrichment source configured");
        }

        // ── 4. Extract ────────────────────────────────────────────────────────
        let total = records.len();
        let concurrency = self.config.extraction.concurrency.max(1);
        let articles: Vec<ProcessedRecord> = stream::iter(records.into_iter().enumerate())
            .map(|(i, record)| self.process(record, i + 1 == total))
            .buffered(concurrency)
            .collect()
            .await;

        // ── 5. Persist and summarise ──────────────────────────────────────────
        self.cache.flush().await.context("failed to persist extraction cache")?;

        let statistics = RunStatistics::compute(&articles, fetched_count, started.elapsed());
        info!(
            total = statistics.total,
            fetched = statistics.fetched,
            review = statistics.needs_manual_review.count,
            failed_sources = errors.len(),
            secs = statistics.execution_time,
            "Harvest complete"
        );
        for (source, count) in &statistics.source_breakdown {
            info!(%source, count, "Source breakdown");
        }

        Ok(HarvestReport {
            run_id,
            timestamp: Utc::now(),
            keyword: search.keyword.clone(),
            articles,
            statistics,
            errors,
        })
    }

    async fn process(&self, record: RawRecord, is_last: bool) -> ProcessedRecord {
        if !record.identifier.is_empty() {
            if let Some(hit) = self.cache.get(&record.identifier).await {
                debug!(id = %record.identifier, "Cache hit");
                return hit;
            }
        }

        let min_chars = self.config.extraction.min_abstract_chars;
        let called_engine = record.abstract_text.trim().chars().count() >= min_chars;
        let extraction = if called_engine {
            self.engine.extract(&record.abstract_text).await
        } else {
            debug!(id = %record.identifier, "Abstract too short, skipping extraction");
            Extraction::skipped()
        };
        debug!(id = %record.identifier, tier = %extraction.tier, "Extracted");

        let processed = ProcessedRecord {
            record,
            extraction: extraction.result,
            needs_manual_review: extraction.needs_review,
            raw_llm_output: extraction.raw_output,
        };
        if !processed.record.identifier.is_empty() {
            self.cache.put(&processed.record.identifier, processed.clone()).await;
        }

        let delay = self.config.extraction.request_delay();
        if called_engine && !is_last && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        processed
    }
}
