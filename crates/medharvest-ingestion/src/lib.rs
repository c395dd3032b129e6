//! medharvest-ingestion: Abstract harvesting pipeline.
//! - Source adapters (partner API, medRxiv, bioRxiv, PubMed, arXiv)
//! - Corresponding-author resolution
//! - Deduplication (identifier, URL, fuzzy title)
//! - Tiered extraction (remote LLM tiers, heuristic fallback)
//! - Extraction cache, orchestration, reports

pub mod authors;
pub mod cache;
pub mod dedup;
pub mod extraction;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod sources;
