//! medharvest: AI-in-biomedicine abstract harvester.
//! Entry point for the command-line binary.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use medharvest_common::backoff::RetryPolicy;
use medharvest_common::HarvestConfig;
use medharvest_ingestion::cache::{self, JsonFileCache};
use medharvest_ingestion::extraction::ExtractionEngine;
use medharvest_ingestion::pipeline::{build_sources, Harvester};
use medharvest_ingestion::report::write_reports;
use medharvest_llm::{LlmBackend, OpenAiCompatibleBackend};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "medharvest", version, about = "Harvest and summarise AI-in-biomedicine abstracts")]
struct Cli {
    /// Path to the TOML config (default: $MEDHARVEST_CONFIG or medharvest.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, deduplicate, extract and write reports (default).
    Run(RunArgs),
    /// Delete the extraction cache file.
    ClearCache,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    #[arg(short, long)]
    keyword: Option<String>,

    /// Lookback window in days.
    #[arg(short, long)]
    days: Option<u32>,

    /// Only keep articles published in this year (overrides --days).
    #[arg(short, long)]
    year: Option<i32>,

    #[arg(short, long)]
    max_articles: Option<usize>,

    #[arg(long)]
    data_dir: Option<String>,

    #[arg(long)]
    cache_path: Option<String>,
}

impl RunArgs {
    fn apply(self, config: &mut HarvestConfig) {
        if let Some(keyword) = self.keyword {
            config.search.keyword = keyword;
        }
        if let Some(days) = self.days {
            config.search.days = Some(days);
        }
        if let Some(year) = self.year {
            config.search.year = Some(year);
        }
        if let Some(max) = self.max_articles {
            config.search.max_articles = max;
        }
        if let Some(dir) = self.data_dir {
            config.output.data_dir = dir;
        }
        if let Some(path) = self.cache_path {
            config.output.cache_path = path;
        }
    }
}

/// Remote extraction tiers in fallback order. Tiers without a key are
/// left out; the heuristic tier always follows.
fn build_extraction_tiers(config: &HarvestConfig, retry: &RetryPolicy) -> Vec<Arc<dyn LlmBackend>> {
    let mut tiers: Vec<Arc<dyn LlmBackend>> = Vec::new();

    for (slot, env_hint) in [
        (&config.extraction.primary, "GLM_API_KEY"),
        (&config.extraction.secondary, "OPENAI_API_KEY"),
    ] {
        let Some(tier) = slot else { continue };
        if !tier.is_enabled() {
            info!(tier = %tier.name, "No API key for extraction tier (set {env_hint}), skipping");
            continue;
        }
        match OpenAiCompatibleBackend::from_tier(tier, retry.clone()) {
            Ok(backend) => {
                info!(tier = %tier.name, model = %tier.model, "Extraction tier enabled");
                tiers.push(Arc::new(backend));
            }
            Err(e) => warn!(tier = %tier.name, error = %e, "Extraction tier misconfigured, skipping"),
        }
    }

    if tiers.is_empty() {
        warn!("No remote extraction tiers configured; every article will use heuristic extraction and be flagged for review");
    }
    tiers
}

async fn run(mut config: HarvestConfig, args: RunArgs) -> anyhow::Result<()> {
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let retry = config.retry.policy();
    let sources = build_sources(&config).context("building data sources")?;
    let engine = ExtractionEngine::new(build_extraction_tiers(&config, &retry))
        .with_language(config.extraction.output_language.clone());
    info!(
        sources = ?config.sources.enabled_sources(),
        tiers = ?engine.tier_names(),
        language = %config.extraction.output_language,
        "Harvester ready"
    );

    let cache = Arc::new(JsonFileCache::load(&config.output.cache_path).await);
    let data_dir = config.output.data_dir.clone();
    let prefix = config.output.file_prefix.clone();

    let harvester = Harvester::new(config, sources, Arc::new(engine), cache);
    let report = harvester.run().await?;

    let paths = write_reports(&report, &data_dir, &prefix).await.context("writing reports")?;
    info!(
        articles = report.statistics.total,
        review = report.statistics.needs_manual_review.count,
        failed_sources = report.errors.len(),
        markdown = %paths.markdown.display(),
        "Done"
    );
    Ok(())
}

async fn clear_cache(config: &HarvestConfig) -> anyhow::Result<()> {
    let path = &config.output.cache_path;
    if cache::clear(path).await? {
        info!(%path, "Extraction cache cleared");
    } else {
        info!(%path, "No extraction cache to clear");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("medharvest=debug,info")),
        )
        .init();

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run(config, args).await,
        Command::ClearCache => clear_cache(&config).await,
    }
}
