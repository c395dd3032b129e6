//! Configuration loading for medharvest.
//! Reads medharvest.toml from the current directory or the path in
//! MEDHARVEST_CONFIG, then applies environment overrides.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use medharvest_common::harvest_config::{
    RemoteTierConfig, DEFAULT_GLM_BASE_URL, DEFAULT_GLM_MODEL, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL,
};
use medharvest_common::HarvestConfig;
use tracing::{debug, info};

mod tests;

pub const DEFAULT_CONFIG_FILE: &str = "medharvest.toml";

/// `MEDHARVEST_CONFIG` if set, else `medharvest.toml`.
pub fn config_path() -> PathBuf {
    std::env::var("MEDHARVEST_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Parse a TOML file. A missing file yields defaults.
pub fn load_file(path: &Path) -> anyhow::Result<HarvestConfig> {
    if !path.exists() {
        info!(path = %path.display(), "No config file, using defaults");
        return Ok(HarvestConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config: HarvestConfig = toml::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    debug!(path = %path.display(), "Config file loaded");
    Ok(config)
}

/// File (or defaults) plus process environment.
pub fn load(path: Option<&Path>) -> anyhow::Result<HarvestConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    let mut config = load_file(&path)?;
    apply_env(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse::<T>().with_context(|| format!("{key}={value:?} is not a valid number"))
}

fn tier_mut<'a>(slot: &'a mut Option<RemoteTierConfig>, name: &str, base: &str, model: &str) -> &'a mut RemoteTierConfig {
    slot.get_or_insert_with(|| RemoteTierConfig::new(name, base, model))
}

/// Apply environment overrides. `env` looks a variable up by name; blank
/// values count as unset.
pub fn apply_env(config: &mut HarvestConfig, env: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
    let var = |key: &str| non_blank(env(key));

    if let Some(keyword) = var("SEARCH_KEYWORD") {
        config.search.keyword = keyword;
    }
    if let Some(days) = var("DAYS_BACK") {
        config.search.days = Some(parse_var("DAYS_BACK", &days)?);
    }
    if let Some(year) = var("SEARCH_YEAR") {
        config.search.year = Some(parse_var("SEARCH_YEAR", &year)?);
    }
    if let Some(max) = var("MAX_ARTICLES") {
        config.search.max_articles = parse_var("MAX_ARTICLES", &max)?;
    }
    if let Some(language) = var("OUTPUT_LANGUAGE") {
        config.extraction.output_language = language;
    }

    let glm = [var("GLM_API_KEY"), var("GLM_BASE_URL"), var("GLM_MODEL_NAME")];
    if glm.iter().any(Option::is_some) {
        let tier = tier_mut(&mut config.extraction.primary, "glm", DEFAULT_GLM_BASE_URL, DEFAULT_GLM_MODEL);
        let [key, base, model] = glm;
        if key.is_some() { tier.api_key = key; }
        if let Some(base) = base { tier.base_url = base; }
        if let Some(model) = model { tier.model = model; }
    }

    let openai = [var("OPENAI_API_KEY"), var("OPENAI_BASE_URL"), var("OPENAI_MODEL")];
    if openai.iter().any(Option::is_some) {
        let tier = tier_mut(&mut config.extraction.secondary, "openai", DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL);
        let [key, base, model] = openai;
        if key.is_some() { tier.api_key = key; }
        if let Some(base) = base { tier.base_url = base; }
        if let Some(model) = model { tier.model = model; }
    }

    if let Some(key) = var("BIO_MODEL_API_KEY") {
        config.sources.partner.api_key = Some(key);
    }
    if let Some(base) = var("BIO_MODEL_BASE_URL") {
        config.sources.partner.base_url = Some(base);
    }
    if let Some(key) = var("NCBI_API_KEY") {
        config.sources.pubmed_api_key = Some(key);
    }
    Ok(())
}
