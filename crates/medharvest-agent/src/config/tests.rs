#[cfg(test)]
mod tests {
    use super::super::*;
    use medharvest_common::SearchWindow;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.search.max_articles, 200);
        assert_eq!(config.output.file_prefix, "medrxiv-ai");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medharvest.toml");
        std::fs::write(
            &path,
            r#"
[search]
keyword = "deep learning"
year = 2024

[sources]
arxiv = false

[retry]
max_attempts = 3
"#,
        )
        .unwrap();

        let config = load_file(&path).unwrap();
        assert_eq!(config.search.keyword, "deep learning");
        assert_eq!(config.search.window(), SearchWindow::Year(2024));
        assert!(!config.sources.arxiv);
        assert!(config.sources.pubmed);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.max_delay_ms, 32_000);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[search\nkeyword = ").unwrap();
        assert!(load_file(&path).is_err());
    }

    #[test]
    fn test_env_overrides_search() {
        let mut config = HarvestConfig::default();
        apply_env(
            &mut config,
            env(&[("SEARCH_KEYWORD", "machine learning"), ("DAYS_BACK", "7"), ("MAX_ARTICLES", "25")]),
        )
        .unwrap();
        assert_eq!(config.search.keyword, "machine learning");
        assert_eq!(config.search.window(), SearchWindow::LookbackDays(7));
        assert_eq!(config.search.max_articles, 25);
    }

    #[test]
    fn test_env_output_language() {
        let mut config = HarvestConfig::default();
        assert_eq!(config.extraction.output_language, "English");
        apply_env(&mut config, env(&[("OUTPUT_LANGUAGE", "Chinese")])).unwrap();
        assert_eq!(config.extraction.output_language, "Chinese");
    }

    #[test]
    fn test_env_year_wins_over_days() {
        let mut config = HarvestConfig::default();
        apply_env(&mut config, env(&[("DAYS_BACK", "7"), ("SEARCH_YEAR", "2025")])).unwrap();
        assert_eq!(config.search.window(), SearchWindow::Year(2025));
    }

    #[test]
    fn test_env_bad_number_is_an_error() {
        let mut config = HarvestConfig::default();
        let err = apply_env(&mut config, env(&[("MAX_ARTICLES", "lots")])).unwrap_err();
        assert!(err.to_string().contains("MAX_ARTICLES"));
    }

    #[test]
    fn test_env_keys_enable_tiers() {
        let mut config = HarvestConfig::default();
        assert!(config.enabled_tiers().is_empty());

        apply_env(
            &mut config,
            env(&[("GLM_API_KEY", "glm-secret"), ("OPENAI_API_KEY", "sk-test"), ("OPENAI_MODEL", "gpt-4o-mini")]),
        )
        .unwrap();

        let tiers = config.enabled_tiers();
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].name, "glm");
        assert_eq!(tiers[0].base_url, "https://open.bigmodel.cn/api/paas/v4");
        assert_eq!(tiers[0].model, "glm-4-flash");
        assert_eq!(tiers[1].name, "openai");
        assert_eq!(tiers[1].model, "gpt-4o-mini");
    }

    #[test]
    fn test_env_recreates_removed_tier() {
        let mut config = HarvestConfig::default();
        config.extraction.primary = None;
        apply_env(&mut config, env(&[("GLM_API_KEY", "k")])).unwrap();
        assert_eq!(config.enabled_tiers()[0].name, "glm");
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = HarvestConfig::default();
        apply_env(&mut config, env(&[("GLM_API_KEY", "  "), ("SEARCH_KEYWORD", "")])).unwrap();
        assert!(config.enabled_tiers().is_empty());
        assert_eq!(config.search.keyword, "artificial intelligence");
    }

    #[test]
    fn test_env_partner_and_ncbi() {
        let mut config = HarvestConfig::default();
        apply_env(
            &mut config,
            env(&[("BIO_MODEL_API_KEY", "bm"), ("BIO_MODEL_BASE_URL", "https://api.partner.org"), ("NCBI_API_KEY", "ncbi")]),
        )
        .unwrap();
        assert!(config.sources.partner.is_enabled());
        assert_eq!(config.sources.partner.usable_base_url(), Some("https://api.partner.org"));
        assert_eq!(config.sources.pubmed_api_key.as_deref(), Some("ncbi"));
        assert_eq!(config.sources.enabled_sources()[0], "biomodel");
    }
}
