use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;
use crate::error::HarvestError;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("medharvest/", env!("CARGO_PKG_VERSION"), " (research)");

/// An HTTP client capped to an allowlist of harvest and LLM domains.
///
/// Every adapter and LLM tier goes through this client, so a misconfigured
/// base URL fails fast with a `SecurityError` instead of leaking requests.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a client with the default allowlist and a 30s per-request timeout.
    pub fn new() -> Result<Self, HarvestError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, HarvestError> {
        let mut allowlist = HashSet::new();
        let domains = vec![
            "connect.medrxiv.org",     // medRxiv RSS
            "connect.biorxiv.org",     // bioRxiv RSS
            "www.medrxiv.org",         // medRxiv search page
            "eutils.ncbi.nlm.nih.gov", // PubMed
            "export.arxiv.org",        // arXiv
            "open.bigmodel.cn",        // GLM
            "api.openai.com",          // OpenAI
            "localhost",
            "127.0.0.1",
        ];

        for d in domains {
            allowlist.insert(d.to_string());
        }

        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| HarvestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Allows the host of a configured base URL (partner API, custom LLM endpoint).
    pub fn allow_url(&mut self, url: &str) -> Result<(), HarvestError> {
        let parsed = Url::parse(url)
            .map_err(|e| HarvestError::Config(format!("Invalid URL {url}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| HarvestError::Config(format!("URL has no host: {url}")))?;
        self.allow_domain(host);
        Ok(())
    }

    /// Validates if a URL is permitted under the current sandbox policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                // Exact match or a subdomain of an allowed domain
                for allowed in &self.allowlist {
                    if host == allowed || host.ends_with(&format!(".{}", allowed)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, HarvestError> {
        self.check(url)?;
        Ok(self.client.get(url))
    }

    pub fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, HarvestError> {
        self.check(url)?;
        Ok(self.client.post(url))
    }

    fn check(&self, url: &str) -> Result<(), HarvestError> {
        if self.is_allowed(url) {
            Ok(())
        } else {
            Err(HarvestError::SecurityError(format!(
                "domain not in allowlist for URL {}",
                url
            )))
        }
    }
}
