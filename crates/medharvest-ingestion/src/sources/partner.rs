//! Partner literature API ("biomodel").
//!
//! `GET {base}/search?query=…&days=…&source=medrxiv&limit=…` with a bearer
//! token, answering `{"results": [ … ]}`. Result items are loosely typed:
//! authors and affiliations may be strings or objects.

use async_trait::async_trait;
use medharvest_common::backoff::RetryPolicy;
use medharvest_common::harvest_config::PartnerApiConfig;
use medharvest_common::sandbox::SandboxClient as Client;
use medharvest_common::{HarvestError, SearchWindow};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{LiteratureSource, SearchQuery};
use crate::models::{AffiliationEntry, AuthorEntry, RawRecord, SourceKind};

pub struct PartnerApiClient {
    client:   Client,
    retry:    RetryPolicy,
    /// `None` when unset or still the placeholder; searches then return nothing.
    base_url: Option<String>,
    api_key:  String,
}

impl PartnerApiClient {
    pub fn new(config: &PartnerApiConfig, retry: RetryPolicy) -> Result<Self, HarvestError> {
        let mut client = Client::new()?;
        let base_url = config.usable_base_url().map(str::to_string);
        if let Some(base) = &base_url {
            client.allow_url(base)?;
        }
        Ok(Self {
            client,
            retry,
            base_url,
            api_key: config.api_key.clone().unwrap_or_default(),
        })
    }
}

fn str_field<'a>(item: &'a Value, keys: &[&str]) -> &'a str {
    keys.iter()
        .filter_map(|k| item.get(*k).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
        .unwrap_or("")
}

fn list_field<T>(item: &Value, key: &str, decode: fn(&Value) -> T) -> Vec<T> {
    item.get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().map(decode).collect())
        .unwrap_or_default()
}

/// Map one result item to a normalized record.
pub fn parse_item(item: &Value) -> Option<RawRecord> {
    let mut r = RawRecord::new(SourceKind::Biomodel);
    r.identifier = str_field(item, &["doi", "id"]).to_string();
    r.title = str_field(item, &["title"]).to_string();
    r.authors = list_field(item, "authors", AuthorEntry::from_value);
    r.affiliations = list_field(item, "affiliations", AffiliationEntry::from_value);
    r.abstract_text = str_field(item, &["abstract"]).to_string();
    r.published_at = str_field(item, &["published_at"]).to_string();
    r.url = str_field(item, &["url", "doi"]).to_string();
    r.normalize()
}

pub fn parse_results(body: &Value) -> Vec<RawRecord> {
    body.get("results")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_item).collect())
        .unwrap_or_default()
}

#[async_trait]
impl LiteratureSource for PartnerApiClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Biomodel
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<RawRecord>> {
        let Some(base) = &self.base_url else {
            warn!("Partner API base URL is not configured; set BIO_MODEL_BASE_URL to enable it");
            return Ok(Vec::new());
        };

        let url = format!("{base}/search");
        let mut params = vec![
            ("query", query.keyword.clone()),
            ("source", "medrxiv".to_string()),
            ("limit", query.max_results.to_string()),
        ];
        if let SearchWindow::LookbackDays(days) = query.window {
            params.push(("days", days.to_string()));
        }

        let body: Value = self
            .retry
            .send("partner search", || {
                Ok(self.client.get(&url)?.bearer_auth(&self.api_key).query(&params))
            })
            .await?
            .json()
            .await?;

        let records = parse_results(&body);
        debug!(count = records.len(), "Partner API results parsed");
        Ok(records)
    }
}
