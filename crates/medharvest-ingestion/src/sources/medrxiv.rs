//! medRxiv source: RSS feed first, search-page top-up when the feed is thin.

use async_trait::async_trait;
use medharvest_common::backoff::RetryPolicy;
use medharvest_common::HarvestError;
use tracing::{info, instrument, warn};

use super::medrxiv_search::MedrxivSearchClient;
use super::preprint_feed::PreprintFeedClient;
use super::{LiteratureSource, SearchQuery};
use crate::models::{RawRecord, SourceKind};

pub struct MedrxivSource {
    feed:         PreprintFeedClient,
    search:       MedrxivSearchClient,
    /// Query the search page when the feed yields fewer records than this.
    top_up_below: usize,
}

impl MedrxivSource {
    pub fn new(retry: RetryPolicy, top_up_below: usize) -> Result<Self, HarvestError> {
        Ok(Self {
            feed: PreprintFeedClient::new_medrxiv(retry.clone())?,
            search: MedrxivSearchClient::new(retry)?,
            top_up_below,
        })
    }
}

#[async_trait]
impl LiteratureSource for MedrxivSource {
    fn kind(&self) -> SourceKind {
        SourceKind::MedRxiv
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<RawRecord>> {
        let (mut records, feed_error) = match self.feed.search(query).await {
            Ok(records) => (records, None),
            Err(e) => {
                warn!(error = %e, "medRxiv feed failed");
                (Vec::new(), Some(e))
            }
        };

        if records.len() >= self.top_up_below {
            return Ok(records);
        }

        match self.search.search(query).await {
            Ok(extra) => {
                info!(feed = records.len(), search = extra.len(), "Topped up medRxiv from search page");
                records.extend(extra);
                Ok(records)
            }
            Err(e) => {
                warn!(error = %e, "medRxiv search page failed");
                match feed_error {
                    // both halves failed: surface the feed error
                    Some(feed_error) => Err(feed_error.context(format!("search page also failed: {e}"))),
                    None => Ok(records),
                }
            }
        }
    }
}
