//! medRxiv / bioRxiv RSS feed client.
//!
//! Feeds:
//!   https://connect.medrxiv.org/medrxiv_xml.php?subject=all
//!   https://connect.biorxiv.org/biorxiv_xml.php?subject=all
//!
//! The feeds are RSS 1.0 (RDF) with Dublin Core fields; plain RSS 2.0
//! items (`pubDate`, `author`) are accepted too. The feed has no search,
//! so keyword and date filtering happen client-side.

use async_trait::async_trait;
use medharvest_common::backoff::RetryPolicy;
use medharvest_common::sandbox::SandboxClient as Client;
use medharvest_common::HarvestError;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, instrument, warn};

use super::{extract_doi, iso_or_raw, parse_date, LiteratureSource, SearchQuery};
use crate::models::{AuthorEntry, RawRecord, SourceKind};

pub const MEDRXIV_FEED_URL: &str = "https://connect.medrxiv.org/medrxiv_xml.php?subject=all";
pub const BIORXIV_FEED_URL: &str = "https://connect.biorxiv.org/biorxiv_xml.php?subject=all";

/// One `<item>` of a feed, fields as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub authors: Vec<String>,
    pub date: String,
    pub identifier: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedField {
    Title,
    Link,
    Summary,
    Creator,
    Date,
    Identifier,
}

impl FeedField {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title"                   => Some(FeedField::Title),
            b"link"                    => Some(FeedField::Link),
            b"description" | b"summary" => Some(FeedField::Summary),
            b"creator" | b"author"     => Some(FeedField::Creator),
            b"date" | b"pubDate"       => Some(FeedField::Date),
            b"identifier"              => Some(FeedField::Identifier),
            _ => None,
        }
    }
}

impl FeedEntry {
    fn commit(&mut self, field: FeedField, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        match field {
            FeedField::Title      => self.title = text.to_string(),
            FeedField::Link       => self.link = text.to_string(),
            FeedField::Summary    => self.summary = text.to_string(),
            FeedField::Date       => self.date = text.to_string(),
            FeedField::Identifier => self.identifier = text.to_string(),
            FeedField::Creator    => self.authors.extend(
                text.split(';').map(str::trim).filter(|s| !s.is_empty()).map(String::from),
            ),
        }
    }
}

/// Parse RSS 1.0 / 2.0 items. A parse error after some items were read
/// keeps those items; an error before any item is returned.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>, HarvestError> {
    let mut entries = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut current: Option<FeedEntry> = None;
    let mut field: Option<FeedField> = None;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.local_name();
                if name.as_ref() == b"item" {
                    current = Some(FeedEntry::default());
                } else if current.is_some() && field.is_none() {
                    field = FeedField::from_local_name(name.as_ref());
                    text.clear();
                }
            }
            Ok(Event::Text(ref e)) => {
                if field.is_some() {
                    match e.unescape() {
                        Ok(t) => text.push_str(&t),
                        Err(err) => debug!(error = %err, "Skipping undecodable feed text"),
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.local_name();
                if name.as_ref() == b"item" {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                    field = None;
                } else if let (Some(f), Some(entry)) = (field, current.as_mut()) {
                    if FeedField::from_local_name(name.as_ref()) == Some(f) {
                        entry.commit(f, &text);
                        field = None;
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                if entries.is_empty() {
                    return Err(HarvestError::Xml(e.to_string()));
                }
                warn!("Feed XML parse error after {} items: {}", entries.len(), e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

/// Map a feed entry to a normalized record of `kind`.
pub fn entry_to_record(entry: FeedEntry, kind: SourceKind) -> Option<RawRecord> {
    let link_without_query = entry.link.split('?').next().unwrap_or("");
    let published = parse_date(&entry.date);

    let mut r = RawRecord::new(kind);
    r.identifier = extract_doi(&entry.identifier)
        .or_else(|| extract_doi(link_without_query))
        .unwrap_or_default();
    r.title = entry.title;
    r.authors = entry.authors.into_iter().map(AuthorEntry::Plain).collect();
    r.abstract_text = entry.summary;
    r.published_at = iso_or_raw(published, &entry.date);
    r.url = entry.link;
    r.normalize()
}

pub struct PreprintFeedClient {
    client:   Client,
    retry:    RetryPolicy,
    kind:     SourceKind,
    feed_url: String,
}

impl PreprintFeedClient {
    pub fn new(kind: SourceKind, feed_url: impl Into<String>, retry: RetryPolicy) -> Result<Self, HarvestError> {
        Ok(Self { client: Client::new()?, retry, kind, feed_url: feed_url.into() })
    }

    pub fn new_medrxiv(retry: RetryPolicy) -> Result<Self, HarvestError> {
        Self::new(SourceKind::MedRxiv, MEDRXIV_FEED_URL, retry)
    }

    pub fn new_biorxiv(retry: RetryPolicy) -> Result<Self, HarvestError> {
        Self::new(SourceKind::BioRxiv, BIORXIV_FEED_URL, retry)
    }

    /// Apply the run's cap, keyword and window to parsed feed items.
    pub fn select(&self, entries: Vec<FeedEntry>, query: &SearchQuery) -> Vec<RawRecord> {
        entries
            .into_iter()
            .take(query.max_results)
            .filter(|e| query.matches_keyword(&e.title, &e.summary))
            .filter(|e| query.admits(parse_date(&e.date)))
            .filter_map(|e| entry_to_record(e, self.kind))
            .collect()
    }
}

#[async_trait]
impl LiteratureSource for PreprintFeedClient {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    #[instrument(skip(self), fields(source = %self.kind))]
    async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<RawRecord>> {
        let what = format!("{} feed", self.kind);
        let xml = self
            .retry
            .send(&what, || self.client.get(&self.feed_url))
            .await?
            .text()
            .await?;

        let entries = parse_feed(&xml)?;
        let fetched = entries.len();
        let records = self.select(entries, query);
        debug!(fetched, kept = records.len(), "Feed filtered");
        Ok(records)
    }
}
