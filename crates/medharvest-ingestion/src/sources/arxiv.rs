//! arXiv Atom API client.
//!
//! `GET http://export.arxiv.org/api/query?search_query=…` restricted to
//! quantitative biology and ML categories, newest submissions first.

use async_trait::async_trait;
use medharvest_common::backoff::RetryPolicy;
use medharvest_common::sandbox::SandboxClient as Client;
use medharvest_common::HarvestError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, instrument, warn};

use super::{iso_or_raw, parse_date, LiteratureSource, SearchQuery};
use crate::models::{collapse_whitespace, AuthorEntry, RawRecord, SourceKind};

const QUERY_URL: &str = "http://export.arxiv.org/api/query";
const CATEGORIES: &str = "cat:q-bio.* OR cat:cs.LG OR cat:stat.ML";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomEntry {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub published: String,
    pub authors: Vec<String>,
    pub link: String,
}

impl AtomEntry {
    /// Short arXiv ID: last path segment of the entry `<id>` URL.
    pub fn short_id(&self) -> &str {
        self.id.trim_end_matches('/').rsplit('/').next().unwrap_or("")
    }

    fn into_record(self) -> Option<RawRecord> {
        let published = parse_date(&self.published);
        let mut r = RawRecord::new(SourceKind::Arxiv);
        r.identifier = self.short_id().to_string();
        r.url = if self.link.is_empty() { self.id.clone() } else { self.link };
        r.title = collapse_whitespace(&self.title);
        r.abstract_text = collapse_whitespace(&self.summary);
        r.published_at = iso_or_raw(published, &self.published);
        r.authors = self.authors.into_iter().map(AuthorEntry::Plain).collect();
        r.normalize()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AtomField {
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

fn alternate_href(e: &BytesStart<'_>) -> Option<String> {
    let mut rel = None;
    let mut href = None;
    for attr in e.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"rel" => rel = Some(String::from_utf8_lossy(&attr.value).into_owned()),
            b"href" => href = Some(String::from_utf8_lossy(&attr.value).into_owned()),
            _ => {}
        }
    }
    // a link without rel counts as alternate
    match rel.as_deref() {
        None | Some("alternate") => href,
        _ => None,
    }
}

/// Parse an Atom response into entries.
pub fn parse_atom(xml: &str) -> Result<Vec<AtomEntry>, HarvestError> {
    let mut entries = Vec::new();
    let mut reader = Reader::from_str(xml);

    let mut current: Option<AtomEntry> = None;
    let mut field: Option<AtomField> = None;
    let mut in_author = false;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"entry" => current = Some(AtomEntry::default()),
                    b"author" => in_author = true,
                    b"link" => {
                        if let (Some(entry), Some(href)) = (current.as_mut(), alternate_href(e)) {
                            if entry.link.is_empty() {
                                entry.link = href;
                            }
                        }
                    }
                    other if current.is_some() && field.is_none() => {
                        field = match other {
                            b"id" if !in_author => Some(AtomField::Id),
                            b"title"            => Some(AtomField::Title),
                            b"summary"          => Some(AtomField::Summary),
                            b"published"        => Some(AtomField::Published),
                            b"name" if in_author => Some(AtomField::AuthorName),
                            _ => None,
                        };
                        text.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"link" {
                    if let (Some(entry), Some(href)) = (current.as_mut(), alternate_href(e)) {
                        if entry.link.is_empty() {
                            entry.link = href;
                        }
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                if field.is_some() {
                    match e.unescape() {
                        Ok(t) => text.push_str(&t),
                        Err(err) => debug!(error = %err, "Skipping undecodable Atom text"),
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"entry" => {
                        if let Some(entry) = current.take() {
                            entries.push(entry);
                        }
                        field = None;
                        in_author = false;
                    }
                    b"author" => in_author = false,
                    closing => {
                        if let (Some(f), Some(entry)) = (field, current.as_mut()) {
                            let closes = matches!(
                                (f, closing),
                                (AtomField::Id, b"id")
                                    | (AtomField::Title, b"title")
                                    | (AtomField::Summary, b"summary")
                                    | (AtomField::Published, b"published")
                                    | (AtomField::AuthorName, b"name")
                            );
                            if closes {
                                let value = text.replace('\n', " ").trim().to_string();
                                match f {
                                    AtomField::Id         => entry.id = value,
                                    AtomField::Title      => entry.title = value,
                                    AtomField::Summary    => entry.summary = value,
                                    AtomField::Published  => entry.published = value,
                                    AtomField::AuthorName => {
                                        if !value.is_empty() {
                                            entry.authors.push(value);
                                        }
                                    }
                                }
                                field = None;
                            }
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                if entries.is_empty() {
                    return Err(HarvestError::Xml(e.to_string()));
                }
                warn!("arXiv XML parse error after {} entries: {}", entries.len(), e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

pub struct ArxivClient {
    client: Client,
    retry:  RetryPolicy,
}

impl ArxivClient {
    pub fn new(retry: RetryPolicy) -> Result<Self, HarvestError> {
        Ok(Self { client: Client::new()?, retry })
    }

    pub fn search_query(keyword: &str) -> String {
        format!("({keyword}) AND ({CATEGORIES})")
    }

    /// Keep entries inside the window and map them to records.
    pub fn select(entries: Vec<AtomEntry>, query: &SearchQuery) -> Vec<RawRecord> {
        entries
            .into_iter()
            .filter(|e| query.admits(parse_date(&e.published)))
            .filter_map(AtomEntry::into_record)
            .take(query.max_results)
            .collect()
    }
}

#[async_trait]
impl LiteratureSource for ArxivClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Arxiv
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<RawRecord>> {
        let params = [
            ("search_query", Self::search_query(&query.keyword)),
            ("start", "0".to_string()),
            ("max_results", query.page_size().to_string()),
            ("sortBy", "submittedDate".to_string()),
            ("sortOrder", "descending".to_string()),
        ];

        let xml = self
            .retry
            .send("arxiv query", || Ok(self.client.get(QUERY_URL)?.query(&params)))
            .await?
            .text()
            .await?;

        let entries = parse_atom(&xml)?;
        let records = Self::select(entries, query);
        debug!(count = records.len(), "arXiv entries kept");
        Ok(records)
    }
}
