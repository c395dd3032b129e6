//! PubMed E-utilities client.
//!
//! Endpoints used:
//!   esearch: https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi
//!   efetch:  https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi
//!
//! Searches are restricted to biology / medicine MeSH terms and to the
//! run's year or lookback window.

use async_trait::async_trait;
use medharvest_common::backoff::RetryPolicy;
use medharvest_common::sandbox::SandboxClient as Client;
use medharvest_common::{HarvestError, SearchWindow};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, instrument, warn};

use super::{LiteratureSource, SearchQuery};
use crate::models::{collapse_whitespace, AffiliationEntry, AuthorEntry, RawRecord, SourceKind};

const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const EFETCH_URL:  &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";
const ARTICLE_URL: &str = "https://pubmed.ncbi.nlm.nih.gov";

pub struct PubMedClient {
    client:  Client,
    retry:   RetryPolicy,
    api_key: Option<String>,
}

impl PubMedClient {
    pub fn new(api_key: Option<String>, retry: RetryPolicy) -> Result<Self, HarvestError> {
        Ok(Self { client: Client::new()?, retry, api_key })
    }

    fn with_key(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            params.push(("api_key", key.clone()));
        }
        params
    }

    /// Search PubMed and return a list of PMIDs.
    #[instrument(skip(self))]
    async fn esearch(&self, query: &SearchQuery) -> anyhow::Result<Vec<String>> {
        let params = self.with_key(vec![
            ("db", "pubmed".to_string()),
            ("term", build_term(query)),
            ("retmax", query.page_size().to_string()),
            ("retmode", "json".to_string()),
        ]);

        let resp: serde_json::Value = self
            .retry
            .send("pubmed esearch", || Ok(self.client.get(ESEARCH_URL)?.query(&params)))
            .await?
            .json()
            .await?;

        let ids: Vec<String> = resp["esearchresult"]["idlist"]
            .as_array()
            .map(|ids| ids.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        debug!(count = ids.len(), "PubMed esearch returned PMIDs");
        Ok(ids)
    }

    /// Fetch PubMed XML for a list of PMIDs and parse it.
    #[instrument(skip(self, pmids), fields(count = pmids.len()))]
    async fn efetch(&self, pmids: &[String]) -> anyhow::Result<Vec<RawRecord>> {
        if pmids.is_empty() {
            return Ok(vec![]);
        }

        let params = self.with_key(vec![
            ("db", "pubmed".to_string()),
            ("id", pmids.join(",")),
            ("retmode", "xml".to_string()),
        ]);

        let xml = self
            .retry
            .send("pubmed efetch", || Ok(self.client.get(EFETCH_URL)?.query(&params)))
            .await?
            .text()
            .await?;

        Ok(parse_pubmed_xml(&xml)?)
    }
}

/// esearch term: keyword in title/abstract, MeSH restriction, date clause.
pub fn build_term(query: &SearchQuery) -> String {
    let mut term = format!(
        "({}[Title/Abstract]) AND (\"biology\"[MeSH Terms] OR \"medicine\"[MeSH Terms] OR \"biomedical research\"[MeSH Terms])",
        query.keyword
    );
    match query.window {
        SearchWindow::Year(year) => term.push_str(&format!(" AND {year}[Publication Date]")),
        SearchWindow::LookbackDays(_) => {
            if let Some(cutoff) = query.window.cutoff(query.now) {
                term.push_str(&format!(
                    " AND \"{}\"[Publication Date] : \"3000/12/31\"[Publication Date]",
                    cutoff.format("%Y/%m/%d")
                ));
            }
        }
        SearchWindow::Unbounded => {}
    }
    term
}

#[async_trait]
impl LiteratureSource for PubMedClient {
    fn kind(&self) -> SourceKind {
        SourceKind::PubMed
    }

    async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<RawRecord>> {
        let mut pmids = self.esearch(query).await?;
        pmids.truncate(query.max_results);
        self.efetch(&pmids).await
    }
}

fn month_number(m: &str) -> String {
    const MONTHS: [&str; 12] = ["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"];
    let lower = m.trim().to_lowercase();
    MONTHS
        .iter()
        .position(|name| lower.starts_with(name))
        .map(|i| format!("{:02}", i + 1))
        .unwrap_or_else(|| format!("{:0>2}", m.trim()))
}

#[derive(Default)]
struct ArticleBuilder {
    pmid:         String,
    doi:          String,
    title:        String,
    abstracts:    Vec<String>,
    authors:      Vec<String>,
    affiliations: Vec<String>,
    year:         String,
    month:        String,
    day:          String,
}

impl ArticleBuilder {
    fn published_at(&self) -> String {
        if self.year.is_empty() {
            return String::new();
        }
        let month = if self.month.is_empty() { "01".to_string() } else { month_number(&self.month) };
        let day = if self.day.is_empty() { "01".to_string() } else { format!("{:0>2}", self.day) };
        format!("{}-{}-{}", self.year, month, day)
    }

    fn build(self) -> Option<RawRecord> {
        let mut r = RawRecord::new(SourceKind::PubMed);
        r.published_at = self.published_at();
        r.identifier = if self.doi.is_empty() { self.pmid.clone() } else { self.doi };
        r.url = if self.pmid.is_empty() { String::new() } else { format!("{ARTICLE_URL}/{}", self.pmid) };
        r.title = self.title;
        r.abstract_text = collapse_whitespace(&self.abstracts.join(" "));
        r.authors = self.authors.into_iter().map(AuthorEntry::Plain).collect();
        r.affiliations = self.affiliations.into_iter().map(AffiliationEntry::Plain).collect();
        r.normalize()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Pmid,
    Title,
    Abstract,
    LastName,
    ForeName,
    Affiliation,
    Year,
    Month,
    Day,
    Doi,
}

/// Parse efetch XML (`<PubmedArticleSet><PubmedArticle>…`) into records.
pub fn parse_pubmed_xml(xml: &str) -> Result<Vec<RawRecord>, HarvestError> {
    let mut records = Vec::new();
    let mut reader = Reader::from_str(xml);

    let mut current: Option<ArticleBuilder> = None;
    let mut capture: Option<(Capture, Vec<u8>)> = None;
    let mut text = String::new();
    let mut in_pub_date = false;
    let mut last_name = String::new();
    let mut fore_name = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.local_name().as_ref().to_vec();
                match name.as_slice() {
                    b"PubmedArticle" => current = Some(ArticleBuilder::default()),
                    b"PubDate" => in_pub_date = true,
                    b"Author" => {
                        last_name.clear();
                        fore_name.clear();
                    }
                    _ => {}
                }
                let target = if current.is_none() || capture.is_some() {
                    None
                } else {
                    match name.as_slice() {
                        b"PMID"         => Some(Capture::Pmid),
                        b"ArticleTitle" => Some(Capture::Title),
                        b"AbstractText" => Some(Capture::Abstract),
                        b"LastName"     => Some(Capture::LastName),
                        b"ForeName"     => Some(Capture::ForeName),
                        b"Affiliation"  => Some(Capture::Affiliation),
                        b"Year"  if in_pub_date => Some(Capture::Year),
                        b"Month" if in_pub_date => Some(Capture::Month),
                        b"Day"   if in_pub_date => Some(Capture::Day),
                        b"ArticleId" => {
                            let is_doi = e.attributes().flatten().any(|a| {
                                a.key.local_name().as_ref() == b"IdType" && a.value.as_ref() == b"doi"
                            });
                            is_doi.then_some(Capture::Doi)
                        }
                        _ => None,
                    }
                };
                if let Some(t) = target {
                    capture = Some((t, name));
                    text.clear();
                }
            }
            Ok(Event::Text(ref e)) => {
                if capture.is_some() {
                    match e.unescape() {
                        Ok(t) => text.push_str(&t),
                        Err(err) => debug!(error = %err, "Skipping undecodable PubMed text"),
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.local_name();
                let name = name.as_ref();

                let closes_capture = matches!(&capture, Some((_, open)) if open.as_slice() == name);
                if closes_capture {
                    if let (Some((target, _)), Some(article)) = (capture.take(), current.as_mut()) {
                        let value = collapse_whitespace(&text);
                        match target {
                            // first PMID only; later ones belong to cited articles
                            Capture::Pmid if article.pmid.is_empty() => article.pmid = value,
                            Capture::Pmid => {}
                            Capture::Title       => article.title = value,
                            Capture::Abstract    => article.abstracts.push(value),
                            Capture::LastName    => last_name = value,
                            Capture::ForeName    => fore_name = value,
                            Capture::Affiliation => article.affiliations.push(value),
                            Capture::Year        => article.year = value,
                            Capture::Month       => article.month = value,
                            Capture::Day         => article.day = value,
                            Capture::Doi if article.doi.is_empty() => article.doi = value,
                            Capture::Doi => {}
                        }
                    }
                }

                match name {
                    b"PubDate" => in_pub_date = false,
                    b"Author" => {
                        if let Some(article) = current.as_mut() {
                            let full = format!("{fore_name} {last_name}").trim().to_string();
                            if !full.is_empty() {
                                article.authors.push(full);
                            }
                        }
                    }
                    b"PubmedArticle" => {
                        if let Some(record) = current.take().and_then(ArticleBuilder::build) {
                            records.push(record);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                if records.is_empty() {
                    return Err(HarvestError::Xml(e.to_string()));
                }
                warn!("PubMed XML parse error after {} articles: {}", records.len(), e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}
