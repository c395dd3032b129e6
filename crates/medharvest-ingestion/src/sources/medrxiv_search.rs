//! medRxiv search-results page scraper.
//!
//! Used to top up a thin RSS harvest. The results page lists titles,
//! authors and links only; abstracts stay empty.

use medharvest_common::backoff::RetryPolicy;
use medharvest_common::sandbox::SandboxClient as Client;
use medharvest_common::HarvestError;
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use super::{extract_doi, SearchQuery};
use crate::models::{AuthorEntry, RawRecord, SourceKind};

const SEARCH_URL: &str = "https://www.medrxiv.org/search/";
const SITE_ROOT: &str = "https://www.medrxiv.org";

lazy_static! {
    static ref CITATION: Selector = Selector::parse("div.highwire-article-citation").unwrap();
    static ref TITLE: Selector = Selector::parse("span.highwire-cite-title").unwrap();
    static ref AUTHOR: Selector = Selector::parse("span.highwire-citation-authors a").unwrap();
    static ref LINK: Selector = Selector::parse("a.highwire-cite-linked-title").unwrap();
}

pub struct MedrxivSearchClient {
    client: Client,
    retry:  RetryPolicy,
}

impl MedrxivSearchClient {
    pub fn new(retry: RetryPolicy) -> Result<Self, HarvestError> {
        Ok(Self { client: Client::new()?, retry })
    }

    /// `https://www.medrxiv.org/search/{keyword}` with the keyword as one
    /// percent-encoded path segment.
    pub fn search_url(keyword: &str) -> anyhow::Result<Url> {
        let mut url = Url::parse(SEARCH_URL)?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("search URL cannot take path segments"))?
            .pop_if_empty()
            .push(keyword);
        Ok(url)
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<RawRecord>> {
        let url = Self::search_url(&query.keyword)?;
        let limit = query.page_size().to_string();
        let params = [
            ("limit", limit.as_str()),
            ("jcode", "medrxiv"),
            ("format_result", "standard"),
        ];

        let html = self
            .retry
            .send("medrxiv search page", || Ok(self.client.get(url.as_str())?.query(&params)))
            .await?
            .text()
            .await?;

        let mut records = parse_search_page(&html);
        records.truncate(query.max_results);
        debug!(found = records.len(), "medRxiv search page parsed");
        Ok(records)
    }
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse every `div.highwire-article-citation` on a results page.
pub fn parse_search_page(html: &str) -> Vec<RawRecord> {
    let document = Html::parse_document(html);

    document
        .select(&CITATION)
        .filter_map(|div| {
            let mut r = RawRecord::new(SourceKind::MedRxiv);
            r.title = div.select(&TITLE).next().map(text_of).unwrap_or_default();
            r.authors = div
                .select(&AUTHOR)
                .map(text_of)
                .filter(|a| !a.is_empty())
                .map(AuthorEntry::Plain)
                .collect();
            r.url = div
                .select(&LINK)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(|href| {
                    if href.starts_with("http") {
                        href.to_string()
                    } else {
                        format!("{SITE_ROOT}{href}")
                    }
                })
                .unwrap_or_default();
            r.identifier = extract_doi(&r.url).unwrap_or_default();
            r.normalize()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<html><body>
      <div class="highwire-article-citation">
        <a class="highwire-cite-linked-title" href="/content/10.1101/2025.05.05.25327001v1">
          <span class="highwire-cite-title">Large language models for discharge summaries</span>
        </a>
        <span class="highwire-citation-authors">
          <span><a href="#">Ana Ruiz</a></span>, <span><a href="#">Omar Haddad</a></span>
        </span>
      </div>
      <div class="highwire-article-citation">
        <span class="highwire-cite-title">Entry without link</span>
      </div>
      <div class="something-else"><span class="highwire-cite-title">Ignored</span></div>
    </body></html>"##;

    #[test]
    fn test_parse_search_page() {
        let records = parse_search_page(PAGE);
        assert_eq!(records.len(), 2);

        let r = &records[0];
        assert_eq!(r.title, "Large language models for discharge summaries");
        assert_eq!(r.url, "https://www.medrxiv.org/content/10.1101/2025.05.05.25327001v1");
        assert_eq!(r.identifier, "10.1101/2025.05.05.25327001v1");
        assert_eq!(r.last_corresponding_author, "Omar Haddad");
        assert_eq!(r.abstract_text, "");

        assert_eq!(records[1].identifier, "medrxiv:Entry without link");
    }

    #[test]
    fn test_selectors_are_shared_across_pages() {
        lazy_static::initialize(&CITATION);
        lazy_static::initialize(&TITLE);
        lazy_static::initialize(&AUTHOR);
        lazy_static::initialize(&LINK);
        let first = parse_search_page(PAGE);
        let second = parse_search_page(PAGE);
        assert_eq!(first.len(), 2);
        assert_eq!(
            first.iter().map(|r| &r.identifier).collect::<Vec<_>>(),
            second.iter().map(|r| &r.identifier).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_empty_page() {
        assert!(parse_search_page("<html></html>").is_empty());
    }

    #[test]
    fn test_search_url_encodes_keyword() {
        let url = MedrxivSearchClient::search_url("artificial intelligence").unwrap();
        assert_eq!(url.as_str(), "https://www.medrxiv.org/search/artificial%20intelligence");
    }
}
