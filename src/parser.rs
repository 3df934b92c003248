use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use crate::{
    config::SearchConfig,
    error::FetchError,
    model::{Link, Paper, SortBy},
};

const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";
const USER_AGENT: &str = concat!("arxiv-weekly/", env!("CARGO_PKG_VERSION"));

/// One bounded page of a search, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub query: String,
    pub offset: usize,
    pub page_size: usize,
    pub sort_by: SortBy,
}

impl PageRequest {
    pub fn from_config(config: &SearchConfig, offset: usize) -> Self {
        PageRequest {
            query: config.query.clone(),
            offset,
            page_size: config.page_size,
            sort_by: config.sort_by,
        }
    }
}

/// A remote paper search. Implementations return `FetchError::EmptyPage`
/// when a page that should hold results comes back empty, and an empty
/// `Vec` once the result set is exhausted.
#[async_trait]
pub trait SearchService: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Paper>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ArxivParser {
    client: Client,
    base_url: String,
}

impl ArxivParser {
    pub fn new(client: Client) -> Self {
        ArxivParser {
            client,
            base_url: ARXIV_API_URL.to_string(),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::new(client))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    fn create_query_url(&self, request: &PageRequest) -> Result<Url, FetchError> {
        Url::parse_with_params(
            &self.base_url,
            &[
                ("search_query", request.query.clone()),
                ("start", request.offset.to_string()),
                ("max_results", request.page_size.to_string()),
                ("sortBy", request.sort_by.as_query_value().to_string()),
                ("sortOrder", "descending".to_string()),
            ],
        )
        .map_err(|e| FetchError::Parse {
            offset: request.offset,
            message: format!("invalid query url: {}", e),
        })
    }
}

#[async_trait]
impl SearchService for ArxivParser {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Paper>, FetchError> {
        let url = self.create_query_url(request)?;
        debug!(%url, "requesting page");
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_page(&body, request.offset)
    }
}

/// Turns one Atom response into papers, telling an exhausted result set
/// apart from the empty-page fault by the feed's `totalResults`.
pub fn parse_page(xml: &str, offset: usize) -> Result<Vec<Paper>, FetchError> {
    let document: ArxivDocument = from_str(xml).map_err(|e| FetchError::Parse {
        offset,
        message: format!("invalid atom feed: {}", e),
    })?;

    if let Some(error) = document.entries.iter().find(|e| e.is_error_report()) {
        return Err(FetchError::Service {
            offset,
            message: collapse_whitespace(&error.summary),
        });
    }

    if document.entries.is_empty() {
        return match document.total_results {
            Some(total) if offset < total.value => Err(FetchError::EmptyPage { offset }),
            _ => Ok(Vec::new()),
        };
    }

    document
        .entries
        .into_iter()
        .map(|entry| {
            entry
                .into_paper()
                .map_err(|message| FetchError::Parse { offset, message })
        })
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad {} timestamp {:?}: {}", field, raw, e))
}

fn short_id(url: &str) -> &str {
    url.trim()
        .split_once("/abs/")
        .map(|(_, id)| id)
        .unwrap_or(url.trim())
}

impl ArxivEntry {
    fn is_error_report(&self) -> bool {
        self.id.contains("arxiv.org/api/errors")
    }

    fn into_paper(self) -> Result<Paper, String> {
        let published = parse_timestamp("published", &self.published)?;
        let updated = parse_timestamp("updated", &self.updated)?;

        Ok(Paper {
            id: short_id(&self.id).to_string(),
            title: collapse_whitespace(&self.title),
            published,
            updated,
            categories: self
                .categories
                .into_iter()
                .map(|c| c.term)
                .filter(|t| !t.is_empty())
                .collect::<BTreeSet<_>>(),
            links: self
                .links
                .into_iter()
                .map(|l| Link {
                    rel: l.rel,
                    href: l.href,
                    title: l.title,
                })
                .collect(),
        })
    }
}

// Arxiv Raw XML Model

#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
struct ArxivDocument {
    #[serde(rename = "opensearch:totalResults", alias = "totalResults")]
    total_results: Option<TotalResults>,
    #[serde(rename = "entry")]
    entries: Vec<ArxivEntry>,
}

#[derive(Debug, Default, PartialEq, Deserialize)]
struct TotalResults {
    #[serde(rename = "$text")]
    value: usize,
}

#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
struct ArxivEntry {
    id: String,
    title: String,
    summary: String,
    published: String,
    updated: String,
    #[serde(rename = "link")]
    links: Vec<LinkField>,
    #[serde(rename = "category")]
    categories: Vec<CategoryField>,
}

#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
struct LinkField {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@rel")]
    rel: String,
    #[serde(rename = "@title")]
    title: Option<String>,
}

#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
struct CategoryField {
    #[serde(rename = "@term")]
    term: String,
}

// end Arxiv Raw XML Model

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <link href="http://arxiv.org/api/query?search_query%3Dcat%3Acs.CV" rel="self" type="application/atom+xml"/>
  <title type="html">ArXiv Query: search_query=cat:cs.CV&amp;id_list=&amp;start=0&amp;max_results=2</title>
  <id>http://arxiv.org/api/abc</id>
  <updated>2024-11-27T00:00:00-05:00</updated>
  <opensearch:totalResults xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">152340</opensearch:totalResults>
  <opensearch:startIndex xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">0</opensearch:startIndex>
  <opensearch:itemsPerPage xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">2</opensearch:itemsPerPage>
  <entry>
    <id>http://arxiv.org/abs/2411.17001v2</id>
    <updated>2024-11-26T18:59:59Z</updated>
    <published>2024-11-25T18:59:59Z</published>
    <title>Sparse Voxels for
  Fast Scene Reconstruction</title>
    <summary>  We propose a method.
    It is fast.
</summary>
    <author>
      <name>Ada Lovelace</name>
    </author>
    <author>
      <name>Alan Turing</name>
    </author>
    <arxiv:comment xmlns:arxiv="http://arxiv.org/schemas/atom">12 pages</arxiv:comment>
    <link href="http://arxiv.org/abs/2411.17001v2" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2411.17001v2" rel="related" type="application/pdf"/>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="cs.CV" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.CV" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.GR" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2411.16002v1</id>
    <updated>2024-11-25T10:00:00Z</updated>
    <published>2024-11-25T10:00:00Z</published>
    <title>A Survey of Things</title>
    <summary>Everything.</summary>
    <author>
      <name>Grace Hopper</name>
    </author>
    <link href="http://arxiv.org/abs/2411.16002v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2411.16002v1" rel="related" type="application/pdf"/>
    <category term="cs.CV" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

    fn empty_feed(total: usize) -> String {
        format!(
            concat!(
                r#"<feed xmlns="http://www.w3.org/2005/Atom">"#,
                r#"<title>ArXiv Query</title>"#,
                r#"<opensearch:totalResults xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">{}</opensearch:totalResults>"#,
                r#"</feed>"#
            ),
            total
        )
    }

    #[test]
    fn test_url_generation() {
        let parser = ArxivParser::new(Client::new());
        let request = PageRequest {
            query: "cat:cs.CV".to_string(),
            offset: 2000,
            page_size: 1000,
            sort_by: SortBy::LastUpdatedDate,
        };
        let url = parser.create_query_url(&request).unwrap();
        assert_eq!(
            url.as_str(),
            concat!(
                "https://export.arxiv.org/api/query",
                "?search_query=cat%3Acs.CV&start=2000&max_results=1000",
                "&sortBy=lastUpdatedDate&sortOrder=descending"
            ),
            "URL improperly formatted"
        );
    }

    #[test]
    fn test_url_encodes_compound_query() {
        let parser = ArxivParser::new(Client::new()).with_base_url("http://localhost:8080/q");
        let request = PageRequest {
            query: "cat:cs.CV AND ti:diffusion".to_string(),
            offset: 0,
            page_size: 50,
            sort_by: SortBy::SubmittedDate,
        };
        let url = parser.create_query_url(&request).unwrap();
        assert_eq!(
            url.as_str(),
            concat!(
                "http://localhost:8080/q",
                "?search_query=cat%3Acs.CV+AND+ti%3Adiffusion&start=0&max_results=50",
                "&sortBy=submittedDate&sortOrder=descending"
            )
        );
    }

    #[test]
    fn test_parse_feed_entries() {
        let papers = parse_page(FEED, 0).unwrap();
        assert_eq!(papers.len(), 2);

        let first = &papers[0];
        assert_eq!(first.id, "2411.17001v2");
        assert_eq!(first.canonical_id(), "2411.17001");
        assert_eq!(first.title, "Sparse Voxels for Fast Scene Reconstruction");
        assert_eq!(
            first.published,
            Utc.with_ymd_and_hms(2024, 11, 25, 18, 59, 59).unwrap()
        );
        assert_eq!(
            first.updated,
            Utc.with_ymd_and_hms(2024, 11, 26, 18, 59, 59).unwrap()
        );
        assert!(first.has_category("cs.CV"));
        assert!(first.has_category("cs.GR"));
        assert_eq!(first.links.len(), 2);
        assert_eq!(first.abstract_link(), Some("http://arxiv.org/abs/2411.17001v2"));
        assert_eq!(first.pdf_link(), Some("http://arxiv.org/pdf/2411.17001v2"));
        assert_eq!(first.links[1].title.as_deref(), Some("pdf"));

        assert_eq!(papers[1].title, "A Survey of Things");
    }

    #[test]
    fn test_empty_page_before_total_is_a_fault() {
        let result = parse_page(&empty_feed(5000), 1000);
        assert!(matches!(result, Err(FetchError::EmptyPage { offset: 1000 })));
    }

    #[test]
    fn test_empty_page_past_total_ends_results() {
        assert!(parse_page(&empty_feed(1000), 1000).unwrap().is_empty());
        assert!(parse_page(&empty_feed(0), 0).unwrap().is_empty());
    }

    #[test]
    fn test_api_error_entry() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <opensearch:totalResults xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">1</opensearch:totalResults>
  <entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format_for_1234</id>
    <title>Error</title>
    <summary>incorrect id format for 1234</summary>
    <updated>2024-11-27T00:00:00-05:00</updated>
    <link href="http://arxiv.org/api/errors#incorrect_id_format_for_1234" rel="alternate" type="text/html"/>
  </entry>
</feed>"#;
        match parse_page(xml, 0) {
            Err(FetchError::Service { offset, message }) => {
                assert_eq!(offset, 0);
                assert_eq!(message, "incorrect id format for 1234");
            }
            other => panic!("expected service error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_xml() {
        assert!(matches!(
            parse_page("<feed><entry>", 40),
            Err(FetchError::Parse { offset: 40, .. })
        ));
    }

    #[test]
    fn test_bad_timestamp_names_offset() {
        let xml = FEED.replace("2024-11-26T18:59:59Z", "yesterday");
        let err = parse_page(&xml, 2000).unwrap_err();
        assert!(matches!(err, FetchError::Parse { offset: 2000, .. }));
        assert!(err.to_string().contains("offset 2000"));
        assert!(err.to_string().contains("yesterday"));
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("http://arxiv.org/abs/2411.17001v2"), "2411.17001v2");
        assert_eq!(short_id("http://arxiv.org/abs/math/0601001v1"), "math/0601001v1");
        assert_eq!(short_id("2411.17001v2"), "2411.17001v2");
    }
}
