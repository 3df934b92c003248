use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};

static VERSION_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"v\d+$").unwrap());
static ABSTRACT_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://[^/]+/abs/").unwrap());
static PDF_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://[^/]+/pdf/").unwrap());

/// Which of a paper's two timestamps a comparison looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampField {
    Published,
    Updated,
}

impl FromStr for TimestampField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "published" => Ok(TimestampField::Published),
            "updated" => Ok(TimestampField::Updated),
            other => Err(format!("expected `published` or `updated`, got `{}`", other)),
        }
    }
}

/// Ordering requested from the search service. Results always come newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    LastUpdatedDate,
    SubmittedDate,
}

impl SortBy {
    pub fn as_query_value(&self) -> &'static str {
        match self {
            SortBy::LastUpdatedDate => "lastUpdatedDate",
            SortBy::SubmittedDate => "submittedDate",
        }
    }

    /// The timestamp the service orders by; the fetcher's stopping rule
    /// is only sound when it compares this field.
    pub fn natural_field(&self) -> TimestampField {
        match self {
            SortBy::LastUpdatedDate => TimestampField::Updated,
            SortBy::SubmittedDate => TimestampField::Published,
        }
    }
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "lastUpdatedDate" => Ok(SortBy::LastUpdatedDate),
            "submittedDate" => Ok(SortBy::SubmittedDate),
            other => Err(format!(
                "expected `lastUpdatedDate` or `submittedDate`, got `{}`",
                other
            )),
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query_value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub rel: String,
    pub href: String,
    pub title: Option<String>,
}

impl Link {
    pub fn new(rel: &str, href: &str, title: Option<&str>) -> Self {
        Link {
            rel: rel.to_string(),
            href: href.to_string(),
            title: title.map(String::from),
        }
    }
}

// one fetched arXiv entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Paper {
    pub id: String,
    pub title: String,
    pub published: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub categories: BTreeSet<String>,
    pub links: Vec<Link>,
}

impl Paper {
    /// The id with any trailing version suffix (`v2`) removed.
    pub fn canonical_id(&self) -> &str {
        canonical_id(&self.id)
    }

    pub fn timestamp(&self, field: TimestampField) -> DateTime<Utc> {
        match field {
            TimestampField::Published => self.published,
            TimestampField::Updated => self.updated,
        }
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.contains(category)
    }

    pub fn abstract_link(&self) -> Option<&str> {
        self.first_link_matching(&ABSTRACT_URL)
    }

    pub fn pdf_link(&self) -> Option<&str> {
        self.first_link_matching(&PDF_URL)
    }

    fn first_link_matching(&self, pattern: &Regex) -> Option<&str> {
        self.links
            .iter()
            .find(|link| pattern.is_match(&link.href))
            .map(|link| link.href.as_str())
    }
}

pub fn canonical_id(id: &str) -> &str {
    match VERSION_SUFFIX.find(id) {
        Some(m) => &id[..m.start()],
        None => id,
    }
}

/// One line of the weekly table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    pub title: String,
    pub abstract_link: Option<String>,
    pub pdf_link: Option<String>,
    #[serde(serialize_with = "serialize_utc")]
    pub published: DateTime<Utc>,
}

impl OutputRow {
    pub fn from_paper(paper: &Paper) -> Self {
        OutputRow {
            title: paper.title.clone(),
            abstract_link: paper.abstract_link().map(String::from),
            pdf_link: paper.pdf_link().map(String::from),
            published: paper.published,
        }
    }
}

pub fn format_utc(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn serialize_utc<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_utc(ts))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn paper(id: &str, links: Vec<Link>) -> Paper {
        let ts = Utc.with_ymd_and_hms(2024, 11, 25, 12, 0, 0).unwrap();
        Paper {
            id: id.to_string(),
            title: "Title".to_string(),
            published: ts,
            updated: ts,
            categories: BTreeSet::from(["cs.CV".to_string()]),
            links,
        }
    }

    #[test]
    fn test_canonical_id_strips_version() {
        assert_eq!(canonical_id("2401.01234v2"), "2401.01234");
        assert_eq!(canonical_id("2401.01234v12"), "2401.01234");
        assert_eq!(canonical_id("math.AG/0601001v1"), "math.AG/0601001");
        assert_eq!(canonical_id("2401.01234"), "2401.01234");
        assert_eq!(canonical_id("B"), "B");
    }

    #[test]
    fn test_links_by_url_shape() {
        let p = paper("2411.00001v1", vec![
            Link::new("related", "http://dx.doi.org/10.1000/xyz", Some("doi")),
            Link::new("alternate", "http://arxiv.org/abs/2411.00001v1", None),
            Link::new("related", "http://arxiv.org/pdf/2411.00001v1", Some("pdf")),
        ]);
        assert_eq!(p.abstract_link(), Some("http://arxiv.org/abs/2411.00001v1"));
        assert_eq!(p.pdf_link(), Some("http://arxiv.org/pdf/2411.00001v1"));

        let bare = paper("2411.00002v1", vec![]);
        assert_eq!(bare.abstract_link(), None);
        assert_eq!(bare.pdf_link(), None);
    }

    #[test]
    fn test_sort_by_natural_field() {
        assert_eq!(SortBy::LastUpdatedDate.natural_field(), TimestampField::Updated);
        assert_eq!(SortBy::SubmittedDate.natural_field(), TimestampField::Published);
        assert_eq!("submittedDate".parse::<SortBy>(), Ok(SortBy::SubmittedDate));
        assert!("newest".parse::<SortBy>().is_err());
        assert_eq!("Updated".parse::<TimestampField>(), Ok(TimestampField::Updated));
    }

    #[test]
    fn test_published_serializes_as_utc_seconds() {
        let ts = Utc.with_ymd_and_hms(2024, 11, 26, 0, 0, 0).unwrap();
        assert_eq!(format_utc(&ts), "2024-11-26T00:00:00Z");
    }
}
