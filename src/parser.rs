use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;

use crate::{
    error::{EntryError, FetchError},
    model::{self, PaperRecord},
};

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<id>.+?)(?:v(?P<version>\d+))?$").expect("valid version regex"));
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// One page of search results after validation.
#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub records: Vec<PaperRecord>,
    pub failures: Vec<EntryError>,
    /// entries on the page, valid or not.
    pub entry_count: usize,
    pub total_results: Option<usize>,
}

impl ParsedFeed {
    /// Oldest publication date among the valid records on this page.
    pub fn oldest_date(&self) -> Option<NaiveDate> {
        self.records.iter().map(|r| r.published_date).min()
    }
}

/// Parses an Atom response body. Entries that fail validation are collected
/// in `failures`; only an unreadable body or an API error entry fails the page.
pub fn parse_feed(xml: &str) -> Result<ParsedFeed, FetchError> {
    if !xml.contains("<feed") {
        let mut preview = xml.trim().chars().take(120).collect::<String>();
        if preview.is_empty() {
            preview = String::from("empty body");
        }
        return Err(FetchError::Malformed(format!("not an Atom feed: {}", preview)));
    }
    let document: ArxivDocument =
        from_str(xml).map_err(|e| FetchError::Malformed(e.to_string()))?;

    if let Some(error) = document.entries.iter().find(|e| e.is_api_error()) {
        return Err(FetchError::Api(collapse_whitespace(&error.summary)));
    }

    let total_results = document
        .total_results
        .and_then(|field| field.value.trim().parse::<usize>().ok());
    let entry_count = document.entries.len();
    let mut feed = ParsedFeed {
        entry_count,
        total_results,
        ..ParsedFeed::default()
    };
    for entry in document.entries {
        match entry.into_record() {
            Ok(record) => feed.records.push(record),
            Err(e) => feed.failures.push(e),
        }
    }
    Ok(feed)
}

/// Splits `http://arxiv.org/abs/2507.01234v2` into `("2507.01234", Some(2))`.
pub fn split_id(raw: &str) -> (String, Option<u32>) {
    let raw = raw.trim();
    let tail = raw
        .split_once("/abs/")
        .map(|(_, tail)| tail)
        .unwrap_or(raw);
    let tail = tail.strip_prefix("arXiv:").unwrap_or(tail);
    match VERSION_RE.captures(tail) {
        Some(caps) => {
            let id = caps.name("id").map(|m| m.as_str()).unwrap_or(tail);
            let version = caps
                .name("version")
                .and_then(|m| m.as_str().parse::<u32>().ok());
            (id.to_string(), version)
        }
        None => (tail.to_string(), None),
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .ok()
}

// Arxiv Raw XML Model

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ArxivDocument {
    #[serde(rename = "totalResults", alias = "opensearch:totalResults")]
    total_results: Option<TextField>,
    #[serde(rename = "entry")]
    entries: Vec<ArxivEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ArxivEntry {
    id: String,
    title: String,
    summary: String,
    published: String,
    updated: String,
    #[serde(rename = "author")]
    authors: Vec<AuthorField>,
    #[serde(rename = "link")]
    links: Vec<LinkField>,
    #[serde(rename = "category")]
    categories: Vec<CategoryField>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuthorField {
    name: TextField,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TextField {
    #[serde(rename = "$text")]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LinkField {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@title")]
    title: Option<String>,
    #[serde(rename = "@type")]
    link_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CategoryField {
    #[serde(rename = "@term")]
    term: String,
}

impl ArxivEntry {
    fn is_api_error(&self) -> bool {
        self.id.contains("/api/errors")
    }

    fn into_record(self) -> Result<PaperRecord, EntryError> {
        if self.id.trim().is_empty() {
            return Err(EntryError::MissingId);
        }
        let (id, version) = split_id(&self.id);

        let title = collapse_whitespace(&self.title);
        if title.is_empty() {
            return Err(EntryError::MissingTitle(id));
        }
        let published_date = match parse_date(&self.published) {
            Some(date) => date,
            None => {
                return Err(EntryError::InvalidDate {
                    id,
                    value: self.published,
                })
            }
        };

        let authors = self.authors
            .into_iter()
            .map(|a| collapse_whitespace(&a.name.value))
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>();
        let pdf_link = self.links
            .into_iter()
            .find(|link| {
                link.title.as_deref() == Some("pdf")
                    || link.link_type.as_deref() == Some("application/pdf")
            })
            .map(|link| link.href)
            .filter(|href| !href.is_empty());
        let categories = self.categories
            .into_iter()
            .map(|c| c.term)
            .filter(|term| !term.is_empty())
            .collect::<Vec<_>>();

        let mut record = PaperRecord::new(
            id,
            title,
            authors,
            published_date,
            collapse_whitespace(&self.summary),
        );
        record.version = version;
        record.updated_date = parse_date(&self.updated);
        record.categories = categories;
        record.pdf_url = Some(pdf_link.unwrap_or_else(|| model::pdf_url(&record.id)));
        Ok(record)
    }
}

// end Arxiv Raw XML Model
