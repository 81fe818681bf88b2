use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// one paper as stored in papers.json and shown on the page.
// optional fields may be missing in stores written by older builds.

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PaperRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub published_date: NaiveDate,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
}

impl PaperRecord {
    pub fn new(
        id: String,
        title: String,
        authors: Vec<String>,
        published_date: NaiveDate,
        abstract_text: String,
    ) -> Self {
        let url = abs_url(&id);
        PaperRecord {
            id,
            title,
            authors,
            published_date,
            abstract_text,
            url,
            version: None,
            updated_date: None,
            categories: Vec::new(),
            pdf_url: None,
        }
    }
}

pub fn abs_url(id: &str) -> String {
    format!("https://arxiv.org/abs/{}", id)
}

pub fn pdf_url(id: &str) -> String {
    format!("https://arxiv.org/pdf/{}", id)
}
