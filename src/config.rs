use std::{env, path::PathBuf, time::Duration};

use crate::error::ConfigError;

pub const ENV_FILE: &str = "paperwatch.env";
pub const DEFAULT_BASE_URL: &str = "https://export.arxiv.org/api/query";
pub const DEFAULT_STORE_PATH: &str = "papers.json";
pub const DEFAULT_OUTPUT_PATH: &str = "index.html";
pub const DEFAULT_DAYS_BACK: u32 = 60;
pub const DEFAULT_MAX_RESULTS: usize = 100;

/// Settings for talking to the arXiv API.
#[derive(Debug, Clone)]
pub struct ArxivConfig {
    pub base_url: String,
    /// entries requested per page.
    pub page_size: usize,
    /// attempts per request, including the first one.
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// minimum spacing between consecutive requests.
    pub request_interval: Duration,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        ArxivConfig {
            base_url: String::from(DEFAULT_BASE_URL),
            page_size: 100,
            max_attempts: 3,
            retry_delay: Duration::from_secs(3),
            request_interval: Duration::from_secs(3),
            timeout: Duration::from_secs(30),
            user_agent: format!("paperwatch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ArxivConfig {
    /// Defaults overridden by `ARXIV_*` variables, after loading `paperwatch.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_env_file()?;
        let mut config = Self::default();
        if let Ok(base_url) = env::var("ARXIV_BASE_URL") {
            if !base_url.trim().is_empty() {
                config.base_url = base_url.trim().to_string();
            }
        }
        if let Some(page_size) = get_positive_from_env("ARXIV_PAGE_SIZE")? {
            config.page_size = page_size as usize;
        }
        if let Some(attempts) = get_positive_from_env("ARXIV_MAX_ATTEMPTS")? {
            config.max_attempts = attempts as u32;
        }
        if let Some(secs) = get_positive_from_env("ARXIV_RETRY_DELAY_SECS")? {
            config.retry_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = get_positive_from_env("ARXIV_REQUEST_INTERVAL_SECS")? {
            config.request_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = get_positive_from_env("ARXIV_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

fn load_env_file() -> Result<(), ConfigError> {
    match dotenvy::from_filename(ENV_FILE) {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(ConfigError::EnvFile {
            path: PathBuf::from(ENV_FILE),
            message: e.to_string(),
        }),
    }
}

fn get_positive_from_env(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(raw) => parse_positive(key, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidNumber {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// Authors listed in `TARGET_AUTHORS`, separated by `;` so "Last, First" names survive.
pub fn target_authors_from_env() -> Vec<String> {
    env::var("TARGET_AUTHORS")
        .map(|raw| split_authors(&raw, ';'))
        .unwrap_or_default()
}

pub fn split_authors(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

/// What a single run searches for and where it writes.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryConfig {
    pub query: Option<String>,
    pub authors: Vec<String>,
    pub days_back: u32,
    pub max_results: usize,
    pub output: PathBuf,
    pub store: PathBuf,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            query: None,
            authors: Vec::new(),
            days_back: DEFAULT_DAYS_BACK,
            max_results: DEFAULT_MAX_RESULTS,
            output: PathBuf::from(DEFAULT_OUTPUT_PATH),
            store: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

impl QueryConfig {
    /// Blank queries and blank author names are dropped.
    pub fn new(
        query: Option<String>,
        authors: Vec<String>,
        days_back: u32,
        max_results: usize,
        output: PathBuf,
        store: PathBuf,
    ) -> Self {
        let query = query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());
        let authors = authors
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        QueryConfig {
            query,
            authors,
            days_back,
            max_results,
            output,
            store,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query.is_none() && self.authors.is_empty() {
            return Err(ConfigError::NoCriteria);
        }
        if self.max_results == 0 {
            return Err(ConfigError::ZeroMaxResults);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PageConfig {
    pub title: String,
    /// authors shown before collapsing the rest into "and N others".
    pub max_authors: usize,
}

impl Default for PageConfig {
    fn default() -> Self {
        PageConfig {
            title: String::from("Recent arXiv Papers"),
            max_authors: 5,
        }
    }
}
