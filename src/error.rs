use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no search criteria: provide a query, one or more authors, or both")]
    NoCriteria,

    #[error("max results must be at least 1")]
    ZeroMaxResults,

    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber { key: String, value: String },

    #[error("failed to read env file {path}: {message}")]
    EnvFile { path: PathBuf, message: String },
}

/// Failure of a single API request. Always recoverable at the sub-request level.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("arXiv API returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed feed: {0}")]
    Malformed(String),

    #[error("arXiv API error: {0}")]
    Api(String),
}

/// Reasons a single feed entry could not become a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("entry has no id")]
    MissingId,

    #[error("entry {0} has no title")]
    MissingTitle(String),

    #[error("entry {id} has an invalid published date {value:?}")]
    InvalidDate { id: String, value: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
}

/// Errors that escalate out of a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Render(#[from] RenderError),
}
