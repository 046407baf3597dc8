// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = CensusError> = std::result::Result<T, E>;

/// Every failure the library surfaces. Parse-level problems (a single field
/// that is not a number) never reach this type; they become nulls.
#[derive(Debug, Error)]
pub enum CensusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] duckdb::Error),

    /// Another process holds the write lock on the database file.
    /// Query through the remote service instead.
    #[error("store at {path} is busy: another process holds the write lock")]
    StoreBusy { path: PathBuf },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote query to {url} failed with status {status}: {body}")]
    RemoteStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("malformed payload from {url}: {source}")]
    MalformedPayload {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid key \"{key}\" for option \"{leaf}\"")]
    UnknownAliasKey { key: String, leaf: String },

    #[error("no alias at path \"{0}\"")]
    UnknownAliasPath(String),

    #[error("alias \"{0}\" is not callable")]
    NotCallable(String),

    #[error("alias \"{0}\" takes no keys")]
    UnexpectedKeys(String),

    #[error("invalid alias definition: {0}")]
    InvalidDefinition(String),

    #[error("invalid GeoID pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("unsupported source file {0}")]
    UnsupportedSource(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<serde_yaml::Error> for CensusError {
    fn from(e: serde_yaml::Error) -> Self {
        CensusError::InvalidDefinition(e.to_string())
    }
}
