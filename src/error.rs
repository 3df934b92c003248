use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load env file {path}: {message}")]
    EnvFile { path: String, message: String },
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidVar {
        key: String,
        value: String,
        reason: String,
    },
    #[error("failed to read boring words from {}: {source}", .path.display())]
    BoringWords {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ConfigError {
    pub fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidVar {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// The service returned no entries for a page that should have some.
    #[error("unexpectedly empty page at offset {offset}")]
    EmptyPage { offset: usize },
    #[error("page at offset {offset} still empty after {attempts} attempts")]
    RetriesExhausted { offset: usize, attempts: u32 },
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to parse page at offset {offset}: {message}")]
    Parse { offset: usize, message: String },
    #[error("search service error at offset {offset}: {message}")]
    Service { offset: usize, message: String },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
