use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Feed parse error: {0}")]
    Feed(#[from] feed_rs::parser::ParseFeedError),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("No curator registered for provider '{0}'")]
    UnknownProvider(String),

    #[error("Curator '{expected}' was handed a strategy for '{actual}'")]
    ProviderMismatch { expected: String, actual: String },

    #[error("{provider} API error: {message}")]
    Provider { provider: String, message: String },

    #[error("Extraction failed for {url}: {reason}")]
    Extraction { url: String, reason: String },

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Dispatch cycle exceeded {0:?}")]
    CycleTimeout(Duration),
}

impl AppError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
