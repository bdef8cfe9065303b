//! Error types shared across Folio crates

use thiserror::Error;

/// Folio-wide error type
#[derive(Error, Debug)]
pub enum FolioError {
    #[error("Market data error: {0}")]
    MarketData(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FolioError {
    pub fn market_data(msg: impl Into<String>) -> Self {
        FolioError::MarketData(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        FolioError::Config(msg.into())
    }
}

/// Result type alias for Folio operations
pub type FolioResult<T> = Result<T, FolioError>;
