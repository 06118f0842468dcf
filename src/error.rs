// Media Vault Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Quota exceeded: storing {needed} more bytes would put the library over its {budget} byte budget")]
    QuotaExceeded { needed: u64, budget: u64 },

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Duplicate asset hash: {0}")]
    DuplicateHash(String),

    #[error("FFprobe error: {0}")]
    FFprobe(String),

    #[error("FFmpeg error: {0}")]
    FFmpeg(String),

    #[error("{label} timed out after {timeout_ms}ms")]
    Timeout { label: String, timeout_ms: u64 },

    #[error("{label} failed after {retries} retries: {source}")]
    RetryExhausted {
        label: String,
        retries: u32,
        source: Box<VaultError>,
    },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Repository is disposed")]
    Disposed,

    #[error("{0}")]
    Other(String),
}

impl From<image::ImageError> for VaultError {
    fn from(err: image::ImageError) -> Self {
        VaultError::Decode(err.to_string())
    }
}

impl From<anyhow::Error> for VaultError {
    fn from(err: anyhow::Error) -> Self {
        VaultError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
