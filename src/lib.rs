//! Catalog-Sync: a rate-limited catalog ingestion pipeline
//!
//! This crate keeps a local SQLite catalog in step with a remote record
//! service. Items are fetched through a sliding-window rate limiter and a
//! retrying fetcher, their release labels are classified into structured
//! metadata, poster assets are re-encoded on a bounded worker pool, and a
//! sync cursor decides what is due on the next run.

pub mod classify;
pub mod config;
pub mod output;
pub mod storage;
pub mod sync;

use thiserror::Error;

/// Main error type for Catalog-Sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Failed to commit batch {batch}: {source}")]
    Persistence {
        batch: usize,
        source: storage::StorageError,
    },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("API key not configured (set api-key or the {0} environment variable)")]
    MissingApiKey(String),
}

/// Result type alias for Catalog-Sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use classify::{classify, ClassifiedMetadata, Codec, HdrType};
pub use config::Config;
pub use storage::{ItemKind, WorkItem};
pub use sync::{Coordinator, FetchOutcome, RunSummary};
