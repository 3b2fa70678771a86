//! Vehicle-Crawl: a resumable crawler for new-car listing sites
//!
//! This crate paginates a site's new-car search results, opens every detail
//! page in an isolated browsing context, extracts a small structured summary,
//! and upserts one record per detail URL into a document store.

pub mod browser;
pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Navigation error: {0}")]
    Navigation(#[from] FetchError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::CrawlState,
        to: state::CrawlState,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Failed to load env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// A page failed to load
///
/// Every variant carries the URL that was being navigated so the orchestrator
/// can report and retry per link.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Timed out loading {url} after {elapsed_ms}ms")]
    Timeout { url: String, elapsed_ms: u64 },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Could not open browsing context for {url}: {message}")]
    Context { url: String, message: String },
}

impl FetchError {
    /// The URL that failed to load
    pub fn url(&self) -> &str {
        match self {
            Self::Timeout { url, .. }
            | Self::Status { url, .. }
            | Self::Network { url, .. }
            | Self::Context { url, .. } => url,
        }
    }

    /// Returns true if another attempt could plausibly succeed
    ///
    /// Timeouts, network failures, HTTP 429 and 5xx are transient. Other
    /// statuses (404, 410, ...) and context failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Context { .. } => false,
        }
    }
}

/// Errors reported by a snapshot store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid store location: {0}")]
    InvalidLocation(String),

    #[error("Write rejected for {canonical_id}: {message}")]
    WriteRejected {
        canonical_id: String,
        message: String,
    },

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store connection lock poisoned")]
    Poisoned,

    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// Re-export commonly used types
pub use config::Config;
pub use state::CrawlState;
pub use url::{canonical_id, normalize_url};
