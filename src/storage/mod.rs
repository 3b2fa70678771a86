//! Storage module for persisting crawl records
//!
//! This module handles everything the crawler writes:
//! - The [`SnapshotStore`] seam the orchestrator talks to
//! - A SQLite-backed store, one table per collection
//! - The record types that flow into it

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{SnapshotStore, StoreResult};

use crate::config::StoreConfig;
use crate::crawler::ExtractedSummary;
use crate::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opens the store described by `config`
///
/// # Arguments
///
/// * `config` - Connection URI, database name and collection
///
/// # Returns
///
/// * `Ok(SqliteStore)` - Store opened and schema ready
/// * `Err(StoreError)` - Unsupported URI or the database could not be opened
pub fn open_store(config: &StoreConfig) -> Result<SqliteStore, StoreError> {
    SqliteStore::open(config)
}

/// The raw capture of one detail page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Normalized URL that was requested
    pub url: String,

    /// Stable key derived from `url`
    pub canonical_id: String,

    /// URL after redirects
    pub final_url: String,

    /// Full document HTML
    pub raw_html: String,

    /// When the page finished loading
    pub fetched_at: DateTime<Utc>,

    /// HTTP status of the final response
    pub http_status: u16,
}

/// A snapshot plus its derived fields and provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRecord {
    pub snapshot: PageSnapshot,
    pub summary: ExtractedSummary,

    /// Listing page number the link was discovered on
    pub source_page: u32,

    /// When the summary was derived
    pub extracted_at: DateTime<Utc>,
}

impl CrawlRecord {
    /// Builds a record from a snapshot and its extracted summary
    pub fn new(snapshot: PageSnapshot, summary: ExtractedSummary, source_page: u32) -> Self {
        Self {
            snapshot,
            summary,
            source_page,
            extracted_at: Utc::now(),
        }
    }

    /// Storage key of this record
    pub fn canonical_id(&self) -> &str {
        &self.snapshot.canonical_id
    }
}

/// A record as read back from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub record: CrawlRecord,

    /// Set by the first upsert and never changed afterwards
    pub created_at: DateTime<Utc>,

    /// Bumped by every upsert
    pub updated_at: DateTime<Utc>,
}
