//! Storage traits
//!
//! The orchestrator only sees [`SnapshotStore`]; the concrete backend is
//! chosen at startup.

use crate::storage::{CrawlRecord, StoredRecord};
use crate::StoreError;
use async_trait::async_trait;

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// A document store holding at most one record per canonical id
///
/// Implementations must be safe to share across the worker tasks of a
/// crawl; every method takes `&self`.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Inserts a record or replaces the existing one with the same id
    ///
    /// Replacing keeps the original creation timestamp.
    async fn upsert(&self, record: &CrawlRecord) -> StoreResult<()>;

    /// Returns true if a record with this id exists
    async fn has(&self, canonical_id: &str) -> StoreResult<bool>;

    /// Loads a record by id
    async fn get(&self, canonical_id: &str) -> StoreResult<Option<StoredRecord>>;

    /// Counts stored records
    async fn count(&self) -> StoreResult<u64>;
}
