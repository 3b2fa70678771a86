//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of [`SnapshotStore`].
//!
//! rusqlite is synchronous, so every trait call runs on tokio's blocking
//! pool and a slow write never stalls the detail workers.

use crate::config::StoreConfig;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{SnapshotStore, StoreResult};
use crate::storage::{CrawlRecord, PageSnapshot, StoredRecord};
use crate::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// URI selecting a private in-memory database
pub const MEMORY_URI: &str = "sqlite::memory:";

const FILE_URI_PREFIX: &str = "sqlite://";

/// SQLite storage backend
///
/// Cloning is cheap; clones share one connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    collection: String,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens the store described by `config`
    ///
    /// `sqlite::memory:` opens a private in-memory database. `sqlite://<dir>`
    /// opens (creating if needed) `<dir>/<database_name>.sqlite3`.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let conn = match database_path(config)? {
            None => Connection::open_in_memory()?,
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let conn = Connection::open(&path)?;

                conn.execute_batch(
                    "
                    PRAGMA journal_mode = WAL;
                    PRAGMA synchronous = NORMAL;
                    PRAGMA temp_store = MEMORY;
                ",
                )?;

                tracing::debug!("Opened store at {}", path.display());
                conn
            }
        };

        Self::from_connection(conn, &config.collection)
    }

    /// Creates an in-memory store (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, "new_cars")
    }

    fn from_connection(conn: Connection, collection: &str) -> Result<Self, StoreError> {
        initialize_schema(&conn, collection)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            collection: collection.to_string(),
        })
    }

    /// Name of the table records are written to
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Runs `op` against a clone of this store on the blocking pool
    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteStore) -> StoreResult<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store)).await?
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn upsert_sync(&self, record: &CrawlRecord) -> StoreResult<()> {
        let attributes = serde_json::to_string(&record.summary.attributes)?;
        let summary = serde_json::to_string(&record.summary)?;
        let now = Utc::now().to_rfc3339();
        let snapshot = &record.snapshot;

        let conn = self.lock()?;
        let changed = conn.execute(
            &format!(
                "INSERT INTO {table} (
                    canonical_id, url, final_url, raw_html, http_status, fetched_at,
                    title, price, price_amount, attributes, summary,
                    source_page, extracted_at, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
                 ON CONFLICT(canonical_id) DO UPDATE SET
                    url = excluded.url,
                    final_url = excluded.final_url,
                    raw_html = excluded.raw_html,
                    http_status = excluded.http_status,
                    fetched_at = excluded.fetched_at,
                    title = excluded.title,
                    price = excluded.price,
                    price_amount = excluded.price_amount,
                    attributes = excluded.attributes,
                    summary = excluded.summary,
                    source_page = excluded.source_page,
                    extracted_at = excluded.extracted_at,
                    updated_at = excluded.updated_at",
                table = self.collection
            ),
            params![
                snapshot.canonical_id,
                snapshot.url,
                snapshot.final_url,
                snapshot.raw_html,
                snapshot.http_status,
                snapshot.fetched_at.to_rfc3339(),
                record.summary.title,
                record.summary.price,
                record.summary.price_amount.and_then(|amount| i64::try_from(amount).ok()),
                attributes,
                summary,
                record.source_page,
                record.extracted_at.to_rfc3339(),
                now,
            ],
        )?;

        if changed != 1 {
            return Err(StoreError::WriteRejected {
                canonical_id: snapshot.canonical_id.clone(),
                message: format!("{} rows affected", changed),
            });
        }

        Ok(())
    }

    fn has_sync(&self, canonical_id: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE canonical_id = ?1", self.collection),
                params![canonical_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn get_sync(&self, canonical_id: &str) -> StoreResult<Option<StoredRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT canonical_id, url, final_url, raw_html, http_status, fetched_at,
                     summary, source_page, extracted_at, created_at, updated_at
                     FROM {} WHERE canonical_id = ?1",
                    self.collection
                ),
                params![canonical_id],
                |row| {
                    Ok(RawRow {
                        canonical_id: row.get(0)?,
                        url: row.get(1)?,
                        final_url: row.get(2)?,
                        raw_html: row.get(3)?,
                        http_status: row.get(4)?,
                        fetched_at: row.get(5)?,
                        summary: row.get(6)?,
                        source_page: row.get(7)?,
                        extracted_at: row.get(8)?,
                        created_at: row.get(9)?,
                        updated_at: row.get(10)?,
                    })
                },
            )
            .optional()?;
        drop(conn);

        row.map(RawRow::into_stored).transpose()
    }

    fn count_sync(&self) -> StoreResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.collection),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn upsert(&self, record: &CrawlRecord) -> StoreResult<()> {
        let record = record.clone();
        self.blocking(move |store| store.upsert_sync(&record)).await
    }

    async fn has(&self, canonical_id: &str) -> StoreResult<bool> {
        let canonical_id = canonical_id.to_string();
        self.blocking(move |store| store.has_sync(&canonical_id)).await
    }

    async fn get(&self, canonical_id: &str) -> StoreResult<Option<StoredRecord>> {
        let canonical_id = canonical_id.to_string();
        self.blocking(move |store| store.get_sync(&canonical_id)).await
    }

    async fn count(&self) -> StoreResult<u64> {
        self.blocking(|store| store.count_sync()).await
    }
}

/// Resolves the database file for `config`, or None for in-memory
fn database_path(config: &StoreConfig) -> Result<Option<PathBuf>, StoreError> {
    let uri = config.connection_uri.trim();

    if uri == MEMORY_URI {
        return Ok(None);
    }

    let Some(directory) = uri.strip_prefix(FILE_URI_PREFIX) else {
        return Err(StoreError::InvalidLocation(format!(
            "unsupported store URI '{}'; expected '{}' or '{}<directory>'",
            uri, MEMORY_URI, FILE_URI_PREFIX
        )));
    };

    if directory.is_empty() {
        return Err(StoreError::InvalidLocation(
            "store URI has no directory".to_string(),
        ));
    }

    Ok(Some(
        Path::new(directory).join(format!("{}.sqlite3", config.database_name)),
    ))
}

struct RawRow {
    canonical_id: String,
    url: String,
    final_url: String,
    raw_html: String,
    http_status: u16,
    fetched_at: String,
    summary: String,
    source_page: u32,
    extracted_at: String,
    created_at: String,
    updated_at: String,
}

impl RawRow {
    fn into_stored(self) -> StoreResult<StoredRecord> {
        let record = CrawlRecord {
            snapshot: PageSnapshot {
                url: self.url,
                canonical_id: self.canonical_id,
                final_url: self.final_url,
                raw_html: self.raw_html,
                fetched_at: parse_timestamp(&self.fetched_at)?,
                http_status: self.http_status,
            },
            summary: serde_json::from_str(&self.summary)?,
            source_page: self.source_page,
            extracted_at: parse_timestamp(&self.extracted_at)?,
        };

        Ok(StoredRecord {
            record,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fixtures::record;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    const CAMRY: &str = "https://ksa.yallamotor.com/new-cars/toyota-camry-2024";
    const CIVIC: &str = "https://ksa.yallamotor.com/new-cars/honda-civic-2024";

    fn file_config(dir: &TempDir) -> StoreConfig {
        StoreConfig {
            connection_uri: format!("sqlite://{}", dir.path().display()),
            database_name: "vehicles".to_string(),
            collection: "new_cars".to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_then_get() {
        let store = SqliteStore::new_in_memory().unwrap();
        let camry = record(CAMRY, "Toyota Camry 2024");

        store.upsert(&camry).await.unwrap();

        let stored = store.get(camry.canonical_id()).await.unwrap().unwrap();
        assert_eq!(stored.record, camry);
        assert!(store.has(camry.canonical_id()).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_keeps_created_at() {
        let store = SqliteStore::new_in_memory().unwrap();
        let first = record(CAMRY, "Camry");
        store.upsert(&first).await.unwrap();
        let before = store.get(first.canonical_id()).await.unwrap().unwrap();

        let mut second = record(CAMRY, "Camry (updated)");
        second.source_page = 3;
        store.upsert(&second).await.unwrap();
        let after = store.get(second.canonical_id()).await.unwrap().unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(after.record.summary.title.as_deref(), Some("Camry (updated)"));
        assert_eq!(after.record.source_page, 3);
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at >= before.updated_at);
    }

    #[tokio::test]
    async fn test_missing_record() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(!store.has("nope").await.unwrap());
        assert!(store.get("nope").await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_attributes_column_is_json() {
        let store = SqliteStore::new_in_memory().unwrap();
        let mut camry = record(CAMRY, "Camry");
        camry
            .summary
            .attributes
            .insert("Engine".to_string(), "2.5L".to_string());
        store.upsert(&camry).await.unwrap();

        let conn = store.lock().unwrap();
        let raw: String = conn
            .query_row(
                "SELECT attributes FROM new_cars WHERE canonical_id = ?1",
                [camry.canonical_id()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(raw, r#"{"Engine":"2.5L"}"#);
    }

    #[tokio::test]
    async fn test_oversized_price_amount_stored_as_null() {
        let store = SqliteStore::new_in_memory().unwrap();
        let mut camry = record(CAMRY, "Camry");
        camry.summary.price_amount = Some(u64::MAX);
        store.upsert(&camry).await.unwrap();

        let column: Option<i64> = store
            .lock()
            .unwrap()
            .query_row(
                "SELECT price_amount FROM new_cars WHERE canonical_id = ?1",
                [camry.canonical_id()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(column, None);

        // The full value survives in the summary JSON
        let stored = store.get(camry.canonical_id()).await.unwrap().unwrap();
        assert_eq!(stored.record.summary.price_amount, Some(u64::MAX));
    }

    #[tokio::test]
    async fn test_waiting_write_does_not_stall_runtime() {
        let store = SqliteStore::new_in_memory().unwrap();
        let held = store.clone();
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();

        let holder = std::thread::spawn(move || {
            let _guard = held.lock().unwrap();
            locked_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(300));
        });
        locked_rx.recv().unwrap();

        let write = {
            let store = store.clone();
            tokio::spawn(async move { store.upsert(&record(CAMRY, "Camry")).await })
        };

        // The write is parked on the connection; other tasks keep running
        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(started.elapsed() < Duration::from_millis(200));

        write.await.unwrap().unwrap();
        holder.join().unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_file_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let config = file_config(&dir);

        {
            let store = SqliteStore::open(&config).unwrap();
            store.upsert(&record(CAMRY, "Camry")).await.unwrap();
            store.upsert(&record(CIVIC, "Civic")).await.unwrap();
        }

        assert!(dir.path().join("vehicles.sqlite3").exists());

        let reopened = SqliteStore::open(&config).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_collections_are_separate_tables() {
        let dir = TempDir::new().unwrap();
        let new_cars = SqliteStore::open(&file_config(&dir)).unwrap();
        let mut other = file_config(&dir);
        other.collection = "archive".to_string();
        let archive = SqliteStore::open(&other).unwrap();

        new_cars.upsert(&record(CAMRY, "Camry")).await.unwrap();

        assert_eq!(new_cars.count().await.unwrap(), 1);
        assert_eq!(archive.count().await.unwrap(), 0);
        assert_eq!(archive.collection(), "archive");
    }

    #[test]
    fn test_database_path_forms() {
        let mut config = StoreConfig {
            connection_uri: MEMORY_URI.to_string(),
            database_name: "vehicles".to_string(),
            collection: "new_cars".to_string(),
        };
        assert_eq!(database_path(&config).unwrap(), None);

        config.connection_uri = "sqlite:///var/lib/crawl".to_string();
        assert_eq!(
            database_path(&config).unwrap(),
            Some(PathBuf::from("/var/lib/crawl/vehicles.sqlite3"))
        );

        config.connection_uri = "sqlite://".to_string();
        assert!(database_path(&config).is_err());
    }
}
