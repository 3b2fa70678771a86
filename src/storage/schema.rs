//! Database schema definitions
//!
//! Each collection is one table. The table name comes from configuration and
//! has already been checked to be a plain identifier.

/// Builds the schema SQL for a collection table
pub fn schema_sql(collection: &str) -> String {
    format!(
        r#"
-- One row per detail page, keyed by the hash of its normalized URL
CREATE TABLE IF NOT EXISTS {table} (
    canonical_id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    final_url TEXT NOT NULL,
    raw_html TEXT NOT NULL,
    http_status INTEGER NOT NULL,
    fetched_at TEXT NOT NULL,
    title TEXT,
    price TEXT,
    price_amount INTEGER,
    attributes TEXT NOT NULL DEFAULT '{{}}',
    summary TEXT NOT NULL,
    source_page INTEGER NOT NULL,
    extracted_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{table}_url ON {table}(url);
CREATE INDEX IF NOT EXISTS idx_{table}_updated ON {table}(updated_at);
"#,
        table = collection
    )
}

/// Initializes the schema for `collection`
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(
    conn: &rusqlite::Connection,
    collection: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute_batch(&schema_sql(collection))?;
    Ok(())
}
