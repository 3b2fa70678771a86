use serde::Serialize;

/// Main configuration structure for a crawl run
///
/// Built once at startup and passed into the orchestrator; nothing in the
/// crawl core reads the environment directly.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub site: SiteConfig,
    pub crawler: CrawlerConfig,
    pub store: StoreConfig,
}

/// Target site configuration
#[derive(Debug, Clone, Serialize)]
pub struct SiteConfig {
    /// Site root, e.g. `https://ksa.yallamotor.com`
    pub base_url: String,

    /// User agent sent by every browsing context
    pub user_agent: String,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Serialize)]
pub struct CrawlerConfig {
    /// Last listing page to visit; `None` means paginate until an empty page
    pub max_pages: Option<u32>,

    /// Maximum number of browsing contexts open at once
    pub concurrency: u32,

    /// Skip detail pages whose canonical id is already stored
    pub skip_existing: bool,

    /// Ceiling for a single page load (milliseconds)
    pub request_timeout_ms: u64,

    /// Quiet window after a load completes before content is captured (milliseconds)
    pub settle_ms: u64,

    /// Retries for a transient navigation failure, after the first attempt
    pub max_retries: u32,

    /// Initial retry backoff (milliseconds); doubles on every retry
    pub retry_backoff_ms: u64,

    /// When set, the CLI re-runs the crawl after sleeping this many hours
    pub repeat_interval_hours: Option<u64>,
}

/// Document store configuration
#[derive(Debug, Clone, Serialize)]
pub struct StoreConfig {
    /// `sqlite::memory:` or `sqlite://<directory>`
    pub connection_uri: String,

    /// Database name; selects the database file inside the store directory
    pub database_name: String,

    /// Collection (table) holding crawl records
    pub collection: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: Some(50),
            concurrency: 4,
            skip_existing: false,
            request_timeout_ms: 45_000,
            settle_ms: 250,
            max_retries: 3,
            retry_backoff_ms: 500,
            repeat_interval_hours: None,
        }
    }
}
