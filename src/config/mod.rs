//! Configuration module for Vehicle-Crawl
//!
//! Settings come from the environment (optionally seeded from a `.env`
//! file), are parsed into a typed [`Config`], and validated once at startup.
//!
//! # Example
//!
//! ```no_run
//! use vehicle_crawl::config::load_config;
//!
//! let config = load_config(None).unwrap();
//! println!("Crawling {} with {} contexts", config.site.base_url, config.crawler.concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, SiteConfig, StoreConfig};

// Re-export parser functions
pub use parser::{
    compute_config_hash, from_lookup, load_config, load_config_with_overrides, DEFAULT_BASE_URL,
};
