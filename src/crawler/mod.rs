//! Crawler module for listing pagination and detail page processing
//!
//! This module contains the core crawling logic, including:
//! - Detail link extraction from listing pages
//! - Page fetching through a bounded pool of browsing contexts
//! - Field extraction from detail pages
//! - Overall crawl orchestration

mod fetcher;
mod fields;
mod links;
mod orchestrator;
mod pool;

#[cfg(test)]
pub(crate) mod testing;

pub use fetcher::PageFetcher;
pub use fields::{extract_fields, ExtractedSummary};
pub use links::{extract_detail_links, DetailLink};
pub use orchestrator::{backoff_delay, run_crawl, CancelToken, Orchestrator};
pub use pool::{ContextPool, Slot};
