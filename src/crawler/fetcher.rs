//! Page fetcher
//!
//! This module turns a URL into a [`PageSnapshot`]:
//! - Opening a fresh browsing context through a pool slot
//! - Bounding the whole load by the request timeout
//! - Rejecting error statuses
//! - Waiting out a short settle window before capturing
//! - Closing the context on every exit path

use crate::browser::{Browser, BrowserError, BrowsingContext};
use crate::config::CrawlerConfig;
use crate::crawler::pool::{ContextPool, Slot};
use crate::storage::PageSnapshot;
use crate::url::canonical_id;
use crate::FetchError;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Loads pages into snapshots
#[derive(Clone)]
pub struct PageFetcher {
    pool: ContextPool,
    request_timeout: Duration,
    settle: Duration,
}

impl PageFetcher {
    /// Creates a fetcher over an existing pool
    pub fn new(pool: ContextPool, request_timeout: Duration, settle: Duration) -> Self {
        Self {
            pool,
            request_timeout,
            settle,
        }
    }

    /// Creates a fetcher and its pool from crawler settings
    pub fn from_config(browser: Arc<dyn Browser>, config: &CrawlerConfig) -> Self {
        Self::new(
            ContextPool::new(browser, config.concurrency as usize),
            Duration::from_millis(config.request_timeout_ms),
            Duration::from_millis(config.settle_ms),
        )
    }

    /// The pool this fetcher reserves slots from
    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    /// Fetches `url` in a fresh context that is closed afterwards
    ///
    /// # Arguments
    ///
    /// * `url` - A normalized detail page URL
    ///
    /// # Returns
    ///
    /// * `Ok(PageSnapshot)` - The page loaded with a 2xx/3xx status
    /// * `Err(FetchError)` - The context could not be opened or the load failed
    pub async fn fetch(&self, url: &Url) -> Result<PageSnapshot, FetchError> {
        let slot = self.pool.reserve().await.map_err(|e| context_error(url, e))?;
        self.fetch_in_slot(&slot, url).await
    }

    /// Fetches `url` in a fresh context opened through an already reserved slot
    pub async fn fetch_in_slot(&self, slot: &Slot, url: &Url) -> Result<PageSnapshot, FetchError> {
        let mut context = slot.open_context().await.map_err(|e| context_error(url, e))?;

        let result = self.fetch_in(context.as_mut(), url).await;
        context.close().await;

        result
    }

    /// Fetches `url` in a context the caller owns
    ///
    /// The context is left open.
    pub async fn fetch_in(
        &self,
        context: &mut dyn BrowsingContext,
        url: &Url,
    ) -> Result<PageSnapshot, FetchError> {
        let started = Instant::now();

        let page = match tokio::time::timeout(self.request_timeout, context.navigate(url)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                })
            }
        };

        if !(200..400).contains(&page.status) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: page.status,
            });
        }

        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        tracing::debug!(
            "Loaded {} ({} bytes, status {}) in {}ms",
            url,
            page.html.len(),
            page.status,
            started.elapsed().as_millis()
        );

        Ok(PageSnapshot {
            url: url.to_string(),
            canonical_id: canonical_id(url),
            final_url: page.final_url.to_string(),
            raw_html: page.html,
            fetched_at: Utc::now(),
            http_status: page.status,
        })
    }
}

fn context_error(url: &Url, error: BrowserError) -> FetchError {
    FetchError::Context {
        url: url.to_string(),
        message: error.to_string(),
    }
}
