//! Crawl orchestration
//!
//! This module contains the main crawl loop, including:
//! - Walking listing pages strictly in order in one long-lived tab
//! - Extracting detail links and dropping ones already seen this run
//! - Dispatching detail visits to worker tasks, bounded by the context pool
//! - Retrying transient failures with exponential backoff
//! - Deciding when the run stops

use crate::browser::{Browser, BrowsingContext};
use crate::config::Config;
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::fields::extract_fields;
use crate::crawler::links::{extract_detail_links, DetailLink};
use crate::crawler::pool::Slot;
use crate::output::RunSummary;
use crate::state::{CrawlState, FailureReason, LinkOutcome, StopReason};
use crate::storage::{CrawlRecord, PageSnapshot, SnapshotStore};
use crate::url::{listing_url, DetailRules};
use crate::{CrawlError, FetchError, StoreError, UrlError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use url::Url;

/// Requests a running crawl to stop
///
/// Clones share one flag. Once cancelled, the orchestrator dispatches no
/// new listing pages or detail links; visits already running finish.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Raises the flag
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the flag is raised
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // The sender lives as long as any token, so this only resolves on cancel
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

/// Longest wait between two attempts
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Delay before retry number `retry` (zero-based), capped at one minute
pub fn backoff_delay(base: Duration, retry: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(retry)).min(MAX_BACKOFF)
}

/// What a worker reports back for one link
struct LinkReport {
    outcome: LinkOutcome,
    store_warnings: u64,
}

/// Per-link work shared by every worker task
struct LinkVisitor {
    fetcher: PageFetcher,
    store: Arc<dyn SnapshotStore>,
    skip_existing: bool,
    max_retries: u32,
    retry_backoff: Duration,
    cancel: CancelToken,
}

impl LinkVisitor {
    /// Skip check, fetch, extract and upsert for one link
    async fn visit(&self, slot: Slot, link: DetailLink, source_page: u32) -> LinkReport {
        let mut store_warnings = 0;

        if self.skip_existing {
            let (exists, warnings) = self.exists_with_retry(&link).await;
            store_warnings += warnings;
            if exists == Some(true) {
                tracing::debug!("Skipping {} (already stored)", link.url);
                return LinkReport {
                    outcome: LinkOutcome::Skipped {
                        canonical_id: link.canonical_id,
                    },
                    store_warnings,
                };
            }
        }

        let snapshot = match self.fetch_with_retries(&slot, &link.url).await {
            Ok(snapshot) => snapshot,
            Err((attempts, e)) => {
                tracing::warn!("Giving up on {} after {} attempt(s): {}", link.url, attempts, e);
                return LinkReport {
                    outcome: LinkOutcome::Failed {
                        url: link.url.to_string(),
                        reason: FailureReason::Navigation {
                            attempts,
                            message: e.to_string(),
                        },
                    },
                    store_warnings,
                };
            }
        };

        // The context is closed; let the next link have the slot
        drop(slot);

        let summary = extract_fields(&snapshot.raw_html);
        if summary.is_empty() {
            tracing::debug!("No fields extracted from {}", link.url);
        }
        let record = CrawlRecord::new(snapshot, summary, source_page);

        let (result, warnings) = self.upsert_with_retry(&record).await;
        store_warnings += warnings;
        let outcome = match result {
            Ok(()) => LinkOutcome::Stored {
                canonical_id: link.canonical_id,
            },
            Err(e) => LinkOutcome::Failed {
                url: link.url.to_string(),
                reason: FailureReason::Store {
                    message: e.to_string(),
                },
            },
        };

        LinkReport {
            outcome,
            store_warnings,
        }
    }

    /// Fetches with retries for transient failures
    ///
    /// On failure returns the number of attempts made with the last error.
    async fn fetch_with_retries(&self, slot: &Slot, url: &Url) -> Result<PageSnapshot, (u32, FetchError)> {
        let mut retry = 0;
        loop {
            match self.fetcher.fetch_in_slot(slot, url).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if e.is_transient() && retry < self.max_retries && !self.cancel.is_cancelled() => {
                    let delay = backoff_delay(self.retry_backoff, retry);
                    tracing::debug!("Retrying {} in {:?}: {}", url, delay, e);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => return Err((retry + 1, e)),
                    }
                    retry += 1;
                }
                Err(e) => return Err((retry + 1, e)),
            }
        }
    }

    /// Asks the store whether the link is already stored, retrying once
    ///
    /// Returns `None` when both attempts failed, along with how many store
    /// errors were seen.
    async fn exists_with_retry(&self, link: &DetailLink) -> (Option<bool>, u64) {
        match self.store.has(&link.canonical_id).await {
            Ok(found) => (Some(found), 0),
            Err(first) => {
                tracing::warn!("Store lookup failed for {}, retrying: {}", link.url, first);
                match self.store.has(&link.canonical_id).await {
                    Ok(found) => (Some(found), 1),
                    Err(second) => {
                        tracing::warn!(
                            "Store lookup failed again for {}, fetching anyway: {}",
                            link.url,
                            second
                        );
                        (None, 2)
                    }
                }
            }
        }
    }

    /// Upserts, retrying once; also returns how many store errors were seen
    async fn upsert_with_retry(&self, record: &CrawlRecord) -> (Result<(), StoreError>, u64) {
        match self.store.upsert(record).await {
            Ok(()) => (Ok(()), 0),
            Err(first) => {
                tracing::warn!(
                    "Store write failed for {}, retrying: {}",
                    record.snapshot.url,
                    first
                );
                match self.store.upsert(record).await {
                    Ok(()) => (Ok(()), 1),
                    Err(second) => {
                        tracing::warn!(
                            "Store write failed again for {}: {}",
                            record.snapshot.url,
                            second
                        );
                        (Err(second), 2)
                    }
                }
            }
        }
    }
}

/// Main crawl orchestrator
pub struct Orchestrator {
    base_url: Url,
    rules: DetailRules,
    max_pages: Option<u32>,
    visitor: Arc<LinkVisitor>,
    cancel: CancelToken,
    state: CrawlState,
    seen: HashSet<String>,
    summary: RunSummary,
}

impl Orchestrator {
    /// Creates an orchestrator for one run
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `browser` - Source of browsing contexts
    /// * `store` - Where records are written
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Ready to run
    /// * `Err(CrawlError)` - The base URL is unusable
    pub fn new(
        config: &Config,
        browser: Arc<dyn Browser>,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<Self, CrawlError> {
        Self::with_cancel(config, browser, store, CancelToken::new())
    }

    /// Creates an orchestrator that stops when `cancel` is raised
    ///
    /// Lets one token outlive several runs, e.g. in repeat mode.
    pub fn with_cancel(
        config: &Config,
        browser: Arc<dyn Browser>,
        store: Arc<dyn SnapshotStore>,
        cancel: CancelToken,
    ) -> Result<Self, CrawlError> {
        let base_url =
            Url::parse(&config.site.base_url).map_err(|e| UrlError::Parse(e.to_string()))?;
        let rules = DetailRules::for_site(&base_url)?;

        let visitor = LinkVisitor {
            fetcher: PageFetcher::from_config(browser, &config.crawler),
            store,
            skip_existing: config.crawler.skip_existing,
            max_retries: config.crawler.max_retries,
            retry_backoff: Duration::from_millis(config.crawler.retry_backoff_ms),
            cancel: cancel.clone(),
        };

        Ok(Self {
            base_url,
            rules,
            max_pages: config.crawler.max_pages,
            visitor: Arc::new(visitor),
            cancel,
            state: CrawlState::initial(),
            seen: HashSet::new(),
            summary: RunSummary::new(),
        })
    }

    /// A token that stops this run when cancelled
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current position in the run
    pub fn state(&self) -> CrawlState {
        self.state
    }

    /// Runs until the crawl stops
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run reached `Done`; per-link failures are in the summary
    /// * `Err(CrawlError)` - The first listing page could not be loaded
    pub async fn run(mut self) -> Result<RunSummary, CrawlError> {
        tracing::info!("Starting crawl of {}", self.base_url);

        let first_page = listing_url(&self.base_url, 1)?;
        let mut listing_tab = self
            .visitor
            .fetcher
            .pool()
            .open_unpooled()
            .await
            .map_err(|e| FetchError::Context {
                url: first_page.to_string(),
                message: e.to_string(),
            })?;

        let result = self.drive(listing_tab.as_mut()).await;
        listing_tab.close().await;
        result?;

        tracing::info!(
            "Crawl finished: {} listing pages, {} links, {} stored, {} skipped, {} failed",
            self.summary.pages_processed,
            self.summary.links_discovered,
            self.summary.records_stored,
            self.summary.records_skipped,
            self.summary.records_failed()
        );

        Ok(self.summary)
    }

    async fn drive(&mut self, listing_tab: &mut dyn BrowsingContext) -> Result<(), CrawlError> {
        while let CrawlState::AwaitingListingPage(page) = self.state {
            if self.cancel.is_cancelled() {
                return self.stop(StopReason::Cancelled);
            }

            let page_url = listing_url(&self.base_url, page)?;
            tracing::info!("Loading listing page {}: {}", page, page_url);

            let html = match self.load_listing(listing_tab, &page_url).await {
                Ok(snapshot) => snapshot.raw_html,
                Err(e) if self.cancel.is_cancelled() => {
                    tracing::info!("Listing page {} abandoned on cancel: {}", page, e);
                    return self.stop(StopReason::Cancelled);
                }
                Err(e) if page == 1 => {
                    tracing::error!("First listing page failed: {}", e);
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::warn!("Listing page {} failed, treating as end of results: {}", page, e);
                    return self.stop(StopReason::EndOfPagination(page));
                }
            };

            self.advance(CrawlState::ExtractingLinks(page))?;

            let links = extract_detail_links(&html, &page_url, &self.rules);
            if links.is_empty() {
                return self.stop(StopReason::EmptyPage(page));
            }

            let found = links.len();
            let fresh: Vec<DetailLink> = links
                .into_iter()
                .filter(|link| self.seen.insert(link.canonical_id.clone()))
                .collect();
            if fresh.is_empty() {
                return self.stop(StopReason::RepeatedPage(page));
            }

            self.summary.links_discovered += fresh.len() as u64;
            tracing::info!(
                "Listing page {}: {} detail links ({} new)",
                page,
                found,
                fresh.len()
            );

            self.advance(CrawlState::VisitingDetailPages(page))?;
            let dispatched_all = self.visit_links(fresh, page).await;
            self.summary.pages_processed += 1;

            if !dispatched_all || self.cancel.is_cancelled() {
                return self.stop(StopReason::Cancelled);
            }

            match (self.max_pages, page.checked_add(1)) {
                (Some(max), _) if page >= max => return self.stop(StopReason::PageLimit(page)),
                (_, None) => return self.stop(StopReason::PageLimit(page)),
                (_, Some(next)) => self.advance(CrawlState::AwaitingListingPage(next))?,
            }
        }

        Ok(())
    }

    /// Loads a listing page in the listing tab, retrying transient failures
    async fn load_listing(
        &self,
        listing_tab: &mut dyn BrowsingContext,
        url: &Url,
    ) -> Result<PageSnapshot, FetchError> {
        let visitor = &self.visitor;
        let mut retry = 0;
        loop {
            match visitor.fetcher.fetch_in(&mut *listing_tab, url).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e)
                    if e.is_transient()
                        && retry < visitor.max_retries
                        && !self.cancel.is_cancelled() =>
                {
                    let delay = backoff_delay(visitor.retry_backoff, retry);
                    tracing::debug!("Retrying listing {} in {:?}: {}", url, delay, e);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => return Err(e),
                    }
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Visits `links` concurrently and folds their outcomes into the summary
    ///
    /// Returns false if a cancel stopped dispatch before every link started.
    async fn visit_links(&mut self, links: Vec<DetailLink>, page: u32) -> bool {
        let pool = self.visitor.fetcher.pool().clone();
        let mut workers = JoinSet::new();
        let mut dispatched_all = true;

        for link in links {
            let slot = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                slot = pool.reserve() => slot.ok(),
            };

            let Some(slot) = slot.filter(|_| !self.cancel.is_cancelled()) else {
                dispatched_all = false;
                break;
            };

            let visitor = Arc::clone(&self.visitor);
            workers.spawn(async move {
                let url = link.url.to_string();
                (url, visitor.visit(slot, link, page).await)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((url, report)) => {
                    match &report.outcome {
                        LinkOutcome::Stored { .. } => tracing::debug!("Stored {}", url),
                        LinkOutcome::Skipped { .. } => {}
                        LinkOutcome::Failed { reason, .. } => {
                            tracing::warn!("Failed {}: {}", url, reason)
                        }
                    }
                    self.summary.store_warnings += report.store_warnings;
                    self.summary.record(report.outcome);
                }
                Err(e) => tracing::error!("Detail worker panicked: {}", e),
            }
        }

        dispatched_all
    }

    fn advance(&mut self, next: CrawlState) -> Result<(), CrawlError> {
        if !self.state.can_transition_to(&next) {
            return Err(CrawlError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!("Crawl state {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    fn stop(&mut self, reason: StopReason) -> Result<(), CrawlError> {
        self.advance(CrawlState::Done)?;
        tracing::info!("Crawl stopping: {}", reason);
        self.summary.finish(reason);
        Ok(())
    }
}

/// Runs one crawl with `config`
///
/// Convenience wrapper for callers that do not need the cancel token.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use vehicle_crawl::browser::HttpBrowser;
/// use vehicle_crawl::config::load_config;
/// use vehicle_crawl::crawler::run_crawl;
/// use vehicle_crawl::storage::open_store;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(None)?;
/// let browser = HttpBrowser::new(config.site.user_agent.clone(), Duration::from_secs(45));
/// let store = open_store(&config.store)?;
/// let summary = run_crawl(&config, Arc::new(browser), Arc::new(store)).await?;
/// println!("{} records stored", summary.records_stored);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: &Config,
    browser: Arc<dyn Browser>,
    store: Arc<dyn SnapshotStore>,
) -> Result<RunSummary, CrawlError> {
    Orchestrator::new(config, browser, store)?.run().await
}
