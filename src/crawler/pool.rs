//! Bounded pool of browsing contexts
//!
//! A fair semaphore caps how many detail-page contexts are alive at once.
//! The orchestrator reserves a [`Slot`] before spawning a worker, so workers
//! are dispatched in extraction order and nothing new starts once a stop is
//! requested.

use crate::browser::{Browser, BrowserError, BrowsingContext};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Hands out at most `capacity` slots, each good for one live context
#[derive(Clone)]
pub struct ContextPool {
    /// Source of fresh contexts
    browser: Arc<dyn Browser>,

    /// One permit per slot
    permits: Arc<Semaphore>,

    capacity: usize,
}

impl ContextPool {
    /// Creates a pool over `browser` with `capacity` slots
    ///
    /// A capacity of zero is treated as one.
    pub fn new(browser: Arc<dyn Browser>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            browser,
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits for a free slot
    ///
    /// Waiters are served first come, first served. The slot is returned to
    /// the pool when dropped.
    pub async fn reserve(&self) -> Result<Slot, BrowserError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BrowserError("context pool is closed".to_string()))?;

        Ok(Slot {
            browser: Arc::clone(&self.browser),
            _permit: permit,
        })
    }

    /// Opens a context that does not count against the pool
    ///
    /// Used for the long-lived listing tab.
    pub async fn open_unpooled(&self) -> Result<Box<dyn BrowsingContext>, BrowserError> {
        self.browser.open_context().await
    }

    /// Maximum number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently reserved
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// A reserved place in a [`ContextPool`]
///
/// Holders open at most one context at a time through it.
pub struct Slot {
    browser: Arc<dyn Browser>,
    _permit: OwnedSemaphorePermit,
}

impl Slot {
    /// Opens a fresh context; the caller closes it
    pub async fn open_context(&self) -> Result<Box<dyn BrowsingContext>, BrowserError> {
        self.browser.open_context().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::testing::ScriptedBrowser;

    #[tokio::test]
    async fn test_slot_returned_on_drop() {
        let pool = ContextPool::new(Arc::new(ScriptedBrowser::new()), 2);

        let slot = pool.reserve().await.unwrap();
        assert_eq!(pool.available(), 1);

        drop(slot);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_slot_opens_fresh_contexts() {
        let browser = ScriptedBrowser::new();
        let pool = ContextPool::new(Arc::new(browser.clone()), 1);

        let slot = pool.reserve().await.unwrap();
        slot.open_context().await.unwrap().close().await;
        slot.open_context().await.unwrap().close().await;

        assert_eq!(browser.opened(), 2);
        assert_eq!(browser.closed(), 2);
        assert_eq!(browser.max_live(), 1);
    }

    #[tokio::test]
    async fn test_reserve_waits_when_full() {
        let pool = ContextPool::new(Arc::new(ScriptedBrowser::new()), 1);

        let first = pool.reserve().await.unwrap();
        let waiting = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.reserve().await.map(|_| ()) })
        };

        tokio::task::yield_now().await;
        assert!(!waiting.is_finished());

        drop(first);
        waiting.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unpooled_context_takes_no_slot() {
        let pool = ContextPool::new(Arc::new(ScriptedBrowser::new()), 1);
        let _tab = pool.open_unpooled().await.unwrap();
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_zero_capacity_becomes_one() {
        let pool = ContextPool::new(Arc::new(ScriptedBrowser::new()), 0);
        assert_eq!(pool.capacity(), 1);
    }
}
