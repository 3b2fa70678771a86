//! Browsing context abstraction
//!
//! The crawler never shares navigation state between detail pages. Every
//! visit opens its own [`BrowsingContext`] (a "tab") from a [`Browser`] and
//! closes it afterwards. The browser runtime itself is an external
//! collaborator; [`HttpBrowser`] is the bundled implementation.

mod http;

pub use http::{HttpBrowser, HttpContext};

use crate::FetchError;
use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// A page as it looked once loading settled
#[derive(Debug, Clone)]
pub struct LoadedPage {
    /// Final URL after redirects
    pub final_url: Url,

    /// HTTP status of the final response
    pub status: u16,

    /// Full document HTML
    pub html: String,
}

/// The browser could not hand out a new context
#[derive(Debug, Error)]
#[error("{0}")]
pub struct BrowserError(pub String);

/// One isolated tab: its own cookies, session and history
#[async_trait]
pub trait BrowsingContext: Send {
    /// Navigates to `url` and returns the loaded document
    ///
    /// Implementations should not return before the document is complete;
    /// the caller bounds the whole call with its own timeout.
    async fn navigate(&mut self, url: &Url) -> Result<LoadedPage, FetchError>;

    /// Releases the context and everything it holds
    async fn close(self: Box<Self>);
}

/// Hands out fresh browsing contexts
#[async_trait]
pub trait Browser: Send + Sync {
    /// Opens a new context that shares no state with any other
    async fn open_context(&self) -> Result<Box<dyn BrowsingContext>, BrowserError>;
}
