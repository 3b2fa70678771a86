//! HTTP-backed browsing contexts
//!
//! Each context is a separate `reqwest::Client` with its own cookie store, so
//! cookies set while visiting one page are never sent while visiting another.

use crate::browser::{Browser, BrowserError, BrowsingContext, LoadedPage};
use crate::FetchError;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::time::{Duration, Instant};
use url::Url;

/// Maximum redirect hops followed by a single navigation
const MAX_REDIRECTS: usize = 10;

/// Opens [`HttpContext`]s configured with a shared user agent and timeout
#[derive(Debug, Clone)]
pub struct HttpBrowser {
    user_agent: String,
    request_timeout: Duration,
}

impl HttpBrowser {
    /// Creates a browser whose contexts identify as `user_agent`
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use vehicle_crawl::browser::HttpBrowser;
    ///
    /// let browser = HttpBrowser::new("vehicle-crawl/0.1", Duration::from_secs(45));
    /// ```
    pub fn new(user_agent: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            request_timeout,
        }
    }

    fn build_client(&self) -> Result<Client, reqwest::Error> {
        Client::builder()
            .user_agent(self.user_agent.clone())
            .cookie_store(true)
            .timeout(self.request_timeout)
            .connect_timeout(Duration::from_secs(10).min(self.request_timeout))
            .redirect(Policy::limited(MAX_REDIRECTS))
            .gzip(true)
            .brotli(true)
            .build()
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn open_context(&self) -> Result<Box<dyn BrowsingContext>, BrowserError> {
        let client = self
            .build_client()
            .map_err(|e| BrowserError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Box::new(HttpContext { client }))
    }
}

/// A single isolated HTTP "tab"
#[derive(Debug)]
pub struct HttpContext {
    client: Client,
}

#[async_trait]
impl BrowsingContext for HttpContext {
    async fn navigate(&mut self, url: &Url) -> Result<LoadedPage, FetchError> {
        let started = Instant::now();

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_error(url, e, started))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();

        // The body is read to the end, so the document is complete on return
        let html = response
            .text()
            .await
            .map_err(|e| classify_error(url, e, started))?;

        Ok(LoadedPage {
            final_url,
            status,
            html,
        })
    }

    async fn close(self: Box<Self>) {
        // Dropping the client drops its cookie jar and idle connections
        drop(self);
    }
}

/// Maps a reqwest failure onto the navigation error taxonomy
fn classify_error(url: &Url, error: reqwest::Error, started: Instant) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    } else if error.is_connect() {
        FetchError::Network {
            url: url.to_string(),
            message: "Connection refused".to_string(),
        }
    } else if error.is_redirect() {
        FetchError::Network {
            url: url.to_string(),
            message: format!("Too many redirects (limit {})", MAX_REDIRECTS),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
