//! In-process browser used by the crawler's unit tests

use crate::browser::{Browser, BrowserError, BrowsingContext, LoadedPage};
use crate::FetchError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// A canned response for one navigation
#[derive(Debug, Clone)]
pub enum Reply {
    Page { status: u16, html: String },
    Timeout,
    Network,
}

impl Reply {
    fn into_result(self, url: &Url) -> Result<LoadedPage, FetchError> {
        match self {
            Reply::Page { status, html } => Ok(LoadedPage {
                final_url: url.clone(),
                status,
                html,
            }),
            Reply::Timeout => Err(FetchError::Timeout {
                url: url.to_string(),
                elapsed_ms: 1,
            }),
            Reply::Network => Err(FetchError::Network {
                url: url.to_string(),
                message: "connection reset".to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct Script {
    steady: HashMap<String, Reply>,
    queued: HashMap<String, VecDeque<Reply>>,
    visits: Vec<String>,
    opened: usize,
    closed: usize,
    live: usize,
    max_live: usize,
    fail_open: bool,
    delay: Duration,
}

/// A browser whose pages are scripted per URL
///
/// Unknown URLs answer 404. Clones share one script.
#[derive(Clone, Default)]
pub struct ScriptedBrowser {
    script: Arc<Mutex<Script>>,
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `html` with status 200 at `url`
    pub fn page(&self, url: &str, html: &str) -> &Self {
        self.reply(
            url,
            Reply::Page {
                status: 200,
                html: html.to_string(),
            },
        )
    }

    /// Serves `reply` at `url` on every visit
    pub fn reply(&self, url: &str, reply: Reply) -> &Self {
        self.script
            .lock()
            .unwrap()
            .steady
            .insert(url.to_string(), reply);
        self
    }

    /// Serves `reply` for the next `times` visits to `url`, then falls back
    pub fn reply_times(&self, url: &str, reply: Reply, times: usize) -> &Self {
        let mut script = self.script.lock().unwrap();
        let queue = script.queued.entry(url.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(reply.clone());
        }
        drop(script);
        self
    }

    /// Makes every navigation take `delay`
    pub fn delay(&self, delay: Duration) -> &Self {
        self.script.lock().unwrap().delay = delay;
        self
    }

    /// Makes `open_context` fail
    pub fn fail_open(&self, fail: bool) {
        self.script.lock().unwrap().fail_open = fail;
    }

    /// Every URL navigated, in order
    pub fn visits(&self) -> Vec<String> {
        self.script.lock().unwrap().visits.clone()
    }

    /// How many times `url` was navigated
    pub fn visit_count(&self, url: &str) -> usize {
        self.visits().iter().filter(|v| v.as_str() == url).count()
    }

    pub fn opened(&self) -> usize {
        self.script.lock().unwrap().opened
    }

    pub fn closed(&self) -> usize {
        self.script.lock().unwrap().closed
    }

    /// Highest number of contexts that were open at the same time
    pub fn max_live(&self) -> usize {
        self.script.lock().unwrap().max_live
    }
}

#[async_trait]
impl Browser for ScriptedBrowser {
    async fn open_context(&self) -> Result<Box<dyn BrowsingContext>, BrowserError> {
        let mut script = self.script.lock().unwrap();
        if script.fail_open {
            return Err(BrowserError("browser is gone".to_string()));
        }
        script.opened += 1;
        script.live += 1;
        script.max_live = script.max_live.max(script.live);
        drop(script);

        Ok(Box::new(ScriptedContext {
            script: self.script.clone(),
        }))
    }
}

struct ScriptedContext {
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl BrowsingContext for ScriptedContext {
    async fn navigate(&mut self, url: &Url) -> Result<LoadedPage, FetchError> {
        let (reply, delay) = {
            let mut script = self.script.lock().unwrap();
            script.visits.push(url.to_string());
            let queued = script
                .queued
                .get_mut(url.as_str())
                .and_then(|queue| queue.pop_front());
            let reply = queued
                .or_else(|| script.steady.get(url.as_str()).cloned())
                .unwrap_or(Reply::Page {
                    status: 404,
                    html: String::new(),
                });
            (reply, script.delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        reply.into_result(url)
    }

    async fn close(self: Box<Self>) {
        let mut script = self.script.lock().unwrap();
        script.closed += 1;
        script.live -= 1;
    }
}
