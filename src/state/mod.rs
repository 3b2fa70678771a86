//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlState`: the run-level state machine over listing pages
//! - `StopReason`: why a run reached `Done`
//! - `LinkOutcome`: what happened to a single detail link

mod crawl_state;
mod link_outcome;

// Re-export main types
pub use crawl_state::{CrawlState, StopReason};
pub use link_outcome::{FailureReason, LinkOutcome};
