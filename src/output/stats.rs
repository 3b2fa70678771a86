//! Run summary accounting
//!
//! The orchestrator folds every [`LinkOutcome`] into a [`RunSummary`]; the
//! CLI prints it once the run has stopped.

use crate::state::{FailureReason, LinkOutcome, StopReason};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A detail link that ended in failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFailure {
    pub url: String,
    pub reason: FailureReason,
}

/// What one crawl run did
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run stopped, once it has
    pub finished_at: Option<DateTime<Utc>>,

    /// Listing pages whose detail links were all visited
    pub pages_processed: u32,

    /// Unique detail links found across all listing pages
    pub links_discovered: u64,

    /// Records written (inserted or updated)
    pub records_stored: u64,

    /// Links not fetched because their record already existed
    pub records_skipped: u64,

    /// Links given up on, in completion order
    pub failures: Vec<LinkFailure>,

    /// Store errors seen, including ones that succeeded on retry
    pub store_warnings: u64,

    /// Why the run reached `Done`
    pub stop_reason: Option<StopReason>,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSummary {
    /// Starts an empty summary stamped with the current time
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            pages_processed: 0,
            links_discovered: 0,
            records_stored: 0,
            records_skipped: 0,
            failures: Vec::new(),
            store_warnings: 0,
            stop_reason: None,
        }
    }

    /// Folds one link's outcome into the totals
    pub fn record(&mut self, outcome: LinkOutcome) {
        match outcome {
            LinkOutcome::Stored { .. } => self.records_stored += 1,
            LinkOutcome::Skipped { .. } => self.records_skipped += 1,
            LinkOutcome::Failed { url, reason } => self.failures.push(LinkFailure { url, reason }),
        }
    }

    /// Marks the run as stopped
    pub fn finish(&mut self, reason: StopReason) {
        self.stop_reason = Some(reason);
        self.finished_at = Some(Utc::now());
    }

    /// Number of links that ended in failure
    pub fn records_failed(&self) -> usize {
        self.failures.len()
    }

    /// Failure counts grouped by [`FailureReason::kind`]
    pub fn failures_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.reason.kind()).or_insert(0) += 1;
        }
        counts
    }

    /// Wall-clock duration, if the run has finished
    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds())
    }
}

/// Prints a run summary to stdout in a formatted manner
pub fn print_summary(summary: &RunSummary) {
    println!("=== Crawl Summary ===\n");

    println!("Overview:");
    println!("  Listing pages processed: {}", summary.pages_processed);
    println!("  Detail links discovered: {}", summary.links_discovered);
    println!("  Records stored: {}", summary.records_stored);
    println!("  Records skipped: {}", summary.records_skipped);
    println!("  Records failed: {}", summary.records_failed());
    println!("  Store warnings: {}", summary.store_warnings);
    if let Some(seconds) = summary.duration_seconds() {
        println!("  Duration: {}s", seconds);
    }
    println!();

    if !summary.failures.is_empty() {
        println!("Failures:");
        for (kind, count) in summary.failures_by_kind() {
            println!("  {}: {}", kind, count);
        }
        for failure in &summary.failures {
            println!("  - {}: {}", failure.url, failure.reason);
        }
        println!();
    }

    match &summary.stop_reason {
        Some(reason) => println!("Stopped: {}", reason),
        None => println!("Stopped: run did not finish"),
    }
}
