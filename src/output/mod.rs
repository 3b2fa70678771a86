//! Output module for reporting crawl runs
//!
//! This module handles:
//! - Accumulating per-link outcomes into a run summary
//! - Printing the summary to the console
//! - Writing a Markdown report

mod markdown;
pub mod stats;

pub use markdown::{format_markdown_report, write_markdown_report};
pub use stats::{print_summary, LinkFailure, RunSummary};
