//! Markdown run report
//!
//! Renders a [`RunSummary`] as a small Markdown document, for keeping a
//! record of scheduled runs next to the store.

use crate::output::stats::RunSummary;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the Markdown report for `summary` to `output_path`
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(std::io::Error)` - Failed to create or write the file
pub fn write_markdown_report(summary: &RunSummary, output_path: &Path) -> std::io::Result<()> {
    let markdown = format_markdown_report(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run summary as Markdown
pub fn format_markdown_report(summary: &RunSummary) -> String {
    let mut md = String::new();

    md.push_str("# Vehicle Crawl Report\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    if let Some(finished) = summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished.to_rfc3339()));
    }
    if let Some(seconds) = summary.duration_seconds() {
        md.push_str(&format!("- **Duration**: {} seconds\n", seconds));
    }
    match &summary.stop_reason {
        Some(reason) => md.push_str(&format!("- **Stopped**: {}\n\n", reason)),
        None => md.push_str("- **Stopped**: run did not finish\n\n"),
    }

    md.push_str("## Totals\n\n");
    md.push_str("| Metric | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Listing pages processed | {} |\n", summary.pages_processed));
    md.push_str(&format!("| Detail links discovered | {} |\n", summary.links_discovered));
    md.push_str(&format!("| Records stored | {} |\n", summary.records_stored));
    md.push_str(&format!("| Records skipped | {} |\n", summary.records_skipped));
    md.push_str(&format!("| Records failed | {} |\n", summary.records_failed()));
    md.push_str(&format!("| Store warnings | {} |\n\n", summary.store_warnings));

    if !summary.failures.is_empty() {
        md.push_str("## Failures\n\n");
        md.push_str("| URL | Reason |\n");
        md.push_str("|-----|--------|\n");
        for failure in &summary.failures {
            md.push_str(&format!(
                "| {} | {} |\n",
                failure.url,
                failure.reason.to_string().replace('|', "\\|")
            ));
        }
        md.push('\n');
    }

    md
}
