//! Progress bar utilities for import runs

use indicatif::{ProgressBar, ProgressStyle};
use relic_import::jobs::{RunCounts, RunProgress};

const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}";

/// Bar over the rows of a metadata file
pub fn create_run_progress(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

/// Move the bar to a progress snapshot
pub fn update(pb: &ProgressBar, progress: &RunProgress) {
    let counts = &progress.counts;
    pb.set_position((counts.rows + counts.already_completed) as u64);
    pb.set_message(format_counts(counts));
}

/// One-line tally shown next to the bar
pub fn format_counts(counts: &RunCounts) -> String {
    let mut parts = vec![
        format!("{} valid", counts.valid_items),
        format!("{} invalid", counts.invalid_items),
    ];
    if counts.created_items > 0 {
        parts.push(format!("{} created", counts.created_items));
    }
    if counts.updated_items > 0 {
        parts.push(format!("{} updated", counts.updated_items));
    }
    if counts.unchanged_items > 0 {
        parts.push(format!("{} unchanged", counts.unchanged_items));
    }
    if counts.errors > 0 {
        parts.push(format!("{} errors", counts.errors));
    }
    parts.join(", ")
}
