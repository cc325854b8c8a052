//! Output module for crawl reports
//!
//! This module handles:
//! - Summarizing a finished crawl for the log
//! - Recording crawl statistics for `--stats`

pub mod stats;

pub use stats::{format_statistics, load_statistics, print_statistics, CrawlStatistics};

use crate::crawler::{MonitorReport, YearReport};

/// One-line summary of a multi-year crawl
pub fn summarize_years(reports: &[YearReport]) -> String {
    let fetched: u32 = reports.iter().map(|r| r.fetched).sum();
    let skipped: u32 = reports.iter().map(|r| r.skipped).sum();
    let failures: u32 = reports.iter().map(|r| r.persistence_failures).sum();

    let years = match (reports.first(), reports.last()) {
        (Some(first), Some(last)) if first.year != last.year => {
            format!("years {}-{}", first.year, last.year)
        }
        (Some(first), _) => format!("year {}", first.year),
        _ => "no years".to_string(),
    };

    format!(
        "Crawled {}: {} records fetched, {} skipped, {} not stored",
        years, fetched, skipped, failures
    )
}

/// One-line summary of a status refresh
pub fn summarize_refresh(status: &str, report: &MonitorReport) -> String {
    format!(
        "Refreshed {} record(s) with status {:?}: {} updated, {} changed status, {} failed",
        report.checked, status, report.updated, report.status_changed, report.failed
    )
}
