//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::storage::{RunRecord, SqliteStorage, StatusCount};
use crate::CrawlError;
use std::fmt::Write;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Total number of stored records
    pub total_records: u64,

    /// Record counts by registry status, most frequent first
    pub records_by_status: Vec<StatusCount>,

    /// Crawl-log counts by `phase/result`
    pub crawl_outcomes: Vec<StatusCount>,

    /// Registry proxies flagged active
    pub proxies_active: u64,

    /// Registry proxies flagged unhealthy
    pub proxies_inactive: u64,

    /// Highest stored sequence per year
    pub last_sequences: Vec<(i32, u32)>,

    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `prefix` - Code prefix whose per-year progress is reported
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(CrawlError)` - Failed to query statistics
pub fn load_statistics(storage: &SqliteStorage, prefix: &str) -> Result<CrawlStatistics, CrawlError> {
    let (proxies_active, proxies_inactive) = storage.proxy_health()?;

    Ok(CrawlStatistics {
        total_records: storage.count_records()?,
        records_by_status: storage.count_by_status()?,
        crawl_outcomes: storage.count_crawl_outcomes()?,
        proxies_active,
        proxies_inactive,
        last_sequences: storage.last_sequence_per_year(prefix)?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Renders statistics as the text report printed by `--stats`
pub fn format_statistics(stats: &CrawlStatistics) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== Crawl Statistics ===\n");

    if let Some(run) = &stats.latest_run {
        let _ = writeln!(
            out,
            "Latest run: #{} {} (started {}, finished {})",
            run.id,
            run.status.to_db_string(),
            run.started_at,
            run.finished_at.as_deref().unwrap_or("-")
        );
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "Records: {}", stats.total_records);
    for entry in &stats.records_by_status {
        let percentage = if stats.total_records > 0 {
            (entry.count as f64 / stats.total_records as f64) * 100.0
        } else {
            0.0
        };
        let _ = writeln!(out, "  {}: {} ({:.1}%)", entry.label, entry.count, percentage);
    }
    let _ = writeln!(out);

    if !stats.last_sequences.is_empty() {
        let _ = writeln!(out, "Last sequence per year:");
        for (year, sequence) in &stats.last_sequences {
            let _ = writeln!(out, "  {}: {:05}", year, sequence);
        }
        let _ = writeln!(out);
    }

    if !stats.crawl_outcomes.is_empty() {
        let _ = writeln!(out, "Crawl log:");
        for entry in &stats.crawl_outcomes {
            let _ = writeln!(out, "  {}: {}", entry.label, entry.count);
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(
        out,
        "Proxies: {} active, {} inactive",
        stats.proxies_active, stats.proxies_inactive
    );

    out
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    print!("{}", format_statistics(stats));
}
