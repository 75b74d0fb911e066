//! Statistics generation from the catalog database
//!
//! This module provides functionality for extracting and displaying
//! catalog statistics from the storage layer.

use crate::storage::{CatalogStore, RunRecord};
use crate::sync::RunSummary;
use crate::SyncError;

/// Catalog statistics summary
#[derive(Debug, Clone)]
pub struct CatalogStatistics {
    /// Total number of items in the backlog
    pub total_items: u64,

    /// Items with a successfully fetched record
    pub fetched_records: u64,

    /// Items never attempted
    pub never_synced: u64,

    /// Classified release entries
    pub classified: u64,

    /// Classified entries per resolution, most common first
    pub by_resolution: Vec<(String, u64)>,

    /// Classified entries per HDR type, most common first
    pub by_hdr: Vec<(String, u64)>,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CatalogStatistics)` - Successfully loaded statistics
/// * `Err(SyncError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn CatalogStore) -> Result<CatalogStatistics, SyncError> {
    Ok(CatalogStatistics {
        total_items: storage.count_items()?,
        fetched_records: storage.count_records()?,
        never_synced: storage.count_never_synced()?,
        classified: storage.count_classified()?,
        by_resolution: storage.resolution_breakdown()?,
        by_hdr: storage.hdr_breakdown()?,
        latest_run: storage.get_latest_run()?,
    })
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CatalogStatistics) {
    println!("=== Catalog Statistics ===\n");

    println!("Overview:");
    println!("  Items in backlog: {}", stats.total_items);
    println!(
        "  Fetched records: {} ({:.1}%)",
        stats.fetched_records,
        percentage(stats.fetched_records, stats.total_items)
    );
    println!("  Never synced: {}", stats.never_synced);
    println!("  Classified releases: {}", stats.classified);
    println!();

    if !stats.by_resolution.is_empty() {
        println!("Releases by Resolution:");
        for (resolution, count) in &stats.by_resolution {
            println!(
                "  {}: {} ({:.1}%)",
                resolution,
                count,
                percentage(*count, stats.classified)
            );
        }
        println!();
    }

    if !stats.by_hdr.is_empty() {
        println!("Releases by HDR Type:");
        for (hdr, count) in &stats.by_hdr {
            println!("  {}: {}", hdr, count);
        }
        println!();
    }

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run:");
            println!("  ID: {} ({})", run.id, run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            println!(
                "  Attempted: {}, succeeded: {}, not found: {}, failed: {}",
                run.counters.attempted,
                run.counters.succeeded,
                run.counters.not_found,
                run.counters.failed
            );
        }
        None => println!("No sync runs recorded yet"),
    }
}

/// Prints the outcome counts of a finished run
pub fn print_run_summary(summary: &RunSummary) {
    let status = if summary.interrupted {
        "interrupted"
    } else {
        "completed"
    };

    println!("=== Sync Run {} ({}) ===\n", summary.run_id, status);
    println!("  Attempted:        {}", summary.attempted);
    println!(
        "  Succeeded:        {} ({:.1}%)",
        summary.succeeded,
        percentage(summary.succeeded, summary.attempted)
    );
    println!("  Not found:        {}", summary.not_found);
    println!("  Failed (network): {}", summary.transient_failures);
    println!("  Malformed:        {}", summary.malformed);
    println!("  Rate limited:     {}", summary.rate_limited_hits);
    println!("  Batches:          {}", summary.batches_committed);
    println!();
    println!(
        "  Assets: {} queued, {} converted, {} kept as original, {} failed",
        summary.assets_queued,
        summary.transform.converted,
        summary.transform.relocated,
        summary.transform.failed
    );
    println!("  Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
}
