//! Output module for run summaries and catalog statistics
//!
//! This module handles:
//! - Recording catalog statistics from the store
//! - Printing end-of-run outcome counts

pub mod stats;

pub use stats::{load_statistics, print_run_summary, print_statistics, CatalogStatistics};
