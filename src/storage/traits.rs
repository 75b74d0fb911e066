//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::classify::ClassifiedMetadata;
use crate::storage::{
    ClassificationInput, ClassifiedEntry, ItemKey, ItemKind, PersistedRecord, RunCounters,
    RunRecord, RunStatus, WorkItem,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for catalog storage backends
///
/// The orchestrator is the only writer; reads that seed a run happen once,
/// before any fetch is admitted.
pub trait CatalogStore {
    // ===== Run Management =====

    /// Creates a new sync run and returns its ID
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Updates the status of a run
    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Records the final status, counters and finish timestamp of a run
    fn complete_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counters: &RunCounters,
    ) -> StorageResult<()>;

    // ===== Sync Cursor =====

    /// Returns up to `limit` work items, never-synced first, then the
    /// longest-unsynced; ties are broken by kind and ID
    fn next_batch(&self, limit: Option<usize>) -> StorageResult<Vec<WorkItem>>;

    /// Adds items to the backlog, ignoring ones already present
    ///
    /// Returns the number of items actually inserted.
    fn insert_work_items(&mut self, items: &[WorkItem]) -> StorageResult<usize>;

    /// All external IDs of the given kind known locally
    fn known_ids(&self, kind: ItemKind) -> StorageResult<HashSet<i64>>;

    /// Unconditionally sets `last_synced_at` for the given items
    fn mark_attempted(&mut self, keys: &[ItemKey], now: DateTime<Utc>) -> StorageResult<()>;

    /// Gets the backlog entry for an item
    fn get_work_item(&self, key: ItemKey) -> StorageResult<Option<WorkItem>>;

    // ===== Records =====

    /// Inserts or updates a record; applying the same record twice leaves
    /// the row unchanged
    fn upsert_record(&mut self, record: &PersistedRecord) -> StorageResult<()>;

    /// Gets a fetched record
    fn get_record(&self, key: ItemKey) -> StorageResult<Option<PersistedRecord>>;

    /// Replaces an asset path on every record that references it
    ///
    /// Returns the number of records changed.
    fn update_asset_path(&mut self, from: &str, to: &str) -> StorageResult<usize>;

    /// Commits a batch in one transaction: every record is upserted and each
    /// listed item's classified entries are replaced by the given set
    fn commit_batch(
        &mut self,
        records: &[PersistedRecord],
        classified: &[(ItemKey, Vec<ClassifiedEntry>)],
    ) -> StorageResult<()>;

    // ===== Classified Metadata =====

    /// Inserts or replaces a classified entry keyed by its content hash
    fn upsert_classified(&mut self, entry: &ClassifiedEntry) -> StorageResult<()>;

    /// Gets a classified entry by content hash
    fn get_classified(&self, content_hash: &str) -> StorageResult<Option<ClassifiedEntry>>;

    /// All classified entries belonging to an item
    fn classified_for(&self, key: ItemKey) -> StorageResult<Vec<ClassifiedEntry>>;

    /// Label, size text and runtime of every classified entry
    fn classification_inputs(&self) -> StorageResult<Vec<ClassificationInput>>;

    /// Overwrites the derived fields of existing entries
    fn update_classifications(
        &mut self,
        updates: &[(String, ClassifiedMetadata)],
    ) -> StorageResult<usize>;

    // ===== Statistics =====

    /// Total items in the backlog
    fn count_items(&self) -> StorageResult<u64>;

    /// Items fetched successfully at least once
    fn count_records(&self) -> StorageResult<u64>;

    /// Items never attempted
    fn count_never_synced(&self) -> StorageResult<u64>;

    /// Total classified releases
    fn count_classified(&self) -> StorageResult<u64>;

    /// Classified releases per resolution, most common first
    fn resolution_breakdown(&self) -> StorageResult<Vec<(String, u64)>>;

    /// Classified releases per HDR type, most common first
    fn hdr_breakdown(&self) -> StorageResult<Vec<(String, u64)>>;
}
