//! Storage module for the local catalog
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - The sync cursor (`last_synced_at`) that orders the backlog
//! - Idempotent record upserts and per-batch transactional commits
//! - Classified release metadata keyed by content hash
//! - Seeding the backlog from a bulk ID snapshot
//! - Run tracking

mod schema;
mod snapshot;
mod sqlite;
mod traits;

pub use snapshot::{new_ids, read_id_dump, seed_from_snapshot};
pub use sqlite::SqliteStorage;
pub use traits::{CatalogStore, StorageError, StorageResult};

use crate::classify::{classify, ClassifiedMetadata};
use crate::SyncError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, SyncError> {
    SqliteStorage::new(path)
}

/// Kind of catalog item; part of the item's primary key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ItemKind {
    #[default]
    Movie,
    Tv,
}

impl ItemKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(Self::Movie),
            "tv" => Some(Self::Tv),
            _ => None,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_string(&s.to_lowercase())
            .ok_or_else(|| format!("unknown item kind '{}' (expected movie or tv)", s))
    }
}

impl ToSql for ItemKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_db_string()))
    }
}

impl FromSql for ItemKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::from_db_string(s).ok_or_else(|| FromSqlError::Other(format!("bad item kind {s}").into()))
    }
}

/// Primary key of a catalog item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub external_id: i64,
    pub kind: ItemKind,
}

impl ItemKey {
    pub fn new(external_id: i64, kind: ItemKind) -> Self {
        Self { external_id, kind }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.external_id)
    }
}

/// A unit of work in the sync backlog
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub external_id: i64,
    pub kind: ItemKind,
    /// Source-relative lookup key
    pub query_key: String,
    /// `None` until the item has been attempted once
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    /// A never-synced item with the default `{kind}/{id}` lookup key
    pub fn new(external_id: i64, kind: ItemKind) -> Self {
        Self {
            external_id,
            kind,
            query_key: format!("{}/{}", kind, external_id),
            last_synced_at: None,
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.external_id, self.kind)
    }
}

/// A fetched record as persisted in the `items` table
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedRecord {
    pub external_id: i64,
    pub kind: ItemKind,
    pub query_key: String,
    /// Display title chosen by the language cascade
    pub title: String,
    pub overview: String,
    pub original_title: String,
    /// Primary release label and its size text
    pub label: String,
    pub size_text: String,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub production_countries: Vec<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub runtime_minutes: Option<i64>,
    pub asset_path: Option<String>,
}

impl PersistedRecord {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.external_id, self.kind)
    }
}

/// One classified release of an item
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedEntry {
    pub content_hash: String,
    pub key: ItemKey,
    pub label: String,
    pub size_text: String,
    pub magnet: Option<String>,
    pub seeders: Option<i64>,
    pub leechers: Option<i64>,
    pub metadata: ClassifiedMetadata,
}

/// Stored inputs needed to re-derive a classified entry
#[derive(Debug, Clone)]
pub struct ClassificationInput {
    pub content_hash: String,
    pub label: String,
    pub size_text: String,
    pub runtime_minutes: Option<i64>,
}

/// Represents a sync run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub counters: RunCounters,
}

/// Per-outcome item counts recorded for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub attempted: u64,
    pub succeeded: u64,
    pub not_found: u64,
    pub failed: u64,
}

/// Status of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Formats a timestamp the way it is stored; the fixed width keeps text
/// ordering equal to time ordering
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses a stored timestamp
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Re-derives every classified entry from its stored label, size text and
/// the owning item's runtime, without touching the network
///
/// Returns the number of entries rewritten.
pub fn reclassify_all(store: &mut dyn CatalogStore) -> StorageResult<usize> {
    let inputs = store.classification_inputs()?;
    let updates: Vec<(String, ClassifiedMetadata)> = inputs
        .into_iter()
        .map(|input| {
            let metadata = classify(&input.label, &input.size_text, input.runtime_minutes);
            (input.content_hash, metadata)
        })
        .collect();

    tracing::info!("Reclassifying {} stored releases", updates.len());
    store.update_classifications(&updates)
}
