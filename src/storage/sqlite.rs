//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the CatalogStore trait.

use crate::classify::{ClassifiedMetadata, Codec, HdrType};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CatalogStore, StorageError, StorageResult};
use crate::storage::{
    format_timestamp, parse_timestamp, ClassificationInput, ClassifiedEntry, ItemKey, ItemKind,
    PersistedRecord, RunCounters, RunRecord, RunStatus, WorkItem,
};
use crate::SyncError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;

const TAG_SEPARATOR: &str = " | ";

const RUN_COLUMNS: &str =
    "id, started_at, finished_at, config_hash, status, attempted, succeeded, not_found, failed";

const RECORD_COLUMNS: &str = "external_id, kind, query_key, title, overview, original_title, \
     label, size_text, release_year, genres, production_countries, vote_average, vote_count, \
     runtime_minutes, asset_path";

const CLASSIFIED_COLUMNS: &str = "content_hash, external_id, kind, label, size_text, magnet, \
     seeders, leechers, resolution, codec, hdr_type, audio, quality, size_bytes, bitrate_mbps";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(SyncError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, SyncError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Running),
        counters: RunCounters {
            attempted: row.get::<_, i64>(5)? as u64,
            succeeded: row.get::<_, i64>(6)? as u64,
            not_found: row.get::<_, i64>(7)? as u64,
            failed: row.get::<_, i64>(8)? as u64,
        },
    })
}

fn row_to_work_item(row: &Row<'_>) -> rusqlite::Result<WorkItem> {
    let last_synced: Option<String> = row.get(3)?;
    Ok(WorkItem {
        external_id: row.get(0)?,
        kind: row.get(1)?,
        query_key: row.get(2)?,
        last_synced_at: last_synced.as_deref().and_then(parse_timestamp),
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<PersistedRecord> {
    let genres: Option<String> = row.get(9)?;
    let countries: Option<String> = row.get(10)?;
    Ok(PersistedRecord {
        external_id: row.get(0)?,
        kind: row.get(1)?,
        query_key: row.get(2)?,
        title: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        overview: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        original_title: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        label: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        size_text: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        year: row.get(8)?,
        genres: decode_list(genres.as_deref()),
        production_countries: decode_list(countries.as_deref()),
        vote_average: row.get(11)?,
        vote_count: row.get(12)?,
        runtime_minutes: row.get(13)?,
        asset_path: row.get(14)?,
    })
}

fn row_to_classified(row: &Row<'_>) -> rusqlite::Result<ClassifiedEntry> {
    let codec: Option<String> = row.get(9)?;
    let hdr: String = row.get(10)?;
    let audio: String = row.get(11)?;
    let quality: String = row.get(12)?;
    Ok(ClassifiedEntry {
        content_hash: row.get(0)?,
        key: ItemKey::new(row.get(1)?, row.get(2)?),
        label: row.get(3)?,
        size_text: row.get(4)?,
        magnet: row.get(5)?,
        seeders: row.get(6)?,
        leechers: row.get(7)?,
        metadata: ClassifiedMetadata {
            resolution: row.get(8)?,
            codec: codec.as_deref().and_then(Codec::from_db_string),
            hdr_type: HdrType::from_db_string(&hdr).unwrap_or_default(),
            audio_tags: split_tags(&audio),
            quality_tags: split_tags(&quality),
            size_bytes: row.get(13)?,
            bitrate_mbps: row.get(14)?,
        },
    })
}

fn encode_list(values: &[String]) -> StorageResult<String> {
    serde_json::to_string(values).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode_list(value: Option<&str>) -> Vec<String> {
    value
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

fn split_tags(joined: &str) -> Vec<String> {
    joined
        .split(TAG_SEPARATOR)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn upsert_record_on(conn: &Connection, record: &PersistedRecord) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO items (external_id, kind, query_key, fetched, title, overview, original_title,
             label, size_text, release_year, genres, production_countries, vote_average,
             vote_count, runtime_minutes, asset_path)
         VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
         ON CONFLICT(external_id, kind) DO UPDATE SET
             fetched = 1,
             title = excluded.title,
             overview = excluded.overview,
             original_title = excluded.original_title,
             label = excluded.label,
             size_text = excluded.size_text,
             release_year = excluded.release_year,
             genres = excluded.genres,
             production_countries = excluded.production_countries,
             vote_average = excluded.vote_average,
             vote_count = excluded.vote_count,
             runtime_minutes = excluded.runtime_minutes,
             asset_path = COALESCE(excluded.asset_path, items.asset_path)",
        params![
            record.external_id,
            record.kind,
            record.query_key,
            record.title,
            record.overview,
            record.original_title,
            record.label,
            record.size_text,
            record.year,
            encode_list(&record.genres)?,
            encode_list(&record.production_countries)?,
            record.vote_average,
            record.vote_count,
            record.runtime_minutes,
            record.asset_path,
        ],
    )?;
    Ok(())
}

fn upsert_classified_on(
    conn: &Connection,
    entry: &ClassifiedEntry,
    classified_at: &str,
) -> StorageResult<()> {
    let meta = &entry.metadata;
    conn.execute(
        "INSERT OR REPLACE INTO classified_metadata (content_hash, external_id, kind, label,
             size_text, magnet, seeders, leechers, resolution, codec, hdr_type, audio, quality,
             size_bytes, bitrate_mbps, classified_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            entry.content_hash,
            entry.key.external_id,
            entry.key.kind,
            entry.label,
            entry.size_text,
            entry.magnet,
            entry.seeders,
            entry.leechers,
            meta.resolution,
            meta.codec.map(|c| c.to_db_string()),
            meta.hdr_type.to_db_string(),
            meta.audio_summary(),
            meta.quality_tags.join(TAG_SEPARATOR),
            meta.size_bytes,
            meta.bitrate_mbps,
            classified_at,
        ],
    )?;
    Ok(())
}

impl CatalogStore for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = format_timestamp(Utc::now());
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                row_to_run,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), run_id],
        )?;
        Ok(())
    }

    fn complete_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counters: &RunCounters,
    ) -> StorageResult<()> {
        let now = format_timestamp(Utc::now());
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, attempted = ?3, succeeded = ?4,
             not_found = ?5, failed = ?6 WHERE id = ?7",
            params![
                status.to_db_string(),
                now,
                counters.attempted as i64,
                counters.succeeded as i64,
                counters.not_found as i64,
                counters.failed as i64,
                run_id
            ],
        )?;
        Ok(())
    }

    // ===== Sync Cursor =====

    fn next_batch(&self, limit: Option<usize>) -> StorageResult<Vec<WorkItem>> {
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(
            "SELECT external_id, kind, query_key, last_synced_at FROM items
             ORDER BY last_synced_at IS NOT NULL, last_synced_at ASC, kind ASC, external_id ASC
             LIMIT ?1",
        )?;

        let items = stmt
            .query_map(params![limit], row_to_work_item)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(items)
    }

    fn insert_work_items(&mut self, items: &[WorkItem]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO items (external_id, kind, query_key, last_synced_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for item in items {
                inserted += stmt.execute(params![
                    item.external_id,
                    item.kind,
                    item.query_key,
                    item.last_synced_at.map(format_timestamp),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn known_ids(&self, kind: ItemKind) -> StorageResult<HashSet<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT external_id FROM items WHERE kind = ?1")?;

        let ids = stmt
            .query_map(params![kind], |row| row.get(0))?
            .collect::<Result<HashSet<i64>, _>>()?;

        Ok(ids)
    }

    fn mark_attempted(&mut self, keys: &[ItemKey], now: DateTime<Utc>) -> StorageResult<()> {
        let now = format_timestamp(now);
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE items SET last_synced_at = ?1 WHERE external_id = ?2 AND kind = ?3",
            )?;
            for key in keys {
                stmt.execute(params![now, key.external_id, key.kind])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_work_item(&self, key: ItemKey) -> StorageResult<Option<WorkItem>> {
        let item = self
            .conn
            .query_row(
                "SELECT external_id, kind, query_key, last_synced_at FROM items
                 WHERE external_id = ?1 AND kind = ?2",
                params![key.external_id, key.kind],
                row_to_work_item,
            )
            .optional()?;
        Ok(item)
    }

    // ===== Records =====

    fn upsert_record(&mut self, record: &PersistedRecord) -> StorageResult<()> {
        upsert_record_on(&self.conn, record)
    }

    fn get_record(&self, key: ItemKey) -> StorageResult<Option<PersistedRecord>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM items WHERE external_id = ?1 AND kind = ?2 AND fetched = 1",
                    RECORD_COLUMNS
                ),
                params![key.external_id, key.kind],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn update_asset_path(&mut self, from: &str, to: &str) -> StorageResult<usize> {
        let updated = self.conn.execute(
            "UPDATE items SET asset_path = ?2 WHERE asset_path = ?1",
            params![from, to],
        )?;
        Ok(updated)
    }

    fn commit_batch(
        &mut self,
        records: &[PersistedRecord],
        classified: &[(ItemKey, Vec<ClassifiedEntry>)],
    ) -> StorageResult<()> {
        let now = format_timestamp(Utc::now());
        let tx = self.conn.transaction()?;

        for record in records {
            upsert_record_on(&tx, record)?;
        }

        for (key, entries) in classified {
            tx.execute(
                "DELETE FROM classified_metadata WHERE external_id = ?1 AND kind = ?2",
                params![key.external_id, key.kind],
            )?;
            for entry in entries {
                upsert_classified_on(&tx, entry, &now)?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    // ===== Classified Metadata =====

    fn upsert_classified(&mut self, entry: &ClassifiedEntry) -> StorageResult<()> {
        upsert_classified_on(&self.conn, entry, &format_timestamp(Utc::now()))
    }

    fn get_classified(&self, content_hash: &str) -> StorageResult<Option<ClassifiedEntry>> {
        let entry = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM classified_metadata WHERE content_hash = ?1",
                    CLASSIFIED_COLUMNS
                ),
                params![content_hash],
                row_to_classified,
            )
            .optional()?;
        Ok(entry)
    }

    fn classified_for(&self, key: ItemKey) -> StorageResult<Vec<ClassifiedEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM classified_metadata WHERE external_id = ?1 AND kind = ?2
             ORDER BY content_hash",
            CLASSIFIED_COLUMNS
        ))?;

        let entries = stmt
            .query_map(params![key.external_id, key.kind], row_to_classified)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn classification_inputs(&self) -> StorageResult<Vec<ClassificationInput>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.content_hash, c.label, c.size_text, i.runtime_minutes
             FROM classified_metadata c
             LEFT JOIN items i ON i.external_id = c.external_id AND i.kind = c.kind
             ORDER BY c.content_hash",
        )?;

        let inputs = stmt
            .query_map([], |row| {
                Ok(ClassificationInput {
                    content_hash: row.get(0)?,
                    label: row.get(1)?,
                    size_text: row.get(2)?,
                    runtime_minutes: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(inputs)
    }

    fn update_classifications(
        &mut self,
        updates: &[(String, ClassifiedMetadata)],
    ) -> StorageResult<usize> {
        let now = format_timestamp(Utc::now());
        let tx = self.conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE classified_metadata SET resolution = ?1, codec = ?2, hdr_type = ?3,
                 audio = ?4, quality = ?5, size_bytes = ?6, bitrate_mbps = ?7, classified_at = ?8
                 WHERE content_hash = ?9",
            )?;
            for (hash, meta) in updates {
                changed += stmt.execute(params![
                    meta.resolution,
                    meta.codec.map(|c| c.to_db_string()),
                    meta.hdr_type.to_db_string(),
                    meta.audio_tags.join(TAG_SEPARATOR),
                    meta.quality_tags.join(TAG_SEPARATOR),
                    meta.size_bytes,
                    meta.bitrate_mbps,
                    now,
                    hash,
                ])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    // ===== Statistics =====

    fn count_items(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM items WHERE fetched = 1", [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }

    fn count_never_synced(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM items WHERE last_synced_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_classified(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM classified_metadata", [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }

    fn resolution_breakdown(&self) -> StorageResult<Vec<(String, u64)>> {
        breakdown(&self.conn, "resolution")
    }

    fn hdr_breakdown(&self) -> StorageResult<Vec<(String, u64)>> {
        breakdown(&self.conn, "hdr_type")
    }
}

fn breakdown(conn: &Connection, column: &str) -> StorageResult<Vec<(String, u64)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {col}, COUNT(*) AS n FROM classified_metadata GROUP BY {col} ORDER BY n DESC, {col}",
        col = column
    ))?;

    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as u64)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}
