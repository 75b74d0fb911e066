//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Catalog-Sync database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track sync runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    attempted INTEGER NOT NULL DEFAULT 0,
    succeeded INTEGER NOT NULL DEFAULT 0,
    not_found INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0
);

-- Backlog cursor and fetched record, one row per catalog item
CREATE TABLE IF NOT EXISTS items (
    external_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    query_key TEXT NOT NULL,
    last_synced_at TEXT,
    fetched INTEGER NOT NULL DEFAULT 0,
    title TEXT,
    overview TEXT,
    original_title TEXT,
    label TEXT,
    size_text TEXT,
    release_year INTEGER,
    genres TEXT,
    production_countries TEXT,
    vote_average REAL,
    vote_count INTEGER,
    runtime_minutes INTEGER,
    asset_path TEXT,
    PRIMARY KEY (external_id, kind)
);

CREATE INDEX IF NOT EXISTS idx_items_last_synced ON items(last_synced_at);

-- Classified releases keyed by content hash
CREATE TABLE IF NOT EXISTS classified_metadata (
    content_hash TEXT PRIMARY KEY,
    external_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    label TEXT NOT NULL,
    size_text TEXT NOT NULL,
    magnet TEXT,
    seeders INTEGER,
    leechers INTEGER,
    resolution TEXT NOT NULL,
    codec TEXT,
    hdr_type TEXT NOT NULL,
    audio TEXT NOT NULL,
    quality TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    bitrate_mbps REAL,
    classified_at TEXT NOT NULL,
    FOREIGN KEY (external_id, kind) REFERENCES items(external_id, kind)
);

CREATE INDEX IF NOT EXISTS idx_classified_item ON classified_metadata(external_id, kind);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
