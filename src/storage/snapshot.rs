//! Backlog seeding from a bulk ID export
//!
//! The remote service publishes a daily export with one JSON object per line
//! (`{"id": 550, ...}`), gzip-compressed. Diffing that set against the IDs
//! already stored gives the items that have never been seen locally.

use crate::storage::traits::{CatalogStore, StorageResult};
use crate::storage::{ItemKind, WorkItem};
use flate2::bufread::GzDecoder;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Deserialize)]
struct DumpLine {
    id: i64,
}

/// Reads the set of IDs from a JSON-lines export
///
/// Gzip-compressed exports are recognised by their magic bytes and
/// decompressed on the fly. Blank and undecodable lines are skipped.
pub fn read_id_dump(path: &Path) -> std::io::Result<HashSet<i64>> {
    let mut reader = BufReader::new(File::open(path)?);
    let gzipped = reader.fill_buf()?.starts_with(&GZIP_MAGIC);

    if gzipped {
        read_ids(BufReader::new(GzDecoder::new(reader)), path)
    } else {
        read_ids(reader, path)
    }
}

fn read_ids<R: BufRead>(reader: R, path: &Path) -> std::io::Result<HashSet<i64>> {
    let mut ids = HashSet::new();
    let mut skipped = 0usize;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<DumpLine>(&line) {
            Ok(entry) => {
                ids.insert(entry.id);
            }
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!("Skipped {} undecodable lines in {}", skipped, path.display());
    }

    Ok(ids)
}

/// IDs present remotely but not locally, in ascending order
pub fn new_ids(remote: &HashSet<i64>, local: &HashSet<i64>) -> Vec<i64> {
    let mut ids: Vec<i64> = remote.difference(local).copied().collect();
    ids.sort_unstable();
    ids
}

/// Adds every remote ID missing from the store as a never-synced work item
///
/// Returns the number of items added.
pub fn seed_from_snapshot(
    store: &mut dyn CatalogStore,
    kind: ItemKind,
    remote: &HashSet<i64>,
) -> StorageResult<usize> {
    let local = store.known_ids(kind)?;
    let missing = new_ids(remote, &local);

    tracing::info!(
        "Snapshot has {} {} IDs, {} known locally, {} new",
        remote.len(),
        kind,
        local.len(),
        missing.len()
    );

    let items: Vec<WorkItem> = missing
        .into_iter()
        .map(|id| WorkItem::new(id, kind))
        .collect();

    store.insert_work_items(&items)
}
