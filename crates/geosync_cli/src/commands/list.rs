//! List command implementation.

use geosync_cache::{CacheFile, CacheStore};
use geosync_model::DatasetId;
use serde::Serialize;
use std::path::Path;

/// One dataset as reported by `list`.
#[derive(Debug, Serialize)]
pub struct DatasetEntry {
    /// Dataset id.
    pub id: u64,
    /// Live row count; `None` when the cache file is absent or unreadable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    /// Cache file size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Geometry kind recorded in the cache header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<String>,
    /// Last successful sync, as milliseconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<u64>,
    /// Why the cache file could not be read, if it could not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs the list command.
pub fn run(store_path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = CacheStore::open(store_path)?;
    let mut entries = Vec::new();

    for id in store.list_datasets()? {
        entries.push(describe(&store, id));
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => print_text_output(store_path, &entries),
    }

    Ok(())
}

fn describe(store: &CacheStore, id: DatasetId) -> DatasetEntry {
    let mut entry = DatasetEntry {
        id: id.as_u64(),
        rows: None,
        size: None,
        geometry: None,
        synced_at: None,
        error: None,
    };

    if store.has_cache(id) {
        match CacheFile::open(&store.cache_path(id)) {
            Ok(cache) => {
                entry.rows = Some(cache.row_count());
                entry.size = Some(cache.file_size());
                entry.geometry = Some(cache.geometry_kind().as_str().to_string());
            }
            Err(e) => entry.error = Some(e.to_string()),
        }
    }

    match store.load_stamp(id) {
        Ok(Some(at)) => entry.synced_at = Some(at.as_millis()),
        Ok(None) => {}
        Err(e) if entry.error.is_none() => entry.error = Some(e.to_string()),
        Err(_) => {}
    }

    entry
}

fn print_text_output(store_path: &Path, entries: &[DatasetEntry]) {
    println!("Cache store: {}", store_path.display());
    println!();
    if entries.is_empty() {
        println!("No cached datasets.");
        return;
    }

    println!("{:>10}  {:>8}  {:>10}  {:<8}  {:<14}", "dataset", "rows", "size", "geometry", "synced at");
    for entry in entries {
        println!(
            "{:>10}  {:>8}  {:>10}  {:<8}  {:<14}",
            entry.id,
            entry.rows.map_or("-".to_string(), |n| n.to_string()),
            entry.size.map_or("-".to_string(), format_size),
            entry.geometry.as_deref().unwrap_or("-"),
            entry.synced_at.map_or("never".to_string(), |ms| ms.to_string()),
        );
        if let Some(error) = &entry.error {
            println!("{:>10}  ERROR: {}", "", error);
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geosync_model::{FieldDef, FieldType, GeometryKind, Schema, Timestamp};
    use tempfile::tempdir;

    fn seeded(root: &Path) -> DatasetId {
        let id = DatasetId::new(7);
        let store = CacheStore::open(root).unwrap();
        let schema = Schema::new(vec![FieldDef::new("name", FieldType::Text)]).unwrap();
        store
            .create_dataset(id, GeometryKind::Point, &schema)
            .unwrap();
        store.save_stamp(id, Timestamp::new(1_500)).unwrap();
        id
    }

    #[test]
    fn describe_reads_header_and_stamp() {
        let dir = tempdir().unwrap();
        let id = seeded(dir.path());

        let store = CacheStore::open(dir.path()).unwrap();
        let entry = describe(&store, id);
        assert_eq!(entry.id, 7);
        assert_eq!(entry.rows, Some(0));
        assert_eq!(entry.geometry.as_deref(), Some("point"));
        assert_eq!(entry.synced_at, Some(1_500));
        assert!(entry.error.is_none());
    }

    #[test]
    fn run_handles_an_empty_store() {
        let dir = tempdir().unwrap();
        run(dir.path(), "text").unwrap();
        run(dir.path(), "json").unwrap();
    }
}
