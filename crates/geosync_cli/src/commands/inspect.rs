//! Inspect command implementation.

use geosync_cache::{CacheFile, CacheStore};
use geosync_model::DatasetId;
use serde::Serialize;
use std::path::Path;

/// Dataset inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Dataset id.
    pub id: u64,
    /// Cache file path.
    pub path: String,
    /// Geometry kind recorded in the header.
    pub geometry: String,
    /// Schema columns as `name: type` pairs.
    pub schema: Vec<String>,
    /// Live row count.
    pub rows: usize,
    /// Highest live feature id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_feature_id: Option<u64>,
    /// File size in bytes.
    pub size: u64,
    /// Bytes held by superseded records and tombstones.
    pub dead_bytes: u64,
    /// Last successful sync, as milliseconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<u64>,
}

/// Runs the inspect command.
pub fn run(store_path: &Path, dataset: u64, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = CacheStore::open(store_path)?;
    let id = DatasetId::new(dataset);

    if !store.has_cache(id) {
        return Err(format!("No cache file for dataset {}", dataset).into());
    }
    let cache = CacheFile::open(&store.cache_path(id))?;

    let result = InspectResult {
        id: dataset,
        path: store.cache_path(id).display().to_string(),
        geometry: cache.geometry_kind().as_str().to_string(),
        schema: cache
            .schema()
            .fields()
            .iter()
            .map(|f| format!("{}: {}", f.name, f.field_type.as_str()))
            .collect(),
        rows: cache.row_count(),
        max_feature_id: cache.max_feature_id().map(|f| f.as_u64()),
        size: cache.file_size(),
        dead_bytes: cache.dead_bytes(),
        synced_at: store.load_stamp(id)?.map(|at| at.as_millis()),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Dataset {} inspection", result.id);
    println!("=====================");
    println!();
    println!("Path: {}", result.path);
    println!("Geometry: {}", result.geometry);
    println!();
    println!("Schema:");
    for field in &result.schema {
        println!("  {}", field);
    }
    println!();
    println!("Records:");
    println!("  Live rows:      {}", result.rows);
    println!(
        "  Max feature id: {}",
        result.max_feature_id.map_or("-".to_string(), |v| v.to_string())
    );
    println!("  File size:      {} bytes", result.size);
    println!("  Dead bytes:     {}", result.dead_bytes);
    println!();
    match result.synced_at {
        Some(ms) => println!("Last synced at: {} ms", ms),
        None => println!("Last synced at: never"),
    }
}
