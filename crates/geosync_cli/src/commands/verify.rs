//! Verify command implementation.
//!
//! A read-only scan over the raw cache file bytes. Unlike opening the
//! file through the library, this never truncates a torn tail; it only
//! reports what it finds.

use geosync_cache::{CacheHeader, CacheRecord, CacheStore, SyncStamp};
use geosync_model::DatasetId;
use std::fs;
use std::path::Path;

/// Verification result for one dataset.
#[derive(Debug)]
pub struct VerifyResult {
    /// Number of records checked.
    pub records_checked: usize,
    /// Number of valid records.
    pub valid_records: usize,
    /// Number of corrupt records.
    pub corrupt_records: usize,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn new() -> Self {
        Self {
            records_checked: 0,
            valid_records: 0,
            corrupt_records: 0,
            errors: Vec::new(),
        }
    }

    fn is_ok(&self) -> bool {
        self.corrupt_records == 0 && self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(
    store_path: &Path,
    dataset: Option<u64>,
    all: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = CacheStore::open(store_path)?;

    let ids: Vec<DatasetId> = if all {
        store.list_datasets()?
    } else {
        vec![DatasetId::new(dataset.ok_or("Specify a dataset id or --all")?)]
    };

    if ids.is_empty() {
        println!("No cached datasets to verify.");
        return Ok(());
    }

    let mut failed = false;
    for id in ids {
        println!("Verifying dataset {}...", id.as_u64());

        if !store.has_cache(id) {
            println!("  No cache file (this may be normal for a cleared dataset)");
        } else {
            let result = verify_cache_file(&store.cache_path(id))?;
            print_result(&result);
            failed |= !result.is_ok();
        }

        match SyncStamp::load(&store.stamp_path(id)) {
            Ok(Some(stamp)) if stamp.dataset_id == id => {
                println!("  Stamp ok: synced at {} ms", stamp.last_synced_at.as_millis());
            }
            Ok(Some(stamp)) => {
                println!("  ERROR: stamp belongs to dataset {}", stamp.dataset_id);
                failed = true;
            }
            Ok(None) => println!("  No sync stamp (dataset will full-sync on next open)"),
            Err(e) => {
                println!("  ERROR: unreadable stamp: {}", e);
                failed = true;
            }
        }
        println!();
    }

    if failed {
        println!("✗ Cache verification failed");
        Err("Verification failed".into())
    } else {
        println!("✓ Cache verification passed");
        Ok(())
    }
}

fn verify_cache_file(path: &Path) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::new();
    let data = fs::read(path)?;

    let mut cursor = data.as_slice();
    let header_len = match CacheHeader::read_from(&mut cursor) {
        Ok((_, len)) => len as usize,
        Err(e) => {
            result.errors.push(format!("Bad header: {}", e));
            result.corrupt_records += 1;
            return Ok(result);
        }
    };

    let mut offset = header_len;
    while offset + 4 <= data.len() {
        result.records_checked += 1;

        let record_len = u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;

        if record_len < CacheRecord::MIN_SIZE {
            result.errors.push(format!(
                "Impossible record length {} at offset {}",
                record_len, offset
            ));
            result.corrupt_records += 1;
            break;
        }
        if offset + record_len > data.len() {
            result.errors.push(format!(
                "Truncated record at offset {}: needs {} bytes, only {} available",
                offset,
                record_len,
                data.len() - offset
            ));
            result.corrupt_records += 1;
            break;
        }

        match CacheRecord::decode(&data[offset..offset + record_len]) {
            Ok(_) => result.valid_records += 1,
            Err(e) => {
                result
                    .errors
                    .push(format!("Corrupt record at offset {}: {}", offset, e));
                result.corrupt_records += 1;
            }
        }

        offset += record_len;
    }

    if offset < data.len() && result.errors.is_empty() {
        result.errors.push(format!(
            "Torn tail: {} trailing bytes after last complete record",
            data.len() - offset
        ));
    }

    Ok(result)
}

fn print_result(result: &VerifyResult) {
    println!(
        "  Records checked: {}, valid: {}, corrupt: {}",
        result.records_checked, result.valid_records, result.corrupt_records
    );
    for error in &result.errors {
        println!("    ERROR: {}", error);
    }
}
