//! Clear command implementation.

use geosync_cache::CacheStore;
use geosync_model::DatasetId;
use std::path::Path;

/// Runs the clear command.
pub fn run(
    store_path: &Path,
    dataset: Option<u64>,
    all: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = CacheStore::open(store_path)?;

    let clean = if all {
        let ids = store.list_datasets()?;
        println!("Clearing {} dataset(s)...", ids.len());
        store.clear_all()
    } else {
        let id = DatasetId::new(dataset.ok_or("Specify a dataset id or --all")?);
        println!("Clearing dataset {}...", id.as_u64());
        store.clear(id)
    };

    if clean {
        println!("✓ Cleared");
        Ok(())
    } else {
        println!("✗ Some files could not be removed (see log for details)");
        Err("Clear was incomplete".into())
    }
}
