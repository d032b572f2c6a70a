//! The cache store: one directory holding every dataset's cache file,
//! sync stamp and the store-wide lock.
//!
//! Layout:
//!
//! ```text
//! <root>/
//! ├─ LOCK            # advisory lock, one process at a time
//! ├─ ds-7.gvc        # cache file for dataset 7
//! ├─ ds-7.stamp      # sync stamp for dataset 7
//! └─ ds-12.gvc ...
//! ```

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use geosync_model::{DatasetId, GeometryKind, Schema, Timestamp};
use tracing::warn;

use crate::error::{CacheError, Result};
use crate::file::CacheFile;
use crate::fsutil::temp_path;
use crate::header::CacheHeader;
use crate::stamp::SyncStamp;

const LOCK_FILE: &str = "LOCK";
const CACHE_EXT: &str = "gvc";
const STAMP_EXT: &str = "stamp";
const FILE_PREFIX: &str = "ds-";

/// What orphan recovery found and did for one dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanResolution {
    /// Cache file and stamp agree (both present or both absent).
    Consistent,
    /// A cache file without a usable stamp was deleted.
    DroppedCacheFile,
    /// A stamp without a cache file was deleted.
    DroppedStamp,
}

/// Manages the cache directory and holds its exclusive lock.
///
/// Only one `CacheStore` may exist per directory across all processes;
/// the advisory `LOCK` file enforces that. Per-dataset serialisation is
/// the caller's job.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    _lock_file: File,
}

impl CacheStore {
    /// Opens or creates the cache directory and takes its lock.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CacheError::StoreLocked);
        }

        Ok(Self {
            root: root.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the cache file for `id`.
    #[must_use]
    pub fn cache_path(&self, id: DatasetId) -> PathBuf {
        self.root.join(format!("{FILE_PREFIX}{}.{CACHE_EXT}", id.as_u64()))
    }

    /// Path of the stamp file for `id`.
    #[must_use]
    pub fn stamp_path(&self, id: DatasetId) -> PathBuf {
        self.root.join(format!("{FILE_PREFIX}{}.{STAMP_EXT}", id.as_u64()))
    }

    /// True when a cache file exists for `id`.
    #[must_use]
    pub fn has_cache(&self, id: DatasetId) -> bool {
        self.cache_path(id).exists()
    }

    /// True when a stamp file exists for `id`.
    #[must_use]
    pub fn has_stamp(&self, id: DatasetId) -> bool {
        self.stamp_path(id).exists()
    }

    /// Opens the cache for `id`, creating an empty file when absent and
    /// reconciling the stored schema with `schema` when present.
    ///
    /// A file that belongs to a different dataset id, or was created
    /// with a different geometry kind, fails with
    /// [`CacheError::DatasetMismatch`]; the caller clears and rebuilds.
    pub fn open_dataset(
        &self,
        id: DatasetId,
        geometry_kind: GeometryKind,
        schema: &Schema,
    ) -> Result<CacheFile> {
        let path = self.cache_path(id);
        if !path.exists() {
            let header = CacheHeader::new(id, geometry_kind, schema.clone());
            return CacheFile::create(&path, header);
        }

        let mut cache = CacheFile::open(&path)?;
        if cache.dataset_id() != id {
            return Err(CacheError::dataset_mismatch(format!(
                "file {} holds {} but {} was requested",
                path.display(),
                cache.dataset_id(),
                id
            )));
        }
        if cache.geometry_kind() != geometry_kind {
            return Err(CacheError::dataset_mismatch(format!(
                "cached geometry kind {} does not match {}",
                cache.geometry_kind(),
                geometry_kind
            )));
        }
        cache.migrate_schema(schema)?;
        Ok(cache)
    }

    /// Creates a fresh, empty cache file for `id`, discarding any
    /// existing contents. Used when a full rebuild starts.
    pub fn create_dataset(
        &self,
        id: DatasetId,
        geometry_kind: GeometryKind,
        schema: &Schema,
    ) -> Result<CacheFile> {
        let header = CacheHeader::new(id, geometry_kind, schema.clone());
        CacheFile::create(&self.cache_path(id), header)
    }

    /// Loads the sync stamp for `id`.
    ///
    /// A structurally damaged stamp is removed and reported as absent:
    /// without a trustworthy stamp the only safe interpretation is
    /// "never synced", which forces a full rebuild.
    pub fn load_stamp(&self, id: DatasetId) -> Result<Option<Timestamp>> {
        let path = self.stamp_path(id);
        match SyncStamp::load(&path) {
            Ok(Some(stamp)) if stamp.dataset_id == id => Ok(Some(stamp.last_synced_at)),
            Ok(Some(stamp)) => {
                warn!(
                    dataset = %id,
                    found = %stamp.dataset_id,
                    "stamp belongs to a different dataset, discarding"
                );
                let _ = fs::remove_file(&path);
                Ok(None)
            }
            Ok(None) => Ok(None),
            Err(CacheError::Io(e)) => Err(CacheError::Io(e)),
            Err(e) => {
                warn!(dataset = %id, error = %e, "unreadable sync stamp, discarding");
                let _ = fs::remove_file(&path);
                Ok(None)
            }
        }
    }

    /// Persists the sync stamp for `id`.
    pub fn save_stamp(&self, id: DatasetId, at: Timestamp) -> Result<()> {
        SyncStamp::new(id, at).save(&self.stamp_path(id))
    }

    /// Removes the stamp for `id`; returns whether one existed.
    pub fn delete_stamp(&self, id: DatasetId) -> Result<bool> {
        match fs::remove_file(self.stamp_path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes the cache file for `id`; returns whether one existed.
    ///
    /// Unlike [`clear`], a removal failure is a hard error. Rebuild
    /// paths use this: starting a full sync on top of a file that could
    /// not be discarded would be worse than failing.
    ///
    /// [`clear`]: CacheStore::clear
    pub fn delete_cache_file(&self, id: DatasetId) -> Result<bool> {
        match fs::remove_file(self.cache_path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Reconciles "cache file exists" with "stamp exists" for `id`.
    ///
    /// Either side on its own is an orphan from an interrupted run and
    /// is deleted, so the next sync starts from a clean slate.
    pub fn resolve_orphans(&self, id: DatasetId) -> Result<OrphanResolution> {
        let stamp = self.load_stamp(id)?;
        let has_cache = self.has_cache(id);

        match (has_cache, stamp) {
            (true, None) => {
                fs::remove_file(self.cache_path(id))?;
                warn!(dataset = %id, "dropped cache file with no sync stamp");
                Ok(OrphanResolution::DroppedCacheFile)
            }
            (false, Some(_)) => {
                self.delete_stamp(id)?;
                warn!(dataset = %id, "dropped sync stamp with no cache file");
                Ok(OrphanResolution::DroppedStamp)
            }
            _ => Ok(OrphanResolution::Consistent),
        }
    }

    /// Best-effort removal of every file belonging to `id`.
    ///
    /// Each file is removed independently; a failure on one does not
    /// stop the others. Returns `true` only if nothing was left behind.
    pub fn clear(&self, id: DatasetId) -> bool {
        let cache = self.cache_path(id);
        let stamp = self.stamp_path(id);
        let mut all_ok = true;
        for path in [&cache, &stamp, &temp_path(&cache), &temp_path(&stamp)] {
            all_ok &= remove_best_effort(path);
        }
        all_ok
    }

    /// Best-effort removal of every dataset in the store.
    pub fn clear_all(&self) -> bool {
        match self.list_datasets() {
            Ok(ids) => {
                let mut all_ok = true;
                for id in ids {
                    all_ok &= self.clear(id);
                }
                all_ok
            }
            Err(e) => {
                warn!(error = %e, "could not enumerate cache directory");
                false
            }
        }
    }

    /// Every dataset id with a cache file or stamp in the store, sorted.
    pub fn list_datasets(&self) -> Result<Vec<DatasetId>> {
        let mut ids = BTreeSet::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(id) = parse_dataset_file(name) {
                    ids.insert(id);
                }
            }
        }
        Ok(ids.into_iter().collect())
    }
}

/// Extracts the dataset id from a store file name, tmp siblings included.
fn parse_dataset_file(name: &str) -> Option<DatasetId> {
    let rest = name.strip_prefix(FILE_PREFIX)?;
    let (raw_id, ext) = rest.split_once('.')?;
    match ext {
        "gvc" | "stamp" | "gvc.tmp" | "stamp.tmp" => {
            raw_id.parse::<u64>().ok().map(DatasetId::new)
        }
        _ => None,
    }
}

fn remove_best_effort(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not remove cache artifact");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geosync_model::{FieldDef, FieldType};
    use tempfile::tempdir;

    fn point_schema() -> Schema {
        Schema::new(vec![FieldDef::new("name", FieldType::Text)]).unwrap()
    }

    #[test]
    fn open_creates_root_and_locks_it() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("caches");

        let store = CacheStore::open(&root).unwrap();
        assert!(root.is_dir());

        assert!(matches!(
            CacheStore::open(&root),
            Err(CacheError::StoreLocked)
        ));

        drop(store);
        CacheStore::open(&root).unwrap();
    }

    #[test]
    fn open_dataset_creates_then_reopens() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let id = DatasetId::new(7);

        let cache = store
            .open_dataset(id, GeometryKind::Point, &point_schema())
            .unwrap();
        assert_eq!(cache.row_count(), 0);
        drop(cache);
        assert!(store.has_cache(id));

        let cache = store
            .open_dataset(id, GeometryKind::Point, &point_schema())
            .unwrap();
        assert_eq!(cache.dataset_id(), id);
    }

    #[test]
    fn open_dataset_reconciles_schema() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let id = DatasetId::new(7);
        drop(store.open_dataset(id, GeometryKind::Point, &point_schema()).unwrap());

        let wider = Schema::new(vec![
            FieldDef::new("name", FieldType::Text),
            FieldDef::new("elevation", FieldType::Float),
        ])
        .unwrap();
        let cache = store.open_dataset(id, GeometryKind::Point, &wider).unwrap();
        assert_eq!(cache.schema(), &wider);
    }

    #[test]
    fn open_dataset_rejects_wrong_identity() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let id = DatasetId::new(1);
        drop(store.open_dataset(id, GeometryKind::Point, &point_schema()).unwrap());

        // A file for dataset 1 masquerading as dataset 2.
        fs::copy(store.cache_path(id), store.cache_path(DatasetId::new(2))).unwrap();
        assert!(matches!(
            store.open_dataset(DatasetId::new(2), GeometryKind::Point, &point_schema()),
            Err(CacheError::DatasetMismatch { .. })
        ));

        // Same dataset, different geometry kind.
        assert!(matches!(
            store.open_dataset(id, GeometryKind::Polygon, &point_schema()),
            Err(CacheError::DatasetMismatch { .. })
        ));
    }

    #[test]
    fn stamps_round_trip_and_heal() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let id = DatasetId::new(9);

        assert_eq!(store.load_stamp(id).unwrap(), None);
        store.save_stamp(id, Timestamp::new(42)).unwrap();
        assert_eq!(store.load_stamp(id).unwrap(), Some(Timestamp::new(42)));

        // Corrupt the stamp; loading discards it instead of failing.
        fs::write(store.stamp_path(id), b"garbage").unwrap();
        assert_eq!(store.load_stamp(id).unwrap(), None);
        assert!(!store.has_stamp(id));

        assert!(!store.delete_stamp(id).unwrap());
    }

    #[test]
    fn orphaned_cache_file_is_dropped() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let id = DatasetId::new(3);

        drop(store.open_dataset(id, GeometryKind::Line, &point_schema()).unwrap());
        assert_eq!(
            store.resolve_orphans(id).unwrap(),
            OrphanResolution::DroppedCacheFile
        );
        assert!(!store.has_cache(id));
    }

    #[test]
    fn orphaned_stamp_is_dropped() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let id = DatasetId::new(3);

        store.save_stamp(id, Timestamp::new(5)).unwrap();
        assert_eq!(
            store.resolve_orphans(id).unwrap(),
            OrphanResolution::DroppedStamp
        );
        assert!(!store.has_stamp(id));
    }

    #[test]
    fn consistent_pairs_are_left_alone() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let id = DatasetId::new(3);

        assert_eq!(
            store.resolve_orphans(id).unwrap(),
            OrphanResolution::Consistent
        );

        drop(store.open_dataset(id, GeometryKind::Point, &point_schema()).unwrap());
        store.save_stamp(id, Timestamp::new(5)).unwrap();
        assert_eq!(
            store.resolve_orphans(id).unwrap(),
            OrphanResolution::Consistent
        );
        assert!(store.has_cache(id));
        assert!(store.has_stamp(id));
    }

    #[test]
    fn clear_removes_all_artifacts() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let id = DatasetId::new(11);

        drop(store.open_dataset(id, GeometryKind::Point, &point_schema()).unwrap());
        store.save_stamp(id, Timestamp::new(1)).unwrap();

        assert!(store.clear(id));
        assert!(!store.has_cache(id));
        assert!(!store.has_stamp(id));

        // Clearing an absent dataset succeeds vacuously.
        assert!(store.clear(DatasetId::new(404)));
    }

    #[test]
    fn clear_all_and_listing() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();

        for raw in [4u64, 2, 8] {
            let id = DatasetId::new(raw);
            drop(store.open_dataset(id, GeometryKind::Point, &point_schema()).unwrap());
            store.save_stamp(id, Timestamp::new(raw)).unwrap();
        }
        // A stamp-only dataset still shows up in the listing.
        store.save_stamp(DatasetId::new(6), Timestamp::new(6)).unwrap();

        let ids: Vec<u64> = store
            .list_datasets()
            .unwrap()
            .iter()
            .map(|id| id.as_u64())
            .collect();
        assert_eq!(ids, vec![2, 4, 6, 8]);

        assert!(store.clear_all());
        assert!(store.list_datasets().unwrap().is_empty());
    }
}
