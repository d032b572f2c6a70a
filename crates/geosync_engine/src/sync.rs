//! The dataset sync state machine.
//!
//! Every dataset moves through five states. `NoCache` means nothing
//! trustworthy is on disk; a sync from there downloads everything
//! (`FullSyncing`) and lands in `UpToDate`. Later syncs apply a diff
//! since the previous stamp (`DiffSyncing`). `Corrupt` is terminal
//! until the caller clears the cache.
//!
//! A sync holds the dataset's slot mutex from start to finish, so it
//! is the one logical operation on that dataset while it runs.
//! Cancellation is checked only between remote batches; whole pages
//! either land in the cache or never started.

use std::sync::Arc;
use std::time::{Duration, Instant};

use geosync_cache::{CacheError, CacheStore, OrphanResolution};
use geosync_model::{DatasetId, RemoteDataset, Timestamp};
use geosync_remote::{RemoteError, RemoteVectorClient};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::registry::{DatasetSlot, SlotInner};

/// Where a dataset sits in its sync lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No usable cache on disk.
    NoCache,
    /// A full download is in progress.
    FullSyncing,
    /// Cache and stamp reflect the last completed sync.
    UpToDate,
    /// An incremental diff is being applied.
    DiffSyncing,
    /// The cache file failed validation. Only clearing it recovers.
    Corrupt,
}

impl SyncState {
    /// Returns `true` while a sync operation is running.
    pub fn is_busy(&self) -> bool {
        matches!(self, SyncState::FullSyncing | SyncState::DiffSyncing)
    }

    /// Returns `true` when the cache can serve reads.
    pub fn is_ready(&self) -> bool {
        *self == SyncState::UpToDate
    }

    /// Short lowercase name, for logs and status output.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::NoCache => "no-cache",
            SyncState::FullSyncing => "full-syncing",
            SyncState::UpToDate => "up-to-date",
            SyncState::DiffSyncing => "diff-syncing",
            SyncState::Corrupt => "corrupt",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which path a completed sync took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    /// Every row was downloaded from scratch.
    Full,
    /// A diff since the previous stamp was applied.
    Incremental,
}

/// What a completed sync did.
#[derive(Debug, Clone, Copy)]
pub struct SyncOutcome {
    /// Path taken. A diff overflow that fell back to a rebuild reports
    /// [`SyncKind::Full`].
    pub kind: SyncKind,
    /// Pages downloaded (full path only).
    pub pages: u32,
    /// Rows downloaded by page (full path only).
    pub rows_fetched: u64,
    /// Rows inserted or replaced from a diff.
    pub rows_updated: u64,
    /// Rows removed by a diff.
    pub rows_deleted: u64,
    /// Live rows in the cache afterwards.
    pub row_count: usize,
    /// Wall-clock time the sync took.
    pub duration: Duration,
}

/// Drives datasets between cache states against a remote service.
///
/// One engine serves every dataset in a session. It owns no per-dataset
/// state itself; that lives in [`DatasetSlot`]s, whose mutex
/// `sync_dataset` holds for the whole operation.
#[derive(Debug)]
pub struct SyncEngine<R> {
    store: Arc<CacheStore>,
    remote: Arc<R>,
    config: EngineConfig,
}

impl<R: RemoteVectorClient> SyncEngine<R> {
    /// Creates an engine over `store` and `remote`.
    pub fn new(store: Arc<CacheStore>, remote: Arc<R>, config: EngineConfig) -> Self {
        SyncEngine {
            store,
            remote,
            config,
        }
    }

    /// Brings the dataset behind `slot` up to date.
    ///
    /// Chooses the path from on-disk evidence: no trustworthy stamp
    /// means a full download, otherwise a diff since the stamp. A
    /// [`RemoteError::DiffOverflow`] reply discards the cache and
    /// falls back to a full rebuild within this same call.
    ///
    /// On success the slot is `UpToDate`. Cancellation and remote
    /// failures leave the previous on-disk state intact; `Corrupt` is
    /// entered only when the cache file itself stops being readable.
    pub fn sync_dataset(&self, slot: &DatasetSlot, cancel: &CancelToken) -> Result<SyncOutcome> {
        let started = Instant::now();
        let id = slot.id();

        // Descriptor first: the full-or-diff decision and schema
        // reconciliation both need it. Fetched before the slot lock so
        // readers stay unblocked during the round trip.
        let descriptor = self.remote.get_dataset(id)?;

        let mut inner = slot.lock();
        if inner.state == SyncState::Corrupt {
            return Err(EngineError::CacheCorrupt { dataset: id });
        }
        inner.dataset = Some(descriptor.clone());

        let result = self.run_sync(&mut inner, &descriptor, cancel);
        inner.state = self.settle_state(id, &result);
        drop(inner);

        match result {
            Ok(mut outcome) => {
                outcome.duration = started.elapsed();
                info!(
                    dataset = %id,
                    kind = ?outcome.kind,
                    rows = outcome.row_count,
                    elapsed = ?outcome.duration,
                    "sync complete"
                );
                Ok(outcome)
            }
            Err(EngineError::Cancelled) => {
                info!(dataset = %id, "sync cancelled at batch boundary");
                Err(EngineError::Cancelled)
            }
            Err(e) => {
                warn!(dataset = %id, error = %e, "sync failed");
                Err(e)
            }
        }
    }

    fn run_sync(
        &self,
        inner: &mut SlotInner,
        descriptor: &RemoteDataset,
        cancel: &CancelToken,
    ) -> Result<SyncOutcome> {
        let id = descriptor.id;

        let resolution = self.store.resolve_orphans(id)?;
        if resolution != OrphanResolution::Consistent {
            // Whatever handle we held pointed at state that was just
            // discarded.
            inner.cache = None;
        }

        match self.store.load_stamp(id)? {
            Some(since) => self.incremental_sync(inner, descriptor, since, cancel),
            None => self.full_sync(inner, descriptor, cancel),
        }
    }

    /// Downloads the whole dataset into a fresh cache file.
    fn full_sync(
        &self,
        inner: &mut SlotInner,
        descriptor: &RemoteDataset,
        cancel: &CancelToken,
    ) -> Result<SyncOutcome> {
        let id = descriptor.id;
        inner.state = SyncState::FullSyncing;
        inner.cache = None;

        // Stamp goes first: a crash after the truncate must read back
        // as never-synced, not as synced-and-empty.
        self.store.delete_stamp(id)?;
        let mut cache =
            self.store
                .create_dataset(id, descriptor.geometry_kind, &descriptor.schema)?;

        info!(
            dataset = %id,
            remote_rows = descriptor.feature_count,
            "starting full sync"
        );

        // Captured before the first fetch, so rows changing while
        // pages stream in fall inside the next diff window.
        let started_at = Timestamp::now();
        let page_size = self.config.full_sync_page_size;
        let mut after = None;
        let mut pages = 0u32;
        let mut fetched = 0u64;
        loop {
            cancel.checkpoint()?;
            let page = self.remote.list_features(id, after, page_size)?;
            if page.is_empty() {
                break;
            }
            cache.upsert_many(&page)?;
            pages += 1;
            fetched += page.len() as u64;
            after = page.last().map(|row| row.id);
            debug!(dataset = %id, page = pages, rows = page.len(), "full sync page stored");
            if page.len() < page_size {
                break;
            }
        }

        self.store.save_stamp(id, started_at)?;
        let row_count = cache.row_count();
        inner.cache = Some(cache);
        Ok(SyncOutcome {
            kind: SyncKind::Full,
            pages,
            rows_fetched: fetched,
            rows_updated: 0,
            rows_deleted: 0,
            row_count,
            duration: Duration::ZERO,
        })
    }

    /// Applies the diff since `since`, or falls back to a rebuild.
    fn incremental_sync(
        &self,
        inner: &mut SlotInner,
        descriptor: &RemoteDataset,
        since: Timestamp,
        cancel: &CancelToken,
    ) -> Result<SyncOutcome> {
        let id = descriptor.id;
        inner.state = SyncState::DiffSyncing;

        if let Err(e) = self.ensure_cache(inner, descriptor) {
            return match e {
                EngineError::Cache(CacheError::DatasetMismatch { message }) => {
                    warn!(dataset = %id, %message, "cached identity differs from remote, rebuilding");
                    self.wipe(inner, id)?;
                    self.full_sync(inner, descriptor, cancel)
                }
                other => Err(other),
            };
        }

        // Same rule as the full path: the next window opens before the
        // diff is fetched.
        let captured_at = Timestamp::now();
        cancel.checkpoint()?;
        let diff = match self.remote.get_diff(id, since) {
            Ok(diff) => diff,
            Err(RemoteError::DiffOverflow) => {
                info!(dataset = %id, "diff overflow, falling back to full rebuild");
                self.wipe(inner, id)?;
                return self.full_sync(inner, descriptor, cancel);
            }
            Err(e) => return Err(e.into()),
        };

        let cache = inner
            .cache
            .as_mut()
            .ok_or(EngineError::DatasetNotOpen { dataset: id })?;
        let deleted = cache.delete_many(&diff.deleted_ids)? as u64;
        cache.upsert_many(&diff.updated_rows)?;
        self.store.save_stamp(id, captured_at)?;
        debug!(
            dataset = %id,
            updated = diff.updated_rows.len(),
            deleted,
            "diff applied"
        );
        Ok(SyncOutcome {
            kind: SyncKind::Incremental,
            pages: 0,
            rows_fetched: 0,
            rows_updated: diff.updated_rows.len() as u64,
            rows_deleted: deleted,
            row_count: cache.row_count(),
            duration: Duration::ZERO,
        })
    }

    /// Makes sure the slot holds an open handle whose header matches
    /// the remote descriptor. Schema drift is migrated in place; an id
    /// or geometry-kind mismatch surfaces as `DatasetMismatch`.
    fn ensure_cache(&self, inner: &mut SlotInner, descriptor: &RemoteDataset) -> Result<()> {
        match inner.cache.as_mut() {
            Some(cache) => {
                if cache.geometry_kind() != descriptor.geometry_kind {
                    return Err(CacheError::dataset_mismatch(format!(
                        "cached geometry kind {} does not match remote {}",
                        cache.geometry_kind(),
                        descriptor.geometry_kind
                    ))
                    .into());
                }
                if cache.migrate_schema(&descriptor.schema)? {
                    info!(dataset = %descriptor.id, "cache migrated to remote schema");
                }
                Ok(())
            }
            None => {
                let cache = self.store.open_dataset(
                    descriptor.id,
                    descriptor.geometry_kind,
                    &descriptor.schema,
                )?;
                inner.cache = Some(cache);
                Ok(())
            }
        }
    }

    /// Discards the cache file and stamp ahead of a rebuild. The stamp
    /// dies first; a crash in between leaves an orphan file, never a
    /// stamp pointing at missing data.
    fn wipe(&self, inner: &mut SlotInner, id: DatasetId) -> Result<()> {
        inner.cache = None;
        self.store.delete_stamp(id)?;
        self.store.delete_cache_file(id)?;
        Ok(())
    }

    /// Final state after a sync attempt, from the result and what is
    /// actually on disk.
    fn settle_state(&self, id: DatasetId, result: &Result<SyncOutcome>) -> SyncState {
        match result {
            Ok(_) => SyncState::UpToDate,
            Err(e) if e.is_cache_corruption() => SyncState::Corrupt,
            Err(_) => {
                // A surviving stamp means the previous completed sync
                // is still intact.
                match self.store.load_stamp(id) {
                    Ok(Some(_)) if self.store.has_cache(id) => SyncState::UpToDate,
                    _ => SyncState::NoCache,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CacheRegistry;
    use geosync_model::{DatasetRole, GeometryKind};
    use geosync_testkit::{feature_row, trail_schema, MemoryRemote};
    use tempfile::tempdir;

    const DS: DatasetId = DatasetId::new(1);

    fn fixture(rows: usize) -> (Arc<CacheStore>, Arc<MemoryRemote>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(CacheStore::open(dir.path()).unwrap());
        let remote = Arc::new(MemoryRemote::new());
        remote.add_dataset(DS, "trails", GeometryKind::Line, trail_schema(), DatasetRole::Owner);
        remote.seed_rows(DS, rows);
        (store, remote, dir)
    }

    fn engine_over(
        store: &Arc<CacheStore>,
        remote: &Arc<MemoryRemote>,
        config: EngineConfig,
    ) -> SyncEngine<MemoryRemote> {
        SyncEngine::new(Arc::clone(store), Arc::clone(remote), config)
    }

    #[test]
    fn first_sync_downloads_everything() {
        let (store, remote, _dir) = fixture(7);
        let engine = engine_over(&store, &remote, EngineConfig::new().with_full_sync_page_size(3));
        let registry = CacheRegistry::new();
        let slot = registry.slot(DS);

        let outcome = engine.sync_dataset(&slot, &CancelToken::new()).unwrap();
        assert_eq!(outcome.kind, SyncKind::Full);
        assert_eq!(outcome.rows_fetched, 7);
        assert_eq!(outcome.pages, 3);
        assert_eq!(outcome.row_count, 7);
        assert_eq!(slot.sync_state(), SyncState::UpToDate);
        assert!(store.has_stamp(DS));
        assert_eq!(slot.dataset().unwrap().name, "trails");
    }

    #[test]
    fn second_sync_is_incremental() {
        let (store, remote, _dir) = fixture(4);
        let engine = engine_over(&store, &remote, EngineConfig::new());
        let registry = CacheRegistry::new();
        let slot = registry.slot(DS);

        engine.sync_dataset(&slot, &CancelToken::new()).unwrap();
        let outcome = engine.sync_dataset(&slot, &CancelToken::new()).unwrap();
        assert_eq!(outcome.kind, SyncKind::Incremental);
        assert_eq!(outcome.rows_updated, 0);
        assert_eq!(outcome.rows_deleted, 0);
        assert_eq!(outcome.row_count, 4);
    }

    #[test]
    fn cancelled_full_sync_keeps_rows_but_no_stamp() {
        let (store, remote, _dir) = fixture(5);
        let engine = engine_over(&store, &remote, EngineConfig::new().with_full_sync_page_size(2));
        let registry = CacheRegistry::new();
        let slot = registry.slot(DS);

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = engine.sync_dataset(&slot, &cancel).unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert_eq!(slot.sync_state(), SyncState::NoCache);
        assert!(!store.has_stamp(DS));
    }

    #[test]
    fn corrupt_state_blocks_syncs() {
        let (store, remote, _dir) = fixture(2);
        let engine = engine_over(&store, &remote, EngineConfig::new());
        let registry = CacheRegistry::new();
        let slot = registry.slot(DS);
        slot.lock().state = SyncState::Corrupt;

        let err = engine.sync_dataset(&slot, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, EngineError::CacheCorrupt { dataset } if dataset == DS));
        assert_eq!(slot.sync_state(), SyncState::Corrupt);
    }

    #[test]
    fn transport_failure_leaves_previous_state() {
        let (store, remote, _dir) = fixture(3);
        let engine = engine_over(&store, &remote, EngineConfig::new());
        let registry = CacheRegistry::new();
        let slot = registry.slot(DS);

        engine.sync_dataset(&slot, &CancelToken::new()).unwrap();
        remote.fail_diff_call(0, geosync_remote::RemoteError::transport("socket reset"));

        let err = engine.sync_dataset(&slot, &CancelToken::new()).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(slot.sync_state(), SyncState::UpToDate);
        assert!(store.has_stamp(DS));

        // The injected failure was one-shot; the next sync succeeds.
        let outcome = engine.sync_dataset(&slot, &CancelToken::new()).unwrap();
        assert_eq!(outcome.kind, SyncKind::Incremental);
    }

    #[test]
    fn geometry_kind_change_forces_rebuild() {
        let (store, remote, _dir) = fixture(3);
        let first = engine_over(&store, &remote, EngineConfig::new());
        let registry = CacheRegistry::new();
        let slot = registry.slot(DS);
        first.sync_dataset(&slot, &CancelToken::new()).unwrap();

        // Same id, new geometry kind: the service recreated the layer.
        let remote2 = Arc::new(MemoryRemote::new());
        remote2.add_dataset(
            DS,
            "trails",
            GeometryKind::Point,
            trail_schema(),
            DatasetRole::Owner,
        );
        remote2.put_row(DS, feature_row(10, 10));
        let second = engine_over(&store, &remote2, EngineConfig::new());

        let outcome = second.sync_dataset(&slot, &CancelToken::new()).unwrap();
        assert_eq!(outcome.kind, SyncKind::Full);
        assert_eq!(outcome.row_count, 1);
        assert_eq!(slot.sync_state(), SyncState::UpToDate);
    }
}
