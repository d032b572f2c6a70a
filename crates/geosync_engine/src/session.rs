//! The host-facing session facade.
//!
//! A session binds one on-disk cache store to one remote client and
//! hands the host everything it needs: open-and-sync, lazy iteration,
//! mutation and cache clearing. All per-dataset bookkeeping lives in
//! the session's registry; closing the session releases the store
//! lock and every open cache handle.

use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use geosync_cache::CacheStore;
use geosync_model::{DatasetId, RemoteDataset};
use geosync_remote::RemoteVectorClient;

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::iterator::{LazyFeatureIterator, ScanFilter};
use crate::mutation::{MutationGateway, MutationOp, MutationOutcome};
use crate::registry::CacheRegistry;
use crate::sync::{SyncEngine, SyncOutcome, SyncState};
use crate::task::SyncTask;

/// One host session over a cache store and a remote service.
#[derive(Debug)]
pub struct SyncSession<R> {
    store: Arc<CacheStore>,
    remote: Arc<R>,
    config: EngineConfig,
    registry: CacheRegistry,
    engine: Arc<SyncEngine<R>>,
    gateway: MutationGateway<R>,
}

impl<R: RemoteVectorClient> SyncSession<R> {
    /// Opens the store at `root` and wires it to `remote`.
    ///
    /// Fails with [`CacheError::StoreLocked`] when another process
    /// holds the store.
    ///
    /// [`CacheError::StoreLocked`]: geosync_cache::CacheError::StoreLocked
    pub fn open(root: &Path, remote: R, config: EngineConfig) -> Result<Self> {
        let store = Arc::new(CacheStore::open(root)?);
        let remote = Arc::new(remote);
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            config,
        ));
        let gateway = MutationGateway::new(Arc::clone(&engine), Arc::clone(&remote), config);
        Ok(SyncSession {
            store,
            remote,
            config,
            registry: CacheRegistry::new(),
            engine,
            gateway,
        })
    }

    /// The underlying store.
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// The session's batch size configuration.
    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Opens `id` and brings its cache up to date, blocking until the
    /// sync finishes. Calling it again re-syncs.
    pub fn open_dataset(&self, id: DatasetId) -> Result<SyncOutcome> {
        let slot = self.registry.slot(id);
        self.engine.sync_dataset(&slot, &CancelToken::new())
    }

    /// Like [`open_dataset`], but on a worker thread. The returned
    /// task carries the cancellation token.
    ///
    /// [`open_dataset`]: SyncSession::open_dataset
    pub fn open_dataset_in_background(&self, id: DatasetId) -> Result<SyncTask>
    where
        R: 'static,
    {
        let slot = self.registry.slot(id);
        let engine = Arc::clone(&self.engine);
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let (tx, rx) = mpsc::sync_channel(1);
        let handle = thread::Builder::new()
            .name(format!("sync-ds-{}", id.as_u64()))
            .spawn(move || {
                let result = engine.sync_dataset(&slot, &token);
                let _ = tx.send(result);
            })
            .map_err(|e| EngineError::worker(format!("could not spawn sync worker: {e}")))?;
        Ok(SyncTask::new(handle, rx, cancel))
    }

    /// This session's sync state for `id`. Datasets never opened in
    /// this session report [`SyncState::NoCache`] regardless of what
    /// is on disk.
    pub fn sync_state(&self, id: DatasetId) -> SyncState {
        self.registry
            .get(id)
            .map_or(SyncState::NoCache, |slot| slot.sync_state())
    }

    /// The descriptor fetched by the most recent sync of `id`.
    pub fn dataset(&self, id: DatasetId) -> Option<RemoteDataset> {
        self.registry.get(id).and_then(|slot| slot.dataset())
    }

    /// Dataset ids with cached artifacts on disk, opened or not.
    pub fn cached_datasets(&self) -> Result<Vec<DatasetId>> {
        Ok(self.store.list_datasets()?)
    }

    /// Iterates rows of an open dataset, filling from the remote where
    /// the cache runs out.
    pub fn iterate(&self, id: DatasetId, filter: ScanFilter) -> Result<LazyFeatureIterator<R>> {
        let slot = self
            .registry
            .get(id)
            .ok_or(EngineError::DatasetNotOpen { dataset: id })?;
        if slot.sync_state() == SyncState::Corrupt {
            return Err(EngineError::CacheCorrupt { dataset: id });
        }
        Ok(LazyFeatureIterator::new(
            slot,
            Arc::clone(&self.remote),
            self.config.scan_page_size,
            filter,
        ))
    }

    /// Applies a write to an open dataset and re-syncs it.
    pub fn mutate(&self, id: DatasetId, op: MutationOp) -> Result<MutationOutcome> {
        let slot = self
            .registry
            .get(id)
            .ok_or(EngineError::DatasetNotOpen { dataset: id })?;
        if slot.sync_state() == SyncState::Corrupt {
            return Err(EngineError::CacheCorrupt { dataset: id });
        }
        self.gateway.apply(&slot, op)
    }

    /// Closes `id`, dropping its cache handle. On-disk artifacts stay
    /// for the next session.
    pub fn close_dataset(&self, id: DatasetId) {
        if let Some(slot) = self.registry.remove(id) {
            let mut inner = slot.lock();
            inner.cache = None;
            inner.state = SyncState::NoCache;
        }
    }

    /// Discards every cached artifact of `id`, best effort. Returns
    /// `true` when nothing is left behind.
    ///
    /// This is also the only way out of [`SyncState::Corrupt`]: after
    /// a successful clear the next open rebuilds from scratch.
    pub fn clear(&self, id: DatasetId) -> bool {
        self.close_dataset(id);
        self.store.clear(id)
    }

    /// Clears every dataset the store knows about. Returns `true` when
    /// all of them came off clean.
    pub fn clear_all(&self) -> bool {
        for id in self.registry.open_ids() {
            self.close_dataset(id);
        }
        self.store.clear_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncKind;
    use geosync_model::{DatasetRole, FeatureId, GeometryKind};
    use geosync_testkit::{trail_schema, MemoryRemote};
    use tempfile::tempdir;

    const DS: DatasetId = DatasetId::new(1);

    fn session_with(rows: usize) -> (SyncSession<MemoryRemote>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let remote = MemoryRemote::new();
        remote.add_dataset(
            DS,
            "trails",
            GeometryKind::Line,
            trail_schema(),
            DatasetRole::Owner,
        );
        remote.seed_rows(DS, rows);
        let session = SyncSession::open(dir.path(), remote, EngineConfig::new()).unwrap();
        (session, dir)
    }

    #[test]
    fn open_then_iterate_serves_all_rows() {
        let (session, _dir) = session_with(6);
        let outcome = session.open_dataset(DS).unwrap();
        assert_eq!(outcome.kind, SyncKind::Full);
        assert_eq!(session.sync_state(DS), SyncState::UpToDate);

        let ids: Vec<u64> = session
            .iterate(DS, ScanFilter::all())
            .unwrap()
            .map(|row| row.id.as_u64())
            .collect();
        assert_eq!(ids, (1..=6).collect::<Vec<_>>());
    }

    #[test]
    fn iterate_without_open_is_an_error() {
        let (session, _dir) = session_with(2);
        assert!(matches!(
            session.iterate(DS, ScanFilter::all()),
            Err(EngineError::DatasetNotOpen { dataset }) if dataset == DS
        ));
    }

    #[test]
    fn background_open_reports_completion() {
        let (session, _dir) = session_with(4);
        let task = session.open_dataset_in_background(DS).unwrap();
        let outcome = task.wait().unwrap();
        assert_eq!(outcome.kind, SyncKind::Full);
        assert_eq!(outcome.row_count, 4);
        assert_eq!(session.sync_state(DS), SyncState::UpToDate);
    }

    #[test]
    fn clear_is_the_exit_from_corrupt() {
        let (session, _dir) = session_with(3);
        session.open_dataset(DS).unwrap();

        // Force the latch the way a failed validation would.
        session.registry.slot(DS).lock().state = SyncState::Corrupt;
        assert!(matches!(
            session.iterate(DS, ScanFilter::all()),
            Err(EngineError::CacheCorrupt { .. })
        ));
        assert!(matches!(
            session.mutate(DS, MutationOp::Delete(vec![FeatureId::new(1)])),
            Err(EngineError::CacheCorrupt { .. })
        ));
        assert!(matches!(
            session.open_dataset(DS),
            Err(EngineError::CacheCorrupt { .. })
        ));

        assert!(session.clear(DS));
        assert!(!session.store().has_cache(DS));
        let outcome = session.open_dataset(DS).unwrap();
        assert_eq!(outcome.kind, SyncKind::Full);
        assert_eq!(outcome.row_count, 3);
    }

    #[test]
    fn close_keeps_disk_state() {
        let (session, _dir) = session_with(5);
        session.open_dataset(DS).unwrap();
        session.close_dataset(DS);

        assert_eq!(session.sync_state(DS), SyncState::NoCache);
        assert!(session.store().has_cache(DS));
        assert!(session.store().has_stamp(DS));

        // Reopening finds the stamp and goes incremental.
        let outcome = session.open_dataset(DS).unwrap();
        assert_eq!(outcome.kind, SyncKind::Incremental);
        assert_eq!(outcome.row_count, 5);
    }

    #[test]
    fn second_session_on_same_root_is_locked_out() {
        let (session, dir) = session_with(1);
        let err = SyncSession::open(dir.path(), MemoryRemote::new(), EngineConfig::new())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Cache(geosync_cache::CacheError::StoreLocked)
        ));
        drop(session);
        assert!(SyncSession::open(dir.path(), MemoryRemote::new(), EngineConfig::new()).is_ok());
    }
}
