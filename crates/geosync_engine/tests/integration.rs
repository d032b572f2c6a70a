//! End-to-end tests over a scripted in-memory remote.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use geosync_cache::{CacheFile, CacheStore};
use geosync_engine::{
    CacheRegistry, CancelToken, EngineConfig, EngineError, MutationOp, ScanFilter, SyncEngine,
    SyncKind, SyncSession, SyncState,
};
use geosync_model::{
    DatasetId, DatasetRole, FeatureId, FeatureRow, FieldDef, FieldType, GeometryKind, NewFeature,
    PropertyValue, RemoteDataset, Schema, Timestamp,
};
use geosync_remote::{
    AttributeChange, DatasetDiff, GeometryChange, RemoteError, RemoteVectorClient,
};
use geosync_testkit::{feature_row, trail_schema, MemoryRemote};
use tempfile::tempdir;

const DS: DatasetId = DatasetId::new(42);

fn scripted_remote(rows: usize) -> Arc<MemoryRemote> {
    let remote = MemoryRemote::new();
    remote.add_dataset(
        DS,
        "trails",
        GeometryKind::Line,
        trail_schema(),
        DatasetRole::Owner,
    );
    remote.seed_rows(DS, rows);
    Arc::new(remote)
}

fn session_over(
    dir: &tempfile::TempDir,
    remote: &Arc<MemoryRemote>,
    config: EngineConfig,
) -> SyncSession<Arc<MemoryRemote>> {
    SyncSession::open(dir.path(), Arc::clone(remote), config).unwrap()
}

/// A remote that raises a cancellation token after serving a fixed
/// number of list pages, mimicking a user hitting cancel mid-download.
struct CancellingRemote {
    inner: Arc<MemoryRemote>,
    token: CancelToken,
    cancel_after: usize,
    served: AtomicUsize,
}

impl RemoteVectorClient for CancellingRemote {
    fn get_dataset(&self, dataset: DatasetId) -> geosync_remote::Result<RemoteDataset> {
        self.inner.get_dataset(dataset)
    }

    fn list_features(
        &self,
        dataset: DatasetId,
        after: Option<FeatureId>,
        limit: usize,
    ) -> geosync_remote::Result<Vec<FeatureRow>> {
        let page = self.inner.list_features(dataset, after, limit)?;
        if self.served.fetch_add(1, Ordering::SeqCst) + 1 == self.cancel_after {
            self.token.cancel();
        }
        Ok(page)
    }

    fn get_features(
        &self,
        dataset: DatasetId,
        ids: &[FeatureId],
    ) -> geosync_remote::Result<Vec<FeatureRow>> {
        self.inner.get_features(dataset, ids)
    }

    fn get_diff(&self, dataset: DatasetId, since: Timestamp) -> geosync_remote::Result<DatasetDiff> {
        self.inner.get_diff(dataset, since)
    }

    fn add_features(
        &self,
        dataset: DatasetId,
        rows: &[NewFeature],
    ) -> geosync_remote::Result<Vec<FeatureId>> {
        self.inner.add_features(dataset, rows)
    }

    fn delete_features(&self, dataset: DatasetId, ids: &[FeatureId]) -> geosync_remote::Result<()> {
        self.inner.delete_features(dataset, ids)
    }

    fn update_attributes(
        &self,
        dataset: DatasetId,
        changes: &[AttributeChange],
    ) -> geosync_remote::Result<()> {
        self.inner.update_attributes(dataset, changes)
    }

    fn update_geometries(
        &self,
        dataset: DatasetId,
        changes: &[GeometryChange],
    ) -> geosync_remote::Result<()> {
        self.inner.update_geometries(dataset, changes)
    }
}

#[test]
fn full_sync_pages_exactly_as_needed() {
    let dir = tempdir().unwrap();
    let remote = scripted_remote(12345);
    let session = session_over(&dir, &remote, EngineConfig::new());

    let outcome = session.open_dataset(DS).unwrap();
    assert_eq!(outcome.kind, SyncKind::Full);
    assert_eq!(outcome.pages, 3);
    assert_eq!(outcome.rows_fetched, 12345);
    assert_eq!(outcome.row_count, 12345);

    // 5000 + 5000 + 2345; the short page ends the scan without an
    // extra probe.
    assert_eq!(remote.counts().list_pages, 3);
    assert_eq!(session.sync_state(DS), SyncState::UpToDate);
}

#[test]
fn resync_of_unchanged_dataset_rewrites_nothing() {
    let dir = tempdir().unwrap();
    let remote = scripted_remote(200);
    let session = session_over(&dir, &remote, EngineConfig::new());

    session.open_dataset(DS).unwrap();
    let before = fs::read(session.store().cache_path(DS)).unwrap();

    let outcome = session.open_dataset(DS).unwrap();
    assert_eq!(outcome.kind, SyncKind::Incremental);
    assert_eq!(outcome.rows_updated, 0);
    assert_eq!(outcome.rows_deleted, 0);
    assert_eq!(outcome.row_count, 200);

    let after = fs::read(session.store().cache_path(DS)).unwrap();
    assert_eq!(before, after);
}

#[test]
fn diff_applies_updates_and_deletes() {
    let dir = tempdir().unwrap();
    let remote = scripted_remote(100);
    let session = session_over(&dir, &remote, EngineConfig::new());
    session.open_dataset(DS).unwrap();

    // The server moves on: five rows edited, two deleted.
    let updated: Vec<FeatureRow> = [10u64, 20, 30, 40, 50]
        .iter()
        .map(|&id| feature_row(id, id + 1000))
        .collect();
    for row in &updated {
        remote.put_row(DS, row.clone());
    }
    let deleted = vec![FeatureId::new(60), FeatureId::new(70)];
    for id in &deleted {
        remote.remove_row(DS, *id);
    }
    remote.set_diff(
        DS,
        DatasetDiff {
            updated_rows: updated.clone(),
            deleted_ids: deleted.clone(),
        },
    );

    let outcome = session.open_dataset(DS).unwrap();
    assert_eq!(outcome.kind, SyncKind::Incremental);
    assert_eq!(outcome.rows_updated, 5);
    assert_eq!(outcome.rows_deleted, 2);
    assert_eq!(outcome.row_count, 98);

    // The edited row reads back exactly as the server now holds it;
    // the deleted one is gone even when asked for by id.
    let mut scan = session
        .iterate(DS, ScanFilter::ids([FeatureId::new(10), FeatureId::new(60)]))
        .unwrap();
    let got: Vec<FeatureRow> = scan.by_ref().collect();
    assert_eq!(got, vec![feature_row(10, 1010)]);
    assert!(scan.take_error().is_none());
}

#[test]
fn diff_overflow_falls_back_to_full_rebuild() {
    let dir = tempdir().unwrap();
    let remote = scripted_remote(40);
    let session = session_over(&dir, &remote, EngineConfig::new());
    session.open_dataset(DS).unwrap();

    remote.seed_rows(DS, 10);
    remote.remove_row(DS, FeatureId::new(1));
    remote.set_diff_overflow(DS);
    let before = remote.counts();

    let outcome = session.open_dataset(DS).unwrap();
    assert_eq!(outcome.kind, SyncKind::Full);
    assert_eq!(outcome.row_count, 49);

    // One diff attempt, then page downloads again.
    let after = remote.counts();
    assert_eq!(after.diffs, before.diffs + 1);
    assert!(after.list_pages > before.list_pages);
    assert!(session.store().has_stamp(DS));

    // Row 1 vanished although no diff ever said to delete it; only a
    // rebuild explains that.
    let mut scan = session
        .iterate(DS, ScanFilter::ids([FeatureId::new(1)]))
        .unwrap();
    assert!(scan.next().is_none());
    assert!(scan.take_error().is_none());
}

#[test]
fn cancelled_sync_keeps_whole_pages_and_no_stamp() {
    let dir = tempdir().unwrap();
    let store = Arc::new(CacheStore::open(dir.path()).unwrap());
    let remote = scripted_remote(30);
    let token = CancelToken::new();
    let cancelling = Arc::new(CancellingRemote {
        inner: Arc::clone(&remote),
        token: token.clone(),
        cancel_after: 2,
        served: AtomicUsize::new(0),
    });
    let engine = SyncEngine::new(
        Arc::clone(&store),
        cancelling,
        EngineConfig::new().with_full_sync_page_size(12),
    );
    let registry = CacheRegistry::new();
    let slot = registry.slot(DS);

    let err = engine.sync_dataset(&slot, &token).unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(slot.sync_state(), SyncState::NoCache);
    assert!(!store.has_stamp(DS));

    // The two pages that completed before the cancel are intact on
    // disk; the third was never fetched.
    let mut cache = CacheFile::open(&store.cache_path(DS)).unwrap();
    assert_eq!(cache.row_count(), 24);
    assert!(cache.get(FeatureId::new(25)).unwrap().is_none());
    drop(cache);

    // A later sync starts over and ends exactly like an uninterrupted
    // one.
    let outcome = engine.sync_dataset(&slot, &CancelToken::new()).unwrap();
    assert_eq!(outcome.kind, SyncKind::Full);
    assert_eq!(outcome.row_count, 30);
    assert_eq!(slot.sync_state(), SyncState::UpToDate);
    assert!(store.has_stamp(DS));
}

#[test]
fn restricted_scan_skips_deleted_ids_and_ends_clean() {
    let dir = tempdir().unwrap();
    let remote = scripted_remote(5);
    remote.remove_row(DS, FeatureId::new(3));
    let session = session_over(&dir, &remote, EngineConfig::new());
    session.open_dataset(DS).unwrap();

    let mut scan = session
        .iterate(DS, ScanFilter::ids((1..=5).map(FeatureId::new)))
        .unwrap();
    let got: Vec<u64> = scan.by_ref().map(|row| row.id.as_u64()).collect();
    assert_eq!(got, vec![1, 2, 4, 5]);
    assert!(scan.take_error().is_none());

    // The one cache miss went out as a single targeted lookup.
    assert_eq!(remote.counts().targeted_fetches, 1);
}

#[test]
fn partial_delete_applies_leading_chunks_only() {
    let dir = tempdir().unwrap();
    let remote = scripted_remote(2500);
    let session = session_over(&dir, &remote, EngineConfig::new());
    session.open_dataset(DS).unwrap();

    remote.fail_delete_call(1, RemoteError::transport("bulkhead tripped"));
    // The re-sync that follows the failed dispatch will see the first
    // chunk's deletions.
    remote.set_diff(
        DS,
        DatasetDiff {
            updated_rows: Vec::new(),
            deleted_ids: (1..=1000).map(FeatureId::new).collect(),
        },
    );

    let doomed: Vec<FeatureId> = (1..=2500).map(FeatureId::new).collect();
    let err = session.mutate(DS, MutationOp::Delete(doomed)).unwrap_err();
    match err {
        EngineError::PartialMutation {
            submitted, applied, ..
        } => {
            assert_eq!(submitted, 2500);
            assert_eq!(applied, 1000);
        }
        other => panic!("expected PartialMutation, got {other:?}"),
    }

    // Chunk three was never attempted.
    assert_eq!(remote.counts().deletes, 2);
    assert_eq!(remote.row_count(DS), 1500);

    // The forced re-sync already reflects the applied chunk.
    let first = session
        .iterate(DS, ScanFilter::all().with_limit(1))
        .unwrap()
        .next()
        .unwrap();
    assert_eq!(first.id, FeatureId::new(1001));
    let cached = session.iterate(DS, ScanFilter::all()).unwrap().count();
    assert_eq!(cached, 1500);
}

#[test]
fn stamp_without_cache_file_is_discarded_on_open() {
    let dir = tempdir().unwrap();
    let remote = scripted_remote(8);
    let session = session_over(&dir, &remote, EngineConfig::new());
    session.open_dataset(DS).unwrap();

    // Lose the cache file behind the session's back.
    fs::remove_file(session.store().cache_path(DS)).unwrap();

    let outcome = session.open_dataset(DS).unwrap();
    assert_eq!(outcome.kind, SyncKind::Full);
    assert_eq!(outcome.row_count, 8);
    // The stale stamp never produced a diff request.
    assert_eq!(remote.counts().diffs, 0);
}

#[test]
fn schema_growth_migrates_the_cache() {
    let dir = tempdir().unwrap();
    let remote = scripted_remote(3);
    let session = session_over(&dir, &remote, EngineConfig::new());
    session.open_dataset(DS).unwrap();

    let wider = Schema::new(vec![
        FieldDef::new("name", FieldType::Text),
        FieldDef::new("length_km", FieldType::Float),
        FieldDef::new("open", FieldType::Boolean),
        FieldDef::new("surface", FieldType::Text),
    ])
    .unwrap();
    remote.set_schema(DS, wider.clone());

    let outcome = session.open_dataset(DS).unwrap();
    assert_eq!(outcome.kind, SyncKind::Incremental);
    assert_eq!(session.dataset(DS).unwrap().schema, wider);

    let row = session
        .iterate(DS, ScanFilter::ids([FeatureId::new(2)]))
        .unwrap()
        .next()
        .unwrap();
    assert_eq!(row.properties.get("surface"), Some(&PropertyValue::Null));
    assert_eq!(
        row.properties.get("name"),
        Some(&PropertyValue::Text("trail-2".into()))
    );
}
