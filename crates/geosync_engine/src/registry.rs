//! Per-dataset slots and the registry that owns them.
//!
//! The registry replaces any notion of process-global dataset maps:
//! every open dataset lives in exactly one [`CacheRegistry`], owned by
//! the session that created it, and vanishes with it.

use std::collections::HashMap;
use std::sync::Arc;

use geosync_cache::CacheFile;
use geosync_model::{DatasetId, RemoteDataset};
use parking_lot::{Mutex, MutexGuard};

use crate::sync::SyncState;

/// One dataset's in-session state: the open cache handle, the latest
/// remote descriptor and the current sync state.
///
/// The slot's mutex is the per-dataset serialization point. Syncs,
/// iterator fills and mutation re-syncs all take it, so at most one
/// logical operation touches a dataset's cache at a time. Concurrent
/// operations on different datasets never contend.
#[derive(Debug)]
pub struct DatasetSlot {
    id: DatasetId,
    inner: Mutex<SlotInner>,
}

#[derive(Debug)]
pub(crate) struct SlotInner {
    pub(crate) state: SyncState,
    pub(crate) cache: Option<CacheFile>,
    pub(crate) dataset: Option<RemoteDataset>,
}

impl DatasetSlot {
    fn new(id: DatasetId) -> Self {
        DatasetSlot {
            id,
            inner: Mutex::new(SlotInner {
                state: SyncState::NoCache,
                cache: None,
                dataset: None,
            }),
        }
    }

    /// Returns the dataset id this slot serves.
    pub fn id(&self) -> DatasetId {
        self.id
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock()
    }

    /// Returns the current sync state.
    pub fn sync_state(&self) -> SyncState {
        self.inner.lock().state
    }

    /// Returns the most recent remote descriptor, if a sync has
    /// fetched one.
    pub fn dataset(&self) -> Option<RemoteDataset> {
        self.inner.lock().dataset.clone()
    }

    /// Returns the number of live rows in the cache, or `None` when no
    /// cache handle is open.
    pub fn row_count(&self) -> Option<usize> {
        self.inner.lock().cache.as_ref().map(|c| c.row_count())
    }
}

/// Owner of all [`DatasetSlot`]s for one session.
#[derive(Debug, Default)]
pub struct CacheRegistry {
    // Held only for map lookups, never while a slot's own mutex is
    // taken, so slot operations on different datasets cannot block
    // each other through the registry.
    slots: Mutex<HashMap<DatasetId, Arc<DatasetSlot>>>,
}

impl CacheRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for `id`, creating it in the `NoCache` state
    /// if this is the first time the dataset is mentioned.
    pub fn slot(&self, id: DatasetId) -> Arc<DatasetSlot> {
        let mut slots = self.slots.lock();
        Arc::clone(
            slots
                .entry(id)
                .or_insert_with(|| Arc::new(DatasetSlot::new(id))),
        )
    }

    /// Returns the slot for `id` if the dataset has been opened.
    pub fn get(&self, id: DatasetId) -> Option<Arc<DatasetSlot>> {
        self.slots.lock().get(&id).map(Arc::clone)
    }

    /// Drops the slot for `id`. Iterators holding the slot keep it
    /// alive until they finish; new operations will see a fresh slot.
    pub fn remove(&self, id: DatasetId) -> Option<Arc<DatasetSlot>> {
        self.slots.lock().remove(&id)
    }

    /// Ids with a registered slot, in ascending order.
    pub fn open_ids(&self) -> Vec<DatasetId> {
        let mut ids: Vec<DatasetId> = self.slots.lock().keys().copied().collect();
        ids.sort_unstable_by_key(|id| id.as_u64());
        ids
    }

    /// Returns `true` when no dataset is registered.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}
