//! A scriptable in-memory remote vector service.
//!
//! [`MemoryRemote`] behaves like the real service: datasets hold rows in
//! feature-id order, `list_features` pages by cursor, mutations check
//! the caller's role and actually mutate. On top of that it counts every
//! call and lets tests script diffs and inject one-shot failures, so
//! sync behaviour can be asserted by call pattern.

use std::collections::{BTreeMap, HashMap};

use geosync_model::{
    DatasetId, DatasetRole, Extent, FeatureId, FeatureRow, GeometryKind, NewFeature,
    RemoteDataset, Schema, Timestamp,
};
use geosync_remote::{
    AttributeChange, DatasetDiff, GeometryChange, RemoteError, RemoteVectorClient, Result,
};
use parking_lot::Mutex;

use crate::data::feature_row;

/// How many times each client method has been called.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    /// `get_dataset` calls.
    pub get_dataset: usize,
    /// `list_features` page fetches.
    pub list_pages: usize,
    /// `get_features` targeted fetches.
    pub targeted_fetches: usize,
    /// `get_diff` calls.
    pub diffs: usize,
    /// `add_features` batches.
    pub adds: usize,
    /// `delete_features` batches.
    pub deletes: usize,
    /// `update_attributes` batches.
    pub attribute_updates: usize,
    /// `update_geometries` batches.
    pub geometry_updates: usize,
}

/// A failure armed for one specific call, consumed when it fires.
#[derive(Debug, Clone)]
struct OneShotFailure {
    on_call: usize,
    error: RemoteError,
}

#[derive(Debug, Clone)]
enum DiffScript {
    Ready(DatasetDiff),
    Overflow,
}

#[derive(Debug)]
struct ScriptedDataset {
    name: String,
    kind: GeometryKind,
    schema: Schema,
    role: DatasetRole,
    extent: Option<Extent>,
    rows: BTreeMap<FeatureId, FeatureRow>,
    next_id: u64,
    diff: DiffScript,
}

impl ScriptedDataset {
    fn descriptor(&self, id: DatasetId) -> RemoteDataset {
        RemoteDataset {
            id,
            name: self.name.clone(),
            geometry_kind: self.kind,
            schema: self.schema.clone(),
            feature_count: self.rows.len() as u64,
            extent: self.extent,
            role: self.role,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    datasets: HashMap<DatasetId, ScriptedDataset>,
    counts: CallCounts,
    fail_list: Option<OneShotFailure>,
    fail_diff: Option<OneShotFailure>,
    fail_add: Option<OneShotFailure>,
    fail_delete: Option<OneShotFailure>,
    fail_attributes: Option<OneShotFailure>,
    fail_geometries: Option<OneShotFailure>,
}

/// In-memory [`RemoteVectorClient`] for tests.
///
/// Share it with the code under test through an `Arc`; every method
/// takes `&self`, and a test keeps its own clone for scripting and
/// inspection.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    inner: Mutex<Inner>,
}

impl MemoryRemote {
    /// Creates an empty service with no datasets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an empty dataset.
    pub fn add_dataset(
        &self,
        id: DatasetId,
        name: impl Into<String>,
        kind: GeometryKind,
        schema: Schema,
        role: DatasetRole,
    ) {
        let mut inner = self.inner.lock();
        inner.datasets.insert(
            id,
            ScriptedDataset {
                name: name.into(),
                kind,
                schema,
                role,
                extent: None,
                rows: BTreeMap::new(),
                next_id: 1,
                diff: DiffScript::Ready(DatasetDiff::default()),
            },
        );
    }

    /// Seeds `count` deterministic rows, returning their ids.
    pub fn seed_rows(&self, dataset: DatasetId, count: usize) -> Vec<FeatureId> {
        let mut inner = self.inner.lock();
        let ds = inner.dataset_mut(dataset);
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let raw = ds.next_id;
            ds.next_id += 1;
            let row = feature_row(raw, raw);
            ids.push(row.id);
            ds.rows.insert(row.id, row);
        }
        ids
    }

    /// Inserts or replaces one row at an explicit id.
    pub fn put_row(&self, dataset: DatasetId, row: FeatureRow) {
        let mut inner = self.inner.lock();
        let ds = inner.dataset_mut(dataset);
        ds.next_id = ds.next_id.max(row.id.as_u64() + 1);
        ds.rows.insert(row.id, row);
    }

    /// Removes one row server-side, as if another client deleted it.
    pub fn remove_row(&self, dataset: DatasetId, id: FeatureId) -> bool {
        self.inner.lock().dataset_mut(dataset).rows.remove(&id).is_some()
    }

    /// Changes the caller's role on a dataset.
    pub fn set_role(&self, dataset: DatasetId, role: DatasetRole) {
        self.inner.lock().dataset_mut(dataset).role = role;
    }

    /// Changes the dataset's schema server-side.
    pub fn set_schema(&self, dataset: DatasetId, schema: Schema) {
        self.inner.lock().dataset_mut(dataset).schema = schema;
    }

    /// Sets the advertised extent.
    pub fn set_extent(&self, dataset: DatasetId, extent: Option<Extent>) {
        self.inner.lock().dataset_mut(dataset).extent = extent;
    }

    /// Scripts the next `get_diff` answer; later calls see an empty diff.
    pub fn set_diff(&self, dataset: DatasetId, diff: DatasetDiff) {
        self.inner.lock().dataset_mut(dataset).diff = DiffScript::Ready(diff);
    }

    /// Scripts the next `get_diff` to report overflow; later calls see
    /// an empty diff.
    pub fn set_diff_overflow(&self, dataset: DatasetId) {
        self.inner.lock().dataset_mut(dataset).diff = DiffScript::Overflow;
    }

    /// Arms a one-shot failure for the `nth` `list_features` call
    /// (0-based, counted across all datasets).
    pub fn fail_list_call(&self, nth: usize, error: RemoteError) {
        self.inner.lock().fail_list = Some(OneShotFailure { on_call: nth, error });
    }

    /// Arms a one-shot failure for the `nth` `get_diff` call.
    pub fn fail_diff_call(&self, nth: usize, error: RemoteError) {
        self.inner.lock().fail_diff = Some(OneShotFailure { on_call: nth, error });
    }

    /// Arms a one-shot failure for the `nth` `add_features` batch.
    pub fn fail_add_call(&self, nth: usize, error: RemoteError) {
        self.inner.lock().fail_add = Some(OneShotFailure { on_call: nth, error });
    }

    /// Arms a one-shot failure for the `nth` `delete_features` batch.
    pub fn fail_delete_call(&self, nth: usize, error: RemoteError) {
        self.inner.lock().fail_delete = Some(OneShotFailure { on_call: nth, error });
    }

    /// Arms a one-shot failure for the `nth` `update_attributes` batch.
    pub fn fail_attribute_call(&self, nth: usize, error: RemoteError) {
        self.inner.lock().fail_attributes = Some(OneShotFailure { on_call: nth, error });
    }

    /// Arms a one-shot failure for the `nth` `update_geometries` batch.
    pub fn fail_geometry_call(&self, nth: usize, error: RemoteError) {
        self.inner.lock().fail_geometries = Some(OneShotFailure { on_call: nth, error });
    }

    /// Snapshot of the call counters.
    #[must_use]
    pub fn counts(&self) -> CallCounts {
        self.inner.lock().counts
    }

    /// Zeroes the call counters.
    pub fn reset_counts(&self) {
        self.inner.lock().counts = CallCounts::default();
    }

    /// Current number of rows in a dataset.
    #[must_use]
    pub fn row_count(&self, dataset: DatasetId) -> usize {
        self.inner.lock().dataset_mut(dataset).rows.len()
    }

    /// Current server-side copy of one row.
    #[must_use]
    pub fn row(&self, dataset: DatasetId, id: FeatureId) -> Option<FeatureRow> {
        self.inner.lock().dataset_mut(dataset).rows.get(&id).cloned()
    }
}

impl Inner {
    fn dataset_mut(&mut self, id: DatasetId) -> &mut ScriptedDataset {
        self.datasets.get_mut(&id).expect("dataset registered with MemoryRemote")
    }

    fn dataset(&self, id: DatasetId) -> Result<&ScriptedDataset> {
        self.datasets
            .get(&id)
            .ok_or(RemoteError::DatasetNotFound { dataset: id })
    }

    fn editable(&mut self, id: DatasetId) -> Result<&mut ScriptedDataset> {
        let ds = self
            .datasets
            .get_mut(&id)
            .ok_or(RemoteError::DatasetNotFound { dataset: id })?;
        if !ds.role.can_edit() {
            return Err(RemoteError::permission_denied(format!(
                "role {} cannot edit {id}",
                ds.role
            )));
        }
        Ok(ds)
    }
}

/// Takes the armed failure if this call index is the scripted one.
fn take_failure(slot: &mut Option<OneShotFailure>, call_index: usize) -> Result<()> {
    if slot.as_ref().is_some_and(|f| f.on_call == call_index) {
        let fired = slot.take().expect("checked above");
        return Err(fired.error);
    }
    Ok(())
}

impl RemoteVectorClient for MemoryRemote {
    fn get_dataset(&self, dataset: DatasetId) -> Result<RemoteDataset> {
        let mut inner = self.inner.lock();
        inner.counts.get_dataset += 1;
        inner.dataset(dataset).map(|ds| ds.descriptor(dataset))
    }

    fn list_features(
        &self,
        dataset: DatasetId,
        after: Option<FeatureId>,
        limit: usize,
    ) -> Result<Vec<FeatureRow>> {
        let mut inner = self.inner.lock();
        let call_index = inner.counts.list_pages;
        inner.counts.list_pages += 1;
        take_failure(&mut inner.fail_list, call_index)?;

        let ds = inner.dataset(dataset)?;
        let lower = match after {
            Some(id) => std::ops::Bound::Excluded(id),
            None => std::ops::Bound::Unbounded,
        };
        Ok(ds
            .rows
            .range((lower, std::ops::Bound::Unbounded))
            .take(limit)
            .map(|(_, row)| row.clone())
            .collect())
    }

    fn get_features(&self, dataset: DatasetId, ids: &[FeatureId]) -> Result<Vec<FeatureRow>> {
        let mut inner = self.inner.lock();
        inner.counts.targeted_fetches += 1;
        let ds = inner.dataset(dataset)?;
        Ok(ids.iter().filter_map(|id| ds.rows.get(id).cloned()).collect())
    }

    fn get_diff(&self, dataset: DatasetId, _since: Timestamp) -> Result<DatasetDiff> {
        let mut inner = self.inner.lock();
        let call_index = inner.counts.diffs;
        inner.counts.diffs += 1;
        take_failure(&mut inner.fail_diff, call_index)?;

        inner.dataset(dataset)?;
        let ds = inner.dataset_mut(dataset);
        let script = std::mem::replace(&mut ds.diff, DiffScript::Ready(DatasetDiff::default()));
        match script {
            DiffScript::Ready(diff) => Ok(diff),
            DiffScript::Overflow => Err(RemoteError::DiffOverflow),
        }
    }

    fn add_features(&self, dataset: DatasetId, rows: &[NewFeature]) -> Result<Vec<FeatureId>> {
        let mut inner = self.inner.lock();
        let call_index = inner.counts.adds;
        inner.counts.adds += 1;
        take_failure(&mut inner.fail_add, call_index)?;

        let ds = inner.editable(dataset)?;
        let mut ids = Vec::with_capacity(rows.len());
        for candidate in rows {
            let id = FeatureId::new(ds.next_id);
            ds.next_id += 1;
            ds.rows.insert(id, candidate.clone().into_row(id));
            ids.push(id);
        }
        Ok(ids)
    }

    fn delete_features(&self, dataset: DatasetId, ids: &[FeatureId]) -> Result<()> {
        let mut inner = self.inner.lock();
        let call_index = inner.counts.deletes;
        inner.counts.deletes += 1;
        take_failure(&mut inner.fail_delete, call_index)?;

        let ds = inner.editable(dataset)?;
        for id in ids {
            ds.rows.remove(id);
        }
        Ok(())
    }

    fn update_attributes(&self, dataset: DatasetId, changes: &[AttributeChange]) -> Result<()> {
        let mut inner = self.inner.lock();
        let call_index = inner.counts.attribute_updates;
        inner.counts.attribute_updates += 1;
        take_failure(&mut inner.fail_attributes, call_index)?;

        let ds = inner.editable(dataset)?;
        for change in changes {
            // A row deleted since the caller read it is skipped, same as
            // the real service.
            if let Some(row) = ds.rows.get_mut(&change.id) {
                for (name, value) in change.properties.iter() {
                    row.properties.insert(name, value.clone());
                }
            }
        }
        Ok(())
    }

    fn update_geometries(&self, dataset: DatasetId, changes: &[GeometryChange]) -> Result<()> {
        let mut inner = self.inner.lock();
        let call_index = inner.counts.geometry_updates;
        inner.counts.geometry_updates += 1;
        take_failure(&mut inner.fail_geometries, call_index)?;

        let ds = inner.editable(dataset)?;
        for change in changes {
            if let Some(row) = ds.rows.get_mut(&change.id) {
                row.geometry = change.geometry.clone();
            }
        }
        Ok(())
    }
}
