//! The remote vector service client trait.

use std::sync::Arc;

use geosync_model::{DatasetId, FeatureId, FeatureRow, NewFeature, RemoteDataset, Timestamp};

use crate::error::Result;
use crate::types::{AttributeChange, DatasetDiff, GeometryChange};

/// Client of the remote vector service.
///
/// Implementations own the wire transport and authentication; callers
/// see datasets, rows and diffs. The sync engine is generic over this
/// trait, so tests drive it with an in-memory implementation.
///
/// # Contract
///
/// - `list_features` pages by cursor on feature id: rows come back in
///   ascending id order, strictly after `after`, at most `limit` of
///   them. A short or empty page means the scan is complete.
/// - `get_features` returns no particular order and silently omits ids
///   that do not exist; requesting a deleted id is not an error.
/// - `get_diff` either reports every change since `since` or fails with
///   [`RemoteError::DiffOverflow`]; it never truncates silently.
/// - Mutation calls are batch-atomic from the caller's point of view: a
///   batch either applied in full or not at all. Chunking large inputs
///   into acceptable batches is the caller's job.
///
/// [`RemoteError::DiffOverflow`]: crate::RemoteError::DiffOverflow
pub trait RemoteVectorClient: Send + Sync {
    /// Fetches the current descriptor of a dataset.
    fn get_dataset(&self, dataset: DatasetId) -> Result<RemoteDataset>;

    /// Fetches one page of rows with ids strictly greater than `after`.
    fn list_features(
        &self,
        dataset: DatasetId,
        after: Option<FeatureId>,
        limit: usize,
    ) -> Result<Vec<FeatureRow>>;

    /// Fetches exactly the requested ids; missing ids are absent from
    /// the result.
    fn get_features(&self, dataset: DatasetId, ids: &[FeatureId]) -> Result<Vec<FeatureRow>>;

    /// Fetches every change since `since`.
    fn get_diff(&self, dataset: DatasetId, since: Timestamp) -> Result<DatasetDiff>;

    /// Inserts a batch of rows; returns the server-assigned ids in
    /// input order.
    fn add_features(&self, dataset: DatasetId, rows: &[NewFeature]) -> Result<Vec<FeatureId>>;

    /// Deletes a batch of rows by id.
    fn delete_features(&self, dataset: DatasetId, ids: &[FeatureId]) -> Result<()>;

    /// Replaces attribute values for a batch of rows.
    fn update_attributes(&self, dataset: DatasetId, changes: &[AttributeChange]) -> Result<()>;

    /// Replaces geometries for a batch of rows.
    fn update_geometries(&self, dataset: DatasetId, changes: &[GeometryChange]) -> Result<()>;
}

// A shared client is still a client, so one instance can serve several
// sessions at once.
impl<T: RemoteVectorClient + ?Sized> RemoteVectorClient for Arc<T> {
    fn get_dataset(&self, dataset: DatasetId) -> Result<RemoteDataset> {
        (**self).get_dataset(dataset)
    }

    fn list_features(
        &self,
        dataset: DatasetId,
        after: Option<FeatureId>,
        limit: usize,
    ) -> Result<Vec<FeatureRow>> {
        (**self).list_features(dataset, after, limit)
    }

    fn get_features(&self, dataset: DatasetId, ids: &[FeatureId]) -> Result<Vec<FeatureRow>> {
        (**self).get_features(dataset, ids)
    }

    fn get_diff(&self, dataset: DatasetId, since: Timestamp) -> Result<DatasetDiff> {
        (**self).get_diff(dataset, since)
    }

    fn add_features(&self, dataset: DatasetId, rows: &[NewFeature]) -> Result<Vec<FeatureId>> {
        (**self).add_features(dataset, rows)
    }

    fn delete_features(&self, dataset: DatasetId, ids: &[FeatureId]) -> Result<()> {
        (**self).delete_features(dataset, ids)
    }

    fn update_attributes(&self, dataset: DatasetId, changes: &[AttributeChange]) -> Result<()> {
        (**self).update_attributes(dataset, changes)
    }

    fn update_geometries(&self, dataset: DatasetId, changes: &[GeometryChange]) -> Result<()> {
        (**self).update_geometries(dataset, changes)
    }
}
