//! Chunked mutation dispatch.
//!
//! Writes go straight to the remote service, never into the cache.
//! Large batches are split into chunks and dispatched sequentially;
//! the first failing chunk stops the dispatch, so a batch can land
//! partially. That partial success is the contract: the error carries
//! how much went through, and the forced re-sync afterwards pulls
//! whatever the server now holds back into the cache. Both outcomes
//! re-fetch the dataset descriptor, so role or schema changes made by
//! the server during the write are picked up immediately.

use std::sync::Arc;

use geosync_model::{DatasetId, FeatureId, NewFeature};
use geosync_remote::{AttributeChange, GeometryChange, RemoteError, RemoteVectorClient};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::registry::DatasetSlot;
use crate::sync::{SyncEngine, SyncOutcome};

/// One write operation against a dataset.
#[derive(Debug, Clone)]
pub enum MutationOp {
    /// Insert new rows; the server assigns their ids.
    Add(Vec<NewFeature>),
    /// Delete rows by id.
    Delete(Vec<FeatureId>),
    /// Replace attribute values on existing rows.
    SetAttributes(Vec<AttributeChange>),
    /// Replace geometries on existing rows.
    SetGeometries(Vec<GeometryChange>),
}

impl MutationOp {
    /// Number of rows the operation touches.
    pub fn len(&self) -> usize {
        match self {
            MutationOp::Add(rows) => rows.len(),
            MutationOp::Delete(ids) => ids.len(),
            MutationOp::SetAttributes(changes) => changes.len(),
            MutationOp::SetGeometries(changes) => changes.len(),
        }
    }

    /// Returns `true` for an operation with nothing to do.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn verb(&self) -> &'static str {
        match self {
            MutationOp::Add(_) => "add",
            MutationOp::Delete(_) => "delete",
            MutationOp::SetAttributes(_) => "update-attributes",
            MutationOp::SetGeometries(_) => "update-geometries",
        }
    }
}

/// What a fully applied mutation did.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    /// Rows the caller submitted.
    pub submitted: usize,
    /// Rows the remote accepted. Equals `submitted` on this path.
    pub applied: usize,
    /// Server-assigned ids, in input order. Empty unless the operation
    /// was an add.
    pub assigned: Vec<FeatureId>,
    /// Result of the re-sync that followed the dispatch. `None` only
    /// for empty operations, which skip the remote entirely.
    pub resync: Option<SyncOutcome>,
}

/// Dispatches writes and keeps the cache honest afterwards.
#[derive(Debug)]
pub struct MutationGateway<R> {
    engine: Arc<SyncEngine<R>>,
    remote: Arc<R>,
    config: EngineConfig,
}

impl<R: RemoteVectorClient> MutationGateway<R> {
    /// Creates a gateway that re-syncs through `engine`.
    pub fn new(engine: Arc<SyncEngine<R>>, remote: Arc<R>, config: EngineConfig) -> Self {
        MutationGateway {
            engine,
            remote,
            config,
        }
    }

    /// Applies `op` to the dataset behind `slot`.
    ///
    /// Fails with [`EngineError::ReadOnlyDataset`] before any traffic
    /// when the caller's role cannot edit. After the last attempted
    /// chunk the dataset is re-synced whether the dispatch succeeded
    /// or not; a chunk failure comes back as
    /// [`EngineError::PartialMutation`] with the applied count.
    pub fn apply(&self, slot: &DatasetSlot, op: MutationOp) -> Result<MutationOutcome> {
        let id = slot.id();

        let role = match slot.dataset() {
            Some(descriptor) => descriptor.role,
            None => self.remote.get_dataset(id)?.role,
        };
        if !role.can_edit() {
            return Err(EngineError::ReadOnlyDataset { dataset: id, role });
        }

        let submitted = op.len();
        if op.is_empty() {
            return Ok(MutationOutcome {
                submitted: 0,
                applied: 0,
                assigned: Vec::new(),
                resync: None,
            });
        }

        info!(
            dataset = %id,
            op = op.verb(),
            rows = submitted,
            chunk_size = self.config.mutation_chunk_size,
            "dispatching mutation"
        );
        let (applied, assigned, failure) = self.dispatch(id, &op);

        // The server moved even if a late chunk did not; only a fresh
        // descriptor and diff tell us where it now stands.
        let resync = self.engine.sync_dataset(slot, &CancelToken::new());

        match failure {
            None => {
                let resync = resync?;
                Ok(MutationOutcome {
                    submitted,
                    applied,
                    assigned,
                    resync: Some(resync),
                })
            }
            Some(error) => {
                if let Err(sync_error) = resync {
                    warn!(
                        dataset = %id,
                        error = %sync_error,
                        "re-sync after partial mutation failed"
                    );
                }
                Err(EngineError::PartialMutation {
                    submitted,
                    applied,
                    assigned,
                    message: error.to_string(),
                })
            }
        }
    }

    /// Runs the chunk loop. Returns rows applied, assigned ids and the
    /// error that stopped the dispatch, if any.
    fn dispatch(
        &self,
        id: DatasetId,
        op: &MutationOp,
    ) -> (usize, Vec<FeatureId>, Option<RemoteError>) {
        let chunk_size = self.config.mutation_chunk_size;
        let mut applied = 0usize;
        let mut assigned = Vec::new();
        let mut failure = None;

        match op {
            MutationOp::Add(rows) => {
                for chunk in rows.chunks(chunk_size) {
                    match self.remote.add_features(id, chunk) {
                        Ok(ids) => {
                            applied += chunk.len();
                            assigned.extend(ids);
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
            }
            MutationOp::Delete(ids) => {
                for chunk in ids.chunks(chunk_size) {
                    match self.remote.delete_features(id, chunk) {
                        Ok(()) => applied += chunk.len(),
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
            }
            MutationOp::SetAttributes(changes) => {
                for chunk in changes.chunks(chunk_size) {
                    match self.remote.update_attributes(id, chunk) {
                        Ok(()) => applied += chunk.len(),
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
            }
            MutationOp::SetGeometries(changes) => {
                for chunk in changes.chunks(chunk_size) {
                    match self.remote.update_geometries(id, chunk) {
                        Ok(()) => applied += chunk.len(),
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
            }
        }

        match &failure {
            None => debug!(dataset = %id, rows = applied, "mutation dispatched"),
            Some(e) => warn!(
                dataset = %id,
                applied,
                error = %e,
                "mutation chunk failed, stopping dispatch"
            ),
        }
        (applied, assigned, failure)
    }
}
