//! Error types for the sync engine.

use geosync_cache::CacheError;
use geosync_model::{DatasetId, DatasetRole, FeatureId};
use geosync_remote::RemoteError;
use thiserror::Error;

/// Errors produced by sync, iteration and mutation operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The on-disk cache layer failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The remote service failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The operation was cancelled at a batch boundary.
    ///
    /// Work completed before the boundary is kept; the sync stamp is
    /// not advanced.
    #[error("operation cancelled")]
    Cancelled,

    /// The dataset's cache is unusable until the caller clears it.
    #[error("cache for dataset {dataset} is corrupt; clear it to recover")]
    CacheCorrupt {
        /// Dataset whose cache failed validation.
        dataset: DatasetId,
    },

    /// The caller's role on the dataset does not permit writes.
    #[error("dataset {dataset} is read-only for role {role}")]
    ReadOnlyDataset {
        /// Dataset the write was aimed at.
        dataset: DatasetId,
        /// Role the remote reported for the caller.
        role: DatasetRole,
    },

    /// No open session slot exists for the dataset.
    #[error("dataset {dataset} is not open")]
    DatasetNotOpen {
        /// Dataset the operation named.
        dataset: DatasetId,
    },

    /// A chunked mutation stopped partway.
    ///
    /// Chunks dispatched before the failure are live on the remote.
    /// `applied` counts their rows; for feature adds, `assigned` holds
    /// the ids the remote allocated for them.
    #[error("mutation applied {applied} of {submitted} rows: {message}")]
    PartialMutation {
        /// Rows the caller submitted.
        submitted: usize,
        /// Rows in chunks that completed before the failure.
        applied: usize,
        /// Ids assigned to rows of completed add chunks.
        assigned: Vec<FeatureId>,
        /// Description of the failing chunk's error.
        message: String,
    },

    /// A background sync worker terminated without reporting a result.
    #[error("sync worker failed: {message}")]
    SyncWorker {
        /// What went wrong with the worker.
        message: String,
    },
}

impl EngineError {
    /// Creates a [`EngineError::SyncWorker`] error.
    pub fn worker(message: impl Into<String>) -> Self {
        EngineError::SyncWorker {
            message: message.into(),
        }
    }

    /// Returns `true` if retrying the operation could succeed.
    ///
    /// Only transient remote failures are retryable. Cache errors,
    /// cancellation and partial mutations are not: the caller has to
    /// inspect state before going again.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Remote(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns `true` if the error means the cache file itself can no
    /// longer be trusted.
    ///
    /// Plain I/O failures do not qualify; they abort the operation but
    /// the file stays readable.
    pub fn is_cache_corruption(&self) -> bool {
        matches!(
            self,
            EngineError::CacheCorrupt { .. }
                | EngineError::Cache(
                    CacheError::ChecksumMismatch { .. }
                        | CacheError::Corrupt { .. }
                        | CacheError::InvalidFormat { .. }
                )
        )
    }
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
