//! Errors surfaced by remote vector clients.

use geosync_model::DatasetId;
use thiserror::Error;

/// Errors a [`RemoteVectorClient`](crate::RemoteVectorClient) may return.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network or authentication failure below the API layer.
    ///
    /// Retry policy belongs to the caller; `retryable` only says whether
    /// a retry could possibly help (timeouts yes, bad credentials no).
    #[error("transport failure: {message}")]
    Transport {
        /// Human-readable failure description.
        message: String,
        /// Whether retrying the same call may succeed.
        retryable: bool,
    },

    /// The change set since the requested timestamp is too large for the
    /// service to report as a diff.
    ///
    /// This is a distinguished condition, never a partial result: the
    /// engine reacts by rebuilding the cache from scratch.
    #[error("diff exceeds the maximum reportable size")]
    DiffOverflow,

    /// The caller's role does not permit the operation.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// What was refused.
        message: String,
    },

    /// The dataset does not exist or is not visible to the caller.
    #[error("dataset not found: {dataset}")]
    DatasetNotFound {
        /// The missing dataset.
        dataset: DatasetId,
    },

    /// The service answered with something structurally unusable.
    #[error("protocol error: {message}")]
    Protocol {
        /// What was malformed.
        message: String,
    },
}

impl RemoteError {
    /// Builds a retryable [`RemoteError::Transport`].
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Builds a non-retryable [`RemoteError::Transport`].
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Builds a [`RemoteError::PermissionDenied`].
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Builds a [`RemoteError::Protocol`].
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                retryable: true,
                ..
            }
        )
    }
}

/// Convenience alias for remote call results.
pub type Result<T> = std::result::Result<T, RemoteError>;
