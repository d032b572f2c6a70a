//! Cache-level error types.

use thiserror::Error;

/// Errors raised by the on-disk cache layer.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored checksum did not match the recomputed one.
    ///
    /// Checksum failures are fatal for the affected cache file; no
    /// heuristic repair is attempted. The caller discards and rebuilds.
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Checksum read from disk.
        stored: u32,
        /// Checksum computed over the data.
        computed: u32,
    },

    /// A cache file or stamp had an unreadable structure.
    #[error("corrupt cache data: {message}")]
    Corrupt {
        /// What was wrong.
        message: String,
    },

    /// A file did not start with the expected magic or carried an
    /// unsupported format version.
    #[error("invalid cache format: {message}")]
    InvalidFormat {
        /// What was wrong.
        message: String,
    },

    /// A cache file belongs to a different dataset than requested, or
    /// was created with a different geometry kind.
    #[error("cache does not match dataset: {message}")]
    DatasetMismatch {
        /// What differed.
        message: String,
    },

    /// Another process holds the cache directory lock.
    #[error("cache directory is locked by another process")]
    StoreLocked,

    /// Model-level validation failed while decoding stored data.
    #[error("model error: {0}")]
    Model(#[from] geosync_model::ModelError),
}

impl CacheError {
    /// Builds a [`CacheError::Corrupt`].
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }

    /// Builds a [`CacheError::InvalidFormat`].
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Builds a [`CacheError::DatasetMismatch`].
    pub fn dataset_mismatch(message: impl Into<String>) -> Self {
        Self::DatasetMismatch {
            message: message.into(),
        }
    }
}

/// Convenience alias for cache results.
pub type Result<T> = std::result::Result<T, CacheError>;
