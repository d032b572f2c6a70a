#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Offline-first sync engine over a remote vector service.
//!
//! The engine keeps per-dataset caches from [`geosync_cache`] in step
//! with a remote implementing [`RemoteVectorClient`], and serves reads
//! from the cache wherever it can. A [`SyncSession`] is the host's
//! entry point: open a dataset to sync it, iterate it lazily, write
//! through the mutation gateway, clear what is no longer wanted.
//!
//! # Sync model
//!
//! - A dataset with no trustworthy stamp is downloaded in full, page
//!   by page; the stamp is captured before the first page so nothing
//!   that changes mid-download can fall between syncs.
//! - A dataset with a stamp fetches one diff and applies it. A diff
//!   too large for the server to produce discards the cache and falls
//!   back to a full rebuild within the same call.
//! - Long syncs run on a worker thread behind a [`SyncTask`] and stop
//!   cooperatively at batch boundaries via [`CancelToken`]. A
//!   cancelled sync never advances the stamp.
//!
//! # Failure model
//!
//! Remote failures leave the previous on-disk state intact and are
//! safe to retry. Cache corruption latches the dataset in
//! [`SyncState::Corrupt`]; only clearing the cache recovers it.
//! Mutations apply chunk by chunk and stop at the first failing
//! chunk, reporting how much landed; the cache is re-synced either
//! way.
//!
//! [`RemoteVectorClient`]: geosync_remote::RemoteVectorClient

mod cancel;
mod config;
mod error;
mod iterator;
mod mutation;
mod registry;
mod session;
mod sync;
mod task;

pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use iterator::{LazyFeatureIterator, ScanFilter};
pub use mutation::{MutationGateway, MutationOp, MutationOutcome};
pub use registry::{CacheRegistry, DatasetSlot};
pub use session::SyncSession;
pub use sync::{SyncEngine, SyncKind, SyncOutcome, SyncState};
pub use task::SyncTask;
