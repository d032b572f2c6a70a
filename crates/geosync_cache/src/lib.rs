#![deny(unsafe_code)]
#![warn(missing_docs)]

//! On-disk feature cache for geosync.
//!
//! Each remote dataset is mirrored into one append-only cache file plus
//! a small sync stamp sidecar. The [`CacheStore`] owns the directory
//! holding them, an advisory lock, and the orphan recovery that keeps
//! file and stamp in step after a crash.
//!
//! # Durability model
//!
//! - Row writes append CRC-framed records and fsync once per batch.
//! - Deletions append tombstones; space is reclaimed by compaction or a
//!   schema migration, both of which rewrite through a temp file and an
//!   atomic rename.
//! - The sync stamp is written with the same temp-rename sequence and is
//!   only ever advanced by the caller after the cache contents it
//!   describes are on disk.
//!
//! # Recovery model
//!
//! A torn append at the tail of a cache file is discarded silently; a
//! checksum mismatch anywhere else refuses to open the file. Stamp or
//! file without its counterpart is deleted and the dataset treated as
//! never synced.

mod codec;
mod crc;
mod error;
mod file;
mod fsutil;
mod header;
mod record;
mod stamp;
mod store;

pub use crc::compute_crc32;
pub use error::{CacheError, Result};
pub use file::CacheFile;
pub use header::{CacheHeader, CACHE_MAGIC, CACHE_VERSION};
pub use record::{CacheRecord, RecordFlags};
pub use stamp::{SyncStamp, STAMP_MAGIC, STAMP_VERSION};
pub use store::{CacheStore, OrphanResolution};
