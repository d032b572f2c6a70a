//! Sync stamp sidecars.
//!
//! The stamp records when a dataset last finished a sync without error.
//! It lives outside the cache file on purpose: advancing it must be a
//! separate, atomic step that happens only after the cache contents are
//! durable, and discarding one side without the other must be possible
//! when recovering from a crash.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use geosync_model::{DatasetId, Timestamp};

use crate::crc::compute_crc32;
use crate::error::{CacheError, Result};
use crate::fsutil::{sync_parent_dir, temp_path};

/// Magic bytes at the start of every stamp file.
pub const STAMP_MAGIC: [u8; 4] = *b"GVST";

/// Current stamp format version.
pub const STAMP_VERSION: u16 = 1;

/// A persisted "last synced at" marker for one dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStamp {
    /// Dataset the stamp belongs to.
    pub dataset_id: DatasetId,
    /// Instant captured before the first fetch of the completed sync.
    pub last_synced_at: Timestamp,
}

impl SyncStamp {
    /// Encoded size: magic (4) + version (2) + dataset (8) + stamp (8) + crc (4).
    pub const ENCODED_LEN: usize = 26;

    /// Assembles a stamp.
    #[must_use]
    pub const fn new(dataset_id: DatasetId, last_synced_at: Timestamp) -> Self {
        Self {
            dataset_id,
            last_synced_at,
        }
    }

    /// Encodes the stamp with its trailing CRC.
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[0..4].copy_from_slice(&STAMP_MAGIC);
        buf[4..6].copy_from_slice(&STAMP_VERSION.to_le_bytes());
        buf[6..14].copy_from_slice(&self.dataset_id.as_u64().to_le_bytes());
        buf[14..22].copy_from_slice(&self.last_synced_at.as_millis().to_le_bytes());
        let crc = compute_crc32(&buf[..22]);
        buf[22..26].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes and verifies a stamp.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != Self::ENCODED_LEN {
            return Err(CacheError::invalid_format("stamp has wrong length"));
        }
        if data[0..4] != STAMP_MAGIC {
            return Err(CacheError::invalid_format("bad stamp magic"));
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != STAMP_VERSION {
            return Err(CacheError::invalid_format(format!(
                "unsupported stamp version {version}"
            )));
        }

        let stored = u32::from_le_bytes([data[22], data[23], data[24], data[25]]);
        let computed = compute_crc32(&data[..22]);
        if stored != computed {
            return Err(CacheError::ChecksumMismatch { stored, computed });
        }

        let dataset_id = DatasetId::new(u64::from_le_bytes([
            data[6], data[7], data[8], data[9], data[10], data[11], data[12], data[13],
        ]));
        let last_synced_at = Timestamp::new(u64::from_le_bytes([
            data[14], data[15], data[16], data[17], data[18], data[19], data[20], data[21],
        ]));

        Ok(Self {
            dataset_id,
            last_synced_at,
        })
    }

    /// Writes the stamp atomically: temp file, fsync, rename, directory
    /// fsync. A crash leaves either the old stamp or the new one, never
    /// a torn mix.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = temp_path(path);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&self.encode())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        sync_parent_dir(path)?;
        Ok(())
    }

    /// Loads a stamp; `Ok(None)` when the file does not exist.
    ///
    /// Structural damage is an error here; the store layer decides
    /// whether to discard and rebuild.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Self::decode(&data).map(Some)
    }
}
