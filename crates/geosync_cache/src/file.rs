//! One open cache file: an append-only record log plus a feature index.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use geosync_model::{DatasetId, FeatureId, FeatureRow, GeometryKind, Schema};
use tracing::warn;

use crate::error::{CacheError, Result};
use crate::fsutil::{sync_parent_dir, temp_path};
use crate::header::CacheHeader;
use crate::record::CacheRecord;

/// Location of one live record within the file.
#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: u64,
    len: u32,
}

/// An open per-dataset cache file.
///
/// Rows are kept as framed records appended after the header; an
/// in-memory index maps each live feature id to its newest record.
/// Updates append a superseding record and deletions append a
/// tombstone, so every write is a single sequential append followed by
/// one fsync. Superseded bytes stay in the file until [`compact`] or a
/// schema migration rewrites it.
///
/// The handle is single-writer by construction: every operation takes
/// `&mut self`, and callers serialise access per dataset id.
///
/// # Open-time recovery
///
/// A record cut short at the end of the file is treated as a torn
/// append: the tail is discarded and the file truncated back to the
/// last complete record. A checksum mismatch anywhere is fatal; the
/// file refuses to open and the caller rebuilds from the remote.
///
/// [`compact`]: CacheFile::compact
#[derive(Debug)]
pub struct CacheFile {
    path: PathBuf,
    file: File,
    header: CacheHeader,
    index: BTreeMap<FeatureId, Slot>,
    size: u64,
    dead_bytes: u64,
}

impl CacheFile {
    /// Creates an empty cache file, replacing any existing file at `path`.
    pub fn create(path: &Path, header: CacheHeader) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let bytes = header.encode()?;
        file.write_all(&bytes)?;
        file.sync_all()?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            header,
            index: BTreeMap::new(),
            size: bytes.len() as u64,
            dead_bytes: 0,
        })
    }

    /// Opens an existing cache file and rebuilds its index.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let disk_size = file.metadata()?.len();

        let mut reader = BufReader::new(&file);
        let (header, header_len) = CacheHeader::read_from(&mut reader)?;

        let mut index: BTreeMap<FeatureId, Slot> = BTreeMap::new();
        let mut dead_bytes = 0u64;
        let mut offset = header_len;

        loop {
            let mut len_bytes = [0u8; 4];
            let got = read_fully(&mut reader, &mut len_bytes)?;
            if got == 0 {
                break;
            }
            if got < len_bytes.len() {
                // Torn length prefix at EOF.
                break;
            }

            let record_len = u32::from_le_bytes(len_bytes) as usize;
            if record_len < CacheRecord::MIN_SIZE {
                return Err(CacheError::corrupt(format!(
                    "impossible record length {record_len} at offset {offset}"
                )));
            }
            if offset + record_len as u64 > disk_size {
                // Torn append: length written, payload missing.
                break;
            }

            let mut buf = vec![0u8; record_len];
            buf[..4].copy_from_slice(&len_bytes);
            let body = read_fully(&mut reader, &mut buf[4..])?;
            if body < record_len - 4 {
                break;
            }

            let record = CacheRecord::decode(&buf)?;
            if record.is_tombstone() {
                if let Some(prev) = index.remove(&record.feature_id) {
                    dead_bytes += u64::from(prev.len);
                }
                dead_bytes += record_len as u64;
            } else {
                let slot = Slot {
                    offset,
                    len: record_len as u32,
                };
                if let Some(prev) = index.insert(record.feature_id, slot) {
                    dead_bytes += u64::from(prev.len);
                }
            }
            offset += record_len as u64;
        }

        drop(reader);

        if offset < disk_size {
            warn!(
                path = %path.display(),
                dropped = disk_size - offset,
                "truncating torn tail of cache file"
            );
            file.set_len(offset)?;
            file.sync_all()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            header,
            index,
            size: offset,
            dead_bytes,
        })
    }

    /// Dataset this file caches.
    #[must_use]
    pub fn dataset_id(&self) -> DatasetId {
        self.header.dataset_id
    }

    /// Geometry kind rows were cached with.
    #[must_use]
    pub fn geometry_kind(&self) -> GeometryKind {
        self.header.geometry_kind
    }

    /// Schema rows are currently encoded against.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.header.schema
    }

    /// Path of the file on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of live rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.index.len()
    }

    /// True when a live row exists for `id`.
    #[must_use]
    pub fn contains(&self, id: FeatureId) -> bool {
        self.index.contains_key(&id)
    }

    /// Highest live feature id, the cursor for sequential remote pulls.
    #[must_use]
    pub fn max_feature_id(&self) -> Option<FeatureId> {
        self.index.keys().next_back().copied()
    }

    /// Total file size in bytes.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.size
    }

    /// Bytes held by superseded records and applied tombstones.
    #[must_use]
    pub fn dead_bytes(&self) -> u64 {
        self.dead_bytes
    }

    /// Reads the live row for `id`, if any.
    pub fn get(&mut self, id: FeatureId) -> Result<Option<FeatureRow>> {
        let Some(slot) = self.index.get(&id).copied() else {
            return Ok(None);
        };
        let record = self.read_record(slot)?;
        if record.feature_id != id {
            return Err(CacheError::corrupt(format!(
                "index for {id} points at record for {}",
                record.feature_id
            )));
        }
        Ok(Some(self.record_to_row(record)))
    }

    /// Reads rows for `ids`, silently skipping ids with no live row.
    pub fn get_many(&mut self, ids: &[FeatureId]) -> Result<Vec<FeatureRow>> {
        let mut rows = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(row) = self.get(id)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Reads up to `limit` rows with ids strictly greater than `after`,
    /// in ascending id order.
    pub fn page_after(&mut self, after: Option<FeatureId>, limit: usize) -> Result<Vec<FeatureRow>> {
        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        let slots: Vec<(FeatureId, Slot)> = self
            .index
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(id, slot)| (*id, *slot))
            .collect();

        let mut rows = Vec::with_capacity(slots.len());
        for (id, slot) in slots {
            let record = self.read_record(slot)?;
            if record.feature_id != id {
                return Err(CacheError::corrupt(format!(
                    "index for {id} points at record for {}",
                    record.feature_id
                )));
            }
            rows.push(self.record_to_row(record));
        }
        Ok(rows)
    }

    /// Inserts or replaces one row.
    pub fn upsert(&mut self, row: &FeatureRow) -> Result<()> {
        self.upsert_many(std::slice::from_ref(row))
    }

    /// Inserts or replaces a batch of rows with one append and one fsync.
    ///
    /// A row replacing an existing id supersedes the old record; within
    /// one batch the last occurrence of an id wins.
    pub fn upsert_many(&mut self, rows: &[FeatureRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        let mut lens = Vec::with_capacity(rows.len());
        for row in rows {
            let values = self.header.schema.conform(&row.properties);
            let encoded = CacheRecord::row(row.id, row.geometry.clone(), values).encode();
            lens.push((row.id, encoded.len() as u32));
            buf.extend_from_slice(&encoded);
        }

        self.append_all(&buf)?;

        let mut offset = self.size;
        for (id, len) in lens {
            if let Some(prev) = self.index.insert(id, Slot { offset, len }) {
                self.dead_bytes += u64::from(prev.len);
            }
            offset += u64::from(len);
        }
        self.size = offset;
        Ok(())
    }

    /// Deletes one row; returns whether it existed.
    pub fn delete(&mut self, id: FeatureId) -> Result<bool> {
        Ok(self.delete_many(std::slice::from_ref(&id))? == 1)
    }

    /// Deletes a batch of rows, appending one tombstone per live id.
    ///
    /// Ids with no live row are ignored. Returns the number of rows
    /// actually removed.
    pub fn delete_many(&mut self, ids: &[FeatureId]) -> Result<usize> {
        let mut buf = Vec::new();
        let mut doomed = Vec::new();
        for &id in ids {
            if self.index.contains_key(&id) && !doomed.contains(&id) {
                buf.extend_from_slice(&CacheRecord::tombstone(id).encode());
                doomed.push(id);
            }
        }
        if doomed.is_empty() {
            return Ok(0);
        }

        self.append_all(&buf)?;

        for id in &doomed {
            if let Some(prev) = self.index.remove(id) {
                self.dead_bytes += u64::from(prev.len);
            }
        }
        self.dead_bytes += buf.len() as u64;
        self.size += buf.len() as u64;
        Ok(doomed.len())
    }

    /// Reconciles the stored schema with `target`.
    ///
    /// A no-op when the schemas already agree. Otherwise the file is
    /// rewritten: surviving columns keep their values, dropped columns
    /// disappear, added columns come back `Null`. Returns whether a
    /// rewrite happened.
    pub fn migrate_schema(&mut self, target: &Schema) -> Result<bool> {
        if self.header.schema == *target {
            return Ok(false);
        }
        self.rewrite(target.clone())?;
        Ok(true)
    }

    /// Rewrites the file without its dead bytes. Returns bytes reclaimed.
    pub fn compact(&mut self) -> Result<u64> {
        let before = self.size;
        let schema = self.header.schema.clone();
        self.rewrite(schema)?;
        Ok(before.saturating_sub(self.size))
    }

    /// Flushes outstanding writes to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn append_all(&mut self, buf: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(buf)?;
        self.file.sync_all()?;
        Ok(())
    }

    fn read_record(&mut self, slot: Slot) -> Result<CacheRecord> {
        self.file.seek(SeekFrom::Start(slot.offset))?;
        let mut buf = vec![0u8; slot.len as usize];
        self.file.read_exact(&mut buf)?;
        CacheRecord::decode(&buf)
    }

    fn record_to_row(&self, record: CacheRecord) -> FeatureRow {
        let properties = self.header.schema.named_row(record.values);
        FeatureRow::new(record.feature_id, record.geometry, properties)
    }

    /// Streams live rows into a fresh file under `schema`, then swaps it
    /// in with a rename. The write-temp-sync-rename sequence keeps the
    /// old file intact until the new one is durable.
    fn rewrite(&mut self, schema: Schema) -> Result<()> {
        let old_schema = self.header.schema.clone();
        let new_header = CacheHeader::new(self.header.dataset_id, self.header.geometry_kind, schema);

        let tmp = temp_path(&self.path);
        let slots: Vec<Slot> = self.index.values().copied().collect();

        let mut new_index = BTreeMap::new();
        let mut new_size;
        {
            let tmp_file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            let mut writer = BufWriter::new(tmp_file);

            let header_bytes = new_header.encode()?;
            writer.write_all(&header_bytes)?;
            new_size = header_bytes.len() as u64;

            for slot in slots {
                let record = self.read_record(slot)?;
                let named = old_schema.named_row(record.values);
                let values = new_header.schema.conform(&named);
                let encoded = CacheRecord::row(record.feature_id, record.geometry, values).encode();
                writer.write_all(&encoded)?;
                new_index.insert(
                    record.feature_id,
                    Slot {
                        offset: new_size,
                        len: encoded.len() as u32,
                    },
                );
                new_size += encoded.len() as u64;
            }

            let tmp_file = writer
                .into_inner()
                .map_err(|e| CacheError::Io(e.into_error()))?;
            tmp_file.sync_all()?;
        }

        fs::rename(&tmp, &self.path)?;
        sync_parent_dir(&self.path)?;

        self.file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        self.header = new_header;
        self.index = new_index;
        self.size = new_size;
        self.dead_bytes = 0;
        Ok(())
    }
}

/// Reads until `buf` is full or EOF; returns bytes actually read.
fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
