//! Cache file header: identity and schema of the cached dataset.

use std::io::Read;

use geosync_model::{DatasetId, GeometryKind, Schema};

use crate::crc::compute_crc32;
use crate::error::{CacheError, Result};

/// Magic bytes at the start of every cache file.
pub const CACHE_MAGIC: [u8; 4] = *b"GVCF";

/// Current cache file format version.
pub const CACHE_VERSION: u16 = 1;

/// Fixed-size part of the header, before the schema payload.
const FIXED_PREFIX: usize = 19;

/// Identity block at offset zero of a cache file.
///
/// Layout:
///
/// ```text
/// | magic (4) | version (2) | dataset_id (8) | geom_kind (1) | schema_len (4) | schema JSON | crc32 (4) |
/// ```
///
/// The schema is stored as JSON: it is tiny, read once per open, and
/// keeping it self-describing makes cache files inspectable with nothing
/// but a hex dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHeader {
    /// Dataset this file caches.
    pub dataset_id: DatasetId,
    /// Geometry kind shared by every row.
    pub geometry_kind: GeometryKind,
    /// Attribute schema rows are encoded against.
    pub schema: Schema,
}

impl CacheHeader {
    /// Assembles a header.
    #[must_use]
    pub fn new(dataset_id: DatasetId, geometry_kind: GeometryKind, schema: Schema) -> Self {
        Self {
            dataset_id,
            geometry_kind,
            schema,
        }
    }

    /// Encodes the header, including its trailing CRC.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let schema_json = serde_json::to_vec(&self.schema)
            .map_err(|e| CacheError::invalid_format(format!("schema encode failed: {e}")))?;

        let mut buf = Vec::with_capacity(FIXED_PREFIX + schema_json.len() + 4);
        buf.extend_from_slice(&CACHE_MAGIC);
        buf.extend_from_slice(&CACHE_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.dataset_id.as_u64().to_le_bytes());
        buf.push(kind_to_byte(self.geometry_kind));
        buf.extend_from_slice(&(schema_json.len() as u32).to_le_bytes());
        buf.extend_from_slice(&schema_json);

        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Reads and verifies a header, returning it and its byte length.
    pub fn read_from(reader: &mut impl Read) -> Result<(Self, u64)> {
        let mut prefix = [0u8; FIXED_PREFIX];
        reader
            .read_exact(&mut prefix)
            .map_err(|_| CacheError::invalid_format("file too short for cache header"))?;

        if prefix[0..4] != CACHE_MAGIC {
            return Err(CacheError::invalid_format("bad magic bytes"));
        }
        let version = u16::from_le_bytes([prefix[4], prefix[5]]);
        if version != CACHE_VERSION {
            return Err(CacheError::invalid_format(format!(
                "unsupported cache version {version}"
            )));
        }

        let dataset_id = DatasetId::new(u64::from_le_bytes([
            prefix[6], prefix[7], prefix[8], prefix[9], prefix[10], prefix[11], prefix[12],
            prefix[13],
        ]));
        let geometry_kind = kind_from_byte(prefix[14])?;
        let schema_len = u32::from_le_bytes([prefix[15], prefix[16], prefix[17], prefix[18]]);

        let mut rest = vec![0u8; schema_len as usize + 4];
        reader
            .read_exact(&mut rest)
            .map_err(|_| CacheError::invalid_format("truncated cache header"))?;

        let (schema_json, crc_bytes) = rest.split_at(schema_len as usize);
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

        let mut covered = prefix.to_vec();
        covered.extend_from_slice(schema_json);
        let computed = compute_crc32(&covered);
        if stored != computed {
            return Err(CacheError::ChecksumMismatch { stored, computed });
        }

        let schema: Schema = serde_json::from_slice(schema_json)
            .map_err(|e| CacheError::corrupt(format!("schema decode failed: {e}")))?;

        let total = FIXED_PREFIX as u64 + u64::from(schema_len) + 4;
        Ok((
            Self {
                dataset_id,
                geometry_kind,
                schema,
            },
            total,
        ))
    }
}

const fn kind_to_byte(kind: GeometryKind) -> u8 {
    match kind {
        GeometryKind::Point => 1,
        GeometryKind::Line => 2,
        GeometryKind::Polygon => 3,
    }
}

fn kind_from_byte(b: u8) -> Result<GeometryKind> {
    match b {
        1 => Ok(GeometryKind::Point),
        2 => Ok(GeometryKind::Line),
        3 => Ok(GeometryKind::Polygon),
        other => Err(CacheError::invalid_format(format!(
            "unknown geometry kind byte {other:#04x}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geosync_model::{FieldDef, FieldType};

    fn sample() -> CacheHeader {
        let schema = Schema::new(vec![
            FieldDef::new("name", FieldType::Text),
            FieldDef::new("height", FieldType::Float),
        ])
        .unwrap();
        CacheHeader::new(DatasetId::new(12), GeometryKind::Polygon, schema)
    }

    #[test]
    fn header_roundtrip() {
        let header = sample();
        let encoded = header.encode().unwrap();

        let mut cursor = encoded.as_slice();
        let (decoded, len) = CacheHeader::read_from(&mut cursor).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(len as usize, encoded.len());
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let mut encoded = sample().encode().unwrap();
        encoded[0] = b'X';
        assert!(matches!(
            CacheHeader::read_from(&mut encoded.as_slice()),
            Err(CacheError::InvalidFormat { .. })
        ));

        let mut encoded = sample().encode().unwrap();
        encoded[4] = 0xFE;
        assert!(matches!(
            CacheHeader::read_from(&mut encoded.as_slice()),
            Err(CacheError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn rejects_schema_bit_rot() {
        let mut encoded = sample().encode().unwrap();
        let flip = FIXED_PREFIX + 2;
        encoded[flip] ^= 0x20;
        assert!(matches!(
            CacheHeader::read_from(&mut encoded.as_slice()),
            Err(CacheError::ChecksumMismatch { .. })
        ));
    }
}
