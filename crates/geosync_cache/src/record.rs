//! Framed records inside a cache file.

use geosync_model::{FeatureId, Geometry, PropertyValue};

use crate::codec::{decode_values, encode_values};
use crate::crc::compute_crc32;
use crate::error::{CacheError, Result};

/// Flags carried by each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordFlags(u8);

impl RecordFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Record marks its feature id as deleted.
    pub const TOMBSTONE: Self = Self(0x01);

    /// Creates flags from their raw byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Self {
        Self(b)
    }

    /// Returns the raw byte value.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Checks the tombstone flag.
    #[must_use]
    pub const fn is_tombstone(self) -> bool {
        self.0 & 0x01 != 0
    }
}

/// One log entry: either a full row payload or a tombstone.
///
/// Wire layout:
///
/// ```text
/// | record_len (4) | feature_id (8) | flags (1) | geom_len (4) | geometry | values | crc32 (4) |
/// ```
///
/// `record_len` counts every byte including itself and the trailing CRC.
/// The CRC covers everything before it. A row for an id that already has
/// a record supersedes the earlier one; a tombstone (empty geometry, zero
/// values) retracts it.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    /// Feature this record concerns.
    pub feature_id: FeatureId,
    /// Record flags.
    pub flags: RecordFlags,
    /// WKB payload; empty for tombstones.
    pub geometry: Geometry,
    /// Attribute values in cache-schema order; empty for tombstones.
    pub values: Vec<PropertyValue>,
}

impl CacheRecord {
    /// Fixed prefix: record_len (4) + feature_id (8) + flags (1) + geom_len (4).
    const PREFIX_SIZE: usize = 17;
    /// Trailing CRC size.
    const CRC_SIZE: usize = 4;
    /// Smallest decodable record: prefix + empty value sequence + CRC.
    pub const MIN_SIZE: usize = Self::PREFIX_SIZE + 2 + Self::CRC_SIZE;

    /// Creates a row record.
    #[must_use]
    pub fn row(feature_id: FeatureId, geometry: Geometry, values: Vec<PropertyValue>) -> Self {
        Self {
            feature_id,
            flags: RecordFlags::NONE,
            geometry,
            values,
        }
    }

    /// Creates a tombstone for `feature_id`.
    #[must_use]
    pub fn tombstone(feature_id: FeatureId) -> Self {
        Self {
            feature_id,
            flags: RecordFlags::TOMBSTONE,
            geometry: Geometry::from_wkb(Vec::new()),
            values: Vec::new(),
        }
    }

    /// Returns whether this record retracts its feature id.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.flags.is_tombstone()
    }

    /// Encodes the record to its framed byte form.
    pub fn encode(&self) -> Vec<u8> {
        let mut values_buf = Vec::new();
        encode_values(&self.values, &mut values_buf);

        let record_len =
            Self::PREFIX_SIZE + self.geometry.len() + values_buf.len() + Self::CRC_SIZE;
        let mut buf = Vec::with_capacity(record_len);

        buf.extend_from_slice(&(record_len as u32).to_le_bytes());
        buf.extend_from_slice(&self.feature_id.as_u64().to_le_bytes());
        buf.push(self.flags.as_byte());
        buf.extend_from_slice(&(self.geometry.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.geometry.as_bytes());
        buf.extend_from_slice(&values_buf);

        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());

        buf
    }

    /// Decodes one record from `data`, verifying its CRC.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(CacheError::corrupt("record too short"));
        }

        let record_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if record_len < Self::MIN_SIZE || data.len() < record_len {
            return Err(CacheError::corrupt("incomplete record"));
        }

        let stored = u32::from_le_bytes([
            data[record_len - 4],
            data[record_len - 3],
            data[record_len - 2],
            data[record_len - 1],
        ]);
        let computed = compute_crc32(&data[..record_len - 4]);
        if stored != computed {
            return Err(CacheError::ChecksumMismatch { stored, computed });
        }

        let feature_id = FeatureId::new(u64::from_le_bytes([
            data[4], data[5], data[6], data[7], data[8], data[9], data[10], data[11],
        ]));
        let flags = RecordFlags::from_byte(data[12]);
        let geom_len = u32::from_le_bytes([data[13], data[14], data[15], data[16]]) as usize;

        let values_start = Self::PREFIX_SIZE
            .checked_add(geom_len)
            .filter(|&start| start + Self::CRC_SIZE <= record_len)
            .ok_or_else(|| CacheError::corrupt("geometry length exceeds record"))?;

        let geometry = Geometry::from_wkb(data[Self::PREFIX_SIZE..values_start].to_vec());
        let values = decode_values(&data[values_start..record_len - Self::CRC_SIZE])?;

        Ok(Self {
            feature_id,
            flags,
            geometry,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_record_roundtrip() {
        let record = CacheRecord::row(
            FeatureId::new(42),
            Geometry::from_wkb(vec![0x01, 0x01, 0x00, 0x00, 0x00]),
            vec![PropertyValue::Int(7), PropertyValue::Text("pond".into())],
        );

        let encoded = record.encode();
        assert_eq!(
            u32::from_le_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]) as usize,
            encoded.len()
        );
        assert_eq!(CacheRecord::decode(&encoded).unwrap(), record);
    }

    #[test]
    fn tombstone_roundtrip() {
        let record = CacheRecord::tombstone(FeatureId::new(9));
        assert!(record.is_tombstone());

        let decoded = CacheRecord::decode(&record.encode()).unwrap();
        assert!(decoded.is_tombstone());
        assert_eq!(decoded.feature_id, FeatureId::new(9));
        assert!(decoded.geometry.is_empty());
    }

    #[test]
    fn detects_flipped_bits() {
        let mut encoded = CacheRecord::row(
            FeatureId::new(1),
            Geometry::from_wkb(vec![1, 2, 3]),
            vec![PropertyValue::Bool(true)],
        )
        .encode();
        encoded[6] ^= 0xFF;

        assert!(matches!(
            CacheRecord::decode(&encoded),
            Err(CacheError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn rejects_oversized_geometry_length() {
        let mut encoded = CacheRecord::tombstone(FeatureId::new(1)).encode();
        // Claim a geometry longer than the record, then re-seal the CRC so
        // the structural check is what trips.
        let bogus = (encoded.len() as u32).to_le_bytes();
        encoded[13..17].copy_from_slice(&bogus);
        let crc = compute_crc32(&encoded[..encoded.len() - 4]);
        let crc_start = encoded.len() - 4;
        encoded[crc_start..].copy_from_slice(&crc.to_le_bytes());

        assert!(matches!(
            CacheRecord::decode(&encoded),
            Err(CacheError::Corrupt { .. })
        ));
    }
}
