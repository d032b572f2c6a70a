//! Binary encoding for schema-ordered attribute values.
//!
//! Row payloads store values positionally, in cache-schema order, so
//! column names are written once in the file header instead of once per
//! row. Each value is a one-byte tag followed by a fixed or
//! length-prefixed payload.

use geosync_model::PropertyValue;

use crate::error::{CacheError, Result};

const TAG_NULL: u8 = 0x00;
const TAG_FALSE: u8 = 0x01;
const TAG_TRUE: u8 = 0x02;
const TAG_INT: u8 = 0x03;
const TAG_FLOAT: u8 = 0x04;
const TAG_TEXT: u8 = 0x05;

/// Appends `values` to `buf` with a leading `u16` count.
pub fn encode_values(values: &[PropertyValue], buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(values.len() as u16).to_le_bytes());
    for value in values {
        match value {
            PropertyValue::Null => buf.push(TAG_NULL),
            PropertyValue::Bool(false) => buf.push(TAG_FALSE),
            PropertyValue::Bool(true) => buf.push(TAG_TRUE),
            PropertyValue::Int(i) => {
                buf.push(TAG_INT);
                buf.extend_from_slice(&i.to_le_bytes());
            }
            PropertyValue::Float(f) => {
                buf.push(TAG_FLOAT);
                buf.extend_from_slice(&f.to_bits().to_le_bytes());
            }
            PropertyValue::Text(t) => {
                buf.push(TAG_TEXT);
                buf.extend_from_slice(&(t.len() as u32).to_le_bytes());
                buf.extend_from_slice(t.as_bytes());
            }
        }
    }
}

/// Decodes a value sequence written by [`encode_values`].
///
/// The input must contain exactly one encoded sequence and nothing else;
/// trailing bytes are treated as corruption.
pub fn decode_values(data: &[u8]) -> Result<Vec<PropertyValue>> {
    let mut reader = ByteReader::new(data);
    let count = reader.read_u16()? as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let value = match reader.read_u8()? {
            TAG_NULL => PropertyValue::Null,
            TAG_FALSE => PropertyValue::Bool(false),
            TAG_TRUE => PropertyValue::Bool(true),
            TAG_INT => PropertyValue::Int(i64::from_le_bytes(reader.read_array()?)),
            TAG_FLOAT => PropertyValue::Float(f64::from_bits(u64::from_le_bytes(
                reader.read_array()?,
            ))),
            TAG_TEXT => {
                let len = reader.read_u32()? as usize;
                let bytes = reader.read_bytes(len)?;
                let text = String::from_utf8(bytes.to_vec())
                    .map_err(|_| CacheError::corrupt("text value is not valid UTF-8"))?;
                PropertyValue::Text(text)
            }
            tag => {
                return Err(CacheError::corrupt(format!("unknown value tag {tag:#04x}")));
            }
        };
        values.push(value);
    }
    if !reader.is_exhausted() {
        return Err(CacheError::corrupt("trailing bytes after value sequence"));
    }
    Ok(values)
}

/// Bounds-checked forward reader over a byte slice.
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| CacheError::corrupt("value payload truncated"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn is_exhausted(&self) -> bool {
        self.pos == self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(values: Vec<PropertyValue>) -> Vec<PropertyValue> {
        let mut buf = Vec::new();
        encode_values(&values, &mut buf);
        decode_values(&buf).unwrap()
    }

    #[test]
    fn encodes_every_tag() {
        let values = vec![
            PropertyValue::Null,
            PropertyValue::Bool(true),
            PropertyValue::Bool(false),
            PropertyValue::Int(-42),
            PropertyValue::Float(2.75),
            PropertyValue::Text("trailhead".into()),
        ];
        assert_eq!(roundtrip(values.clone()), values);
    }

    #[test]
    fn empty_sequence_is_two_bytes() {
        let mut buf = Vec::new();
        encode_values(&[], &mut buf);
        assert_eq!(buf, vec![0, 0]);
        assert!(decode_values(&buf).unwrap().is_empty());
    }

    #[test]
    fn rejects_unknown_tag_and_trailing_garbage() {
        let bad_tag = vec![1, 0, 0xEE];
        assert!(matches!(
            decode_values(&bad_tag),
            Err(CacheError::Corrupt { .. })
        ));

        let mut buf = Vec::new();
        encode_values(&[PropertyValue::Null], &mut buf);
        buf.push(0x00);
        assert!(matches!(
            decode_values(&buf),
            Err(CacheError::Corrupt { .. })
        ));
    }

    #[test]
    fn rejects_truncated_text() {
        let mut buf = Vec::new();
        encode_values(&[PropertyValue::Text("longtext".into())], &mut buf);
        buf.truncate(buf.len() - 3);
        assert!(decode_values(&buf).is_err());
    }

    fn value_strategy() -> impl Strategy<Value = PropertyValue> {
        prop_oneof![
            Just(PropertyValue::Null),
            any::<bool>().prop_map(PropertyValue::Bool),
            any::<i64>().prop_map(PropertyValue::Int),
            any::<f64>()
                .prop_filter("finite floats compare by value", |f| f.is_finite())
                .prop_map(PropertyValue::Float),
            ".{0,24}".prop_map(PropertyValue::Text),
        ]
    }

    proptest! {
        #[test]
        fn arbitrary_sequences_round_trip(values in proptest::collection::vec(value_strategy(), 0..12)) {
            prop_assert_eq!(roundtrip(values.clone()), values);
        }
    }
}
