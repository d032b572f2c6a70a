//! Geometry kind tags and opaque WKB payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The single geometry kind a dataset is declared with.
///
/// Every feature in a dataset carries geometry of the dataset's kind;
/// mixed-geometry datasets do not exist in this model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    /// Point or multi-point features.
    Point,
    /// Polyline or multi-polyline features.
    Line,
    /// Polygon or multi-polygon features.
    Polygon,
}

impl GeometryKind {
    /// Stable lowercase name, as used on the remote wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Line => "line",
            Self::Polygon => "polygon",
        }
    }

    /// Maps a well-known-binary geometry type code onto a kind.
    ///
    /// The base code is taken modulo 1000 so Z/M/ZM variants collapse
    /// onto their planar kind; multi-geometries collapse onto the
    /// matching single kind. Unknown codes return `None`.
    pub const fn from_wkb_code(code: u32) -> Option<Self> {
        match code % 1000 {
            1 | 4 => Some(Self::Point),
            2 | 5 => Some(Self::Line),
            3 | 6 => Some(Self::Polygon),
            _ => None,
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An opaque well-known-binary geometry payload.
///
/// The cache and the sync engine never interpret coordinates; the blob is
/// carried byte-for-byte between the remote service and the cache file.
/// Only the leading byte-order flag and type code are ever peeked at, and
/// purely for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Geometry(Vec<u8>);

impl Geometry {
    /// Wraps raw WKB bytes without validating them.
    pub const fn from_wkb(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrows the raw WKB bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the geometry and returns the raw WKB bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no payload bytes are present at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reads the WKB geometry type code, honouring the byte-order flag.
    ///
    /// Returns `None` for payloads too short to carry a WKB header.
    pub fn wkb_code(&self) -> Option<u32> {
        if self.0.len() < 5 {
            return None;
        }
        let raw = [self.0[1], self.0[2], self.0[3], self.0[4]];
        match self.0[0] {
            0 => Some(u32::from_be_bytes(raw)),
            _ => Some(u32::from_le_bytes(raw)),
        }
    }

    /// Best-effort kind of this payload, if the header is readable.
    pub fn kind(&self) -> Option<GeometryKind> {
        self.wkb_code().and_then(GeometryKind::from_wkb_code)
    }
}

impl From<Vec<u8>> for Geometry {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le_point() -> Vec<u8> {
        // 01 (little endian) + type 1 + x/y doubles
        let mut wkb = vec![0x01, 0x01, 0x00, 0x00, 0x00];
        wkb.extend_from_slice(&1.5f64.to_le_bytes());
        wkb.extend_from_slice(&2.5f64.to_le_bytes());
        wkb
    }

    #[test]
    fn peeks_type_code_in_both_byte_orders() {
        let le = Geometry::from_wkb(le_point());
        assert_eq!(le.wkb_code(), Some(1));
        assert_eq!(le.kind(), Some(GeometryKind::Point));

        let be = Geometry::from_wkb(vec![0x00, 0x00, 0x00, 0x00, 0x03]);
        assert_eq!(be.wkb_code(), Some(3));
        assert_eq!(be.kind(), Some(GeometryKind::Polygon));
    }

    #[test]
    fn short_payloads_have_no_code() {
        assert_eq!(Geometry::from_wkb(vec![0x01, 0x02]).wkb_code(), None);
        assert_eq!(Geometry::from_wkb(Vec::new()).kind(), None);
    }

    #[test]
    fn multi_and_z_codes_collapse_onto_kinds() {
        assert_eq!(GeometryKind::from_wkb_code(5), Some(GeometryKind::Line));
        assert_eq!(GeometryKind::from_wkb_code(1006), Some(GeometryKind::Polygon));
        assert_eq!(GeometryKind::from_wkb_code(2004), Some(GeometryKind::Point));
        assert_eq!(GeometryKind::from_wkb_code(17), None);
    }

    #[test]
    fn kind_names_round_trip_through_serde() {
        let json = serde_json::to_string(&GeometryKind::Line).unwrap();
        assert_eq!(json, "\"line\"");
        let back: GeometryKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, GeometryKind::Line);
    }
}
