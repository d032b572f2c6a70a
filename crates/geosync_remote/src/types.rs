//! Wire types exchanged with the remote vector service.

use geosync_model::{FeatureId, FeatureRow, Geometry, PropertyMap};
use serde::{Deserialize, Serialize};

/// Everything that changed in a dataset since a given instant.
///
/// Consumed immediately by the sync engine; `updated_rows` carry full
/// payloads with delete-then-insert semantics, never field-level
/// patches.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatasetDiff {
    /// Rows inserted or modified since the reference instant.
    pub updated_rows: Vec<FeatureRow>,
    /// Ids of rows deleted since the reference instant.
    pub deleted_ids: Vec<FeatureId>,
}

impl DatasetDiff {
    /// True when the diff carries no changes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updated_rows.is_empty() && self.deleted_ids.is_empty()
    }

    /// Number of individual change operations in the diff.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.updated_rows.len() + self.deleted_ids.len()
    }
}

/// A request to replace the attribute values of one feature.
///
/// Only the columns named in `properties` change; the geometry and the
/// remaining columns keep their server-side values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// Feature to modify.
    pub id: FeatureId,
    /// New values for the named columns.
    pub properties: PropertyMap,
}

impl AttributeChange {
    /// Assembles an attribute change.
    pub fn new(id: FeatureId, properties: PropertyMap) -> Self {
        Self { id, properties }
    }
}

/// A request to replace the geometry of one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryChange {
    /// Feature to modify.
    pub id: FeatureId,
    /// Replacement WKB payload.
    pub geometry: Geometry,
}

impl GeometryChange {
    /// Assembles a geometry change.
    pub fn new(id: FeatureId, geometry: Geometry) -> Self {
        Self { id, geometry }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_diff_reports_itself() {
        let diff = DatasetDiff::default();
        assert!(diff.is_empty());
        assert_eq!(diff.change_count(), 0);

        let diff = DatasetDiff {
            updated_rows: Vec::new(),
            deleted_ids: vec![FeatureId::new(1), FeatureId::new(2)],
        };
        assert!(!diff.is_empty());
        assert_eq!(diff.change_count(), 2);
    }

    #[test]
    fn diff_round_trips_through_json() {
        let diff = DatasetDiff {
            updated_rows: vec![FeatureRow::new(
                FeatureId::new(3),
                Geometry::from_wkb(vec![1, 2]),
                PropertyMap::new(),
            )],
            deleted_ids: vec![FeatureId::new(9)],
        };
        let json = serde_json::to_string(&diff).unwrap();
        let back: DatasetDiff = serde_json::from_str(&json).unwrap();
        assert_eq!(back, diff);
    }
}
