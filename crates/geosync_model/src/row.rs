//! Feature rows as read from a dataset and as submitted for insert.

use serde::{Deserialize, Serialize};

use crate::geometry::Geometry;
use crate::ids::FeatureId;
use crate::value::PropertyMap;

/// One stored feature: id, geometry and attribute values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Server-assigned id, unique within the dataset.
    pub id: FeatureId,
    /// Opaque WKB payload of the dataset's geometry kind.
    pub geometry: Geometry,
    /// Attribute values, keyed by column name.
    pub properties: PropertyMap,
}

impl FeatureRow {
    /// Assembles a row.
    pub fn new(id: FeatureId, geometry: Geometry, properties: PropertyMap) -> Self {
        Self {
            id,
            geometry,
            properties,
        }
    }
}

/// A feature to be inserted; the id is assigned by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFeature {
    /// Opaque WKB payload of the dataset's geometry kind.
    pub geometry: Geometry,
    /// Attribute values, keyed by column name.
    pub properties: PropertyMap,
}

impl NewFeature {
    /// Assembles an insert candidate.
    pub fn new(geometry: Geometry, properties: PropertyMap) -> Self {
        Self {
            geometry,
            properties,
        }
    }

    /// Promotes the candidate to a stored row once the id is known.
    pub fn into_row(self, id: FeatureId) -> FeatureRow {
        FeatureRow::new(id, self.geometry, self.properties)
    }
}
