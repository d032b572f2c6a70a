//! Remote dataset descriptors, spatial extents and access roles.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::GeometryKind;
use crate::ids::DatasetId;
use crate::schema::Schema;

/// The caller's role on a dataset, as granted by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetRole {
    /// Full control, including feature edits.
    Owner,
    /// Administrative access, including feature edits.
    Admin,
    /// Read-only membership.
    Member,
}

impl DatasetRole {
    /// True when this role may insert or delete features.
    pub const fn can_edit(self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }

    /// Stable lowercase name, as used on the remote wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }
}

impl fmt::Display for DatasetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An axis-aligned bounding box in dataset coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    /// Western edge.
    pub min_x: f64,
    /// Southern edge.
    pub min_y: f64,
    /// Eastern edge.
    pub max_x: f64,
    /// Northern edge.
    pub max_y: f64,
}

impl Extent {
    /// Builds an extent from its corners.
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// True when the box encloses no area at all.
    pub fn is_degenerate(&self) -> bool {
        self.min_x >= self.max_x || self.min_y >= self.max_y
    }
}

/// Everything the remote service says about one dataset.
///
/// This descriptor is re-fetched at the start of every sync; the cached
/// copy of a dataset is only ever interpreted against the descriptor it
/// was last reconciled with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDataset {
    /// Dataset id.
    pub id: DatasetId,
    /// Human-readable dataset name.
    pub name: String,
    /// Geometry kind shared by all features.
    pub geometry_kind: GeometryKind,
    /// Current attribute schema.
    pub schema: Schema,
    /// Authoritative feature count at descriptor time.
    pub feature_count: u64,
    /// Bounding box of all features, if the dataset is non-empty.
    pub extent: Option<Extent>,
    /// The caller's role on this dataset.
    pub role: DatasetRole,
}
