#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Core data model shared by every geosync crate.
//!
//! The model crate is deliberately free of I/O: it defines the identifier
//! newtypes, the attribute schema and value types, and the feature row
//! structures that the cache, the remote client and the sync engine all
//! exchange. Everything here is plain data with `serde` derives so the
//! remote boundary can encode it without a second set of DTOs.
//!
//! # Layout
//!
//! - [`ids`]: `DatasetId`, `FeatureId` and `Timestamp` newtypes.
//! - [`geometry`]: geometry kind tags and WKB payload wrapper.
//! - [`value`]: dynamically typed attribute values and ordered maps.
//! - [`schema`]: attribute table schemas and schema reconciliation.
//! - [`row`]: feature rows as stored and as submitted for insert.
//! - [`dataset`]: remote dataset descriptors, extents and access roles.

pub mod dataset;
mod error;
pub mod geometry;
pub mod ids;
pub mod row;
pub mod schema;
pub mod value;

pub use dataset::{DatasetRole, Extent, RemoteDataset};
pub use error::{ModelError, Result};
pub use geometry::{Geometry, GeometryKind};
pub use ids::{DatasetId, FeatureId, Timestamp};
pub use row::{FeatureRow, NewFeature};
pub use schema::{FieldDef, FieldType, Schema, SchemaDelta, RESERVED_ID_COLUMN};
pub use value::{PropertyMap, PropertyValue};
