//! Attribute table schemas and schema reconciliation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::value::{PropertyMap, PropertyValue};

/// Column name reserved for the feature id; never part of a [`Schema`].
pub const RESERVED_ID_COLUMN: &str = "fid";

/// The storable type of one attribute column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// 64-bit signed integers.
    Integer,
    /// 64-bit floats.
    Float,
    /// Booleans.
    Boolean,
    /// UTF-8 text.
    Text,
}

impl FieldType {
    /// Stable lowercase name, as used on the remote wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named, typed attribute column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Column name, unique within its schema.
    pub name: String,
    /// Column type.
    pub field_type: FieldType,
}

impl FieldDef {
    /// Creates a column definition.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// An ordered attribute table schema.
///
/// Column order is significant: the cache file lays row values out in
/// schema order, and reconciliation rewrites the cache whenever the
/// remote order or column set changes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<FieldDef>,
}

impl Schema {
    /// Builds a schema, rejecting duplicate, empty and reserved names.
    pub fn new(fields: Vec<FieldDef>) -> Result<Self> {
        for (i, field) in fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(ModelError::EmptyColumnName);
            }
            if field.name == RESERVED_ID_COLUMN {
                return Err(ModelError::reserved_column(&field.name));
            }
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(ModelError::duplicate_column(&field.name));
            }
        }
        Ok(Self { fields })
    }

    /// The schema with no attribute columns.
    pub const fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    /// Borrows the columns in order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Looks a column up by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Position of a column within the schema.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Computes the migration needed to turn `self` into `target`.
    ///
    /// A column whose type changed is reported as dropped and re-added;
    /// its stored values are discarded rather than coerced.
    pub fn delta(&self, target: &Schema) -> SchemaDelta {
        let added = target
            .fields
            .iter()
            .filter(|t| self.field(&t.name).map(|f| f.field_type) != Some(t.field_type))
            .cloned()
            .collect();
        let dropped = self
            .fields
            .iter()
            .filter(|f| target.field(&f.name).map(|t| t.field_type) != Some(f.field_type))
            .map(|f| f.name.clone())
            .collect();
        SchemaDelta { added, dropped }
    }

    /// Lays an attribute map out in schema order.
    ///
    /// Missing columns and values of the wrong type become `Null`; names
    /// the schema does not know are dropped. The result always has
    /// exactly `self.len()` entries.
    pub fn conform(&self, properties: &PropertyMap) -> Vec<PropertyValue> {
        self.fields
            .iter()
            .map(|field| match properties.get(&field.name) {
                Some(value) if value.matches(field.field_type) => value.clone(),
                _ => PropertyValue::Null,
            })
            .collect()
    }

    /// Zips schema-ordered values back into a named map.
    ///
    /// Shorter inputs are padded with `Null`; longer inputs are cut off
    /// at the schema width.
    pub fn named_row(&self, values: Vec<PropertyValue>) -> PropertyMap {
        let mut values = values.into_iter();
        self.fields
            .iter()
            .map(|field| {
                (
                    field.name.clone(),
                    values.next().unwrap_or(PropertyValue::Null),
                )
            })
            .collect()
    }
}

/// The column changes required to migrate one schema to another.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaDelta {
    /// Columns to add, in target-schema order.
    pub added: Vec<FieldDef>,
    /// Names of columns to drop.
    pub dropped: Vec<String>,
}

impl SchemaDelta {
    /// True when no migration is needed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.dropped.is_empty()
    }
}
