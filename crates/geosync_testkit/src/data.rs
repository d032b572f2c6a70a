//! Deterministic sample data builders.

use geosync_model::{
    FeatureId, FeatureRow, FieldDef, FieldType, Geometry, NewFeature, PropertyMap, Schema,
};

/// Encodes a little-endian WKB point.
pub fn point_wkb(x: f64, y: f64) -> Vec<u8> {
    let mut wkb = Vec::with_capacity(21);
    wkb.push(0x01);
    wkb.extend_from_slice(&1u32.to_le_bytes());
    wkb.extend_from_slice(&x.to_le_bytes());
    wkb.extend_from_slice(&y.to_le_bytes());
    wkb
}

/// The schema used by most fixtures: a name, a length and a flag.
pub fn trail_schema() -> Schema {
    Schema::new(vec![
        FieldDef::new("name", FieldType::Text),
        FieldDef::new("length_km", FieldType::Float),
        FieldDef::new("open", FieldType::Boolean),
    ])
    .expect("fixture schema is valid")
}

/// Builds the attribute map for a given seed under [`trail_schema`].
pub fn trail_properties(seed: u64) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert("name", format!("trail-{seed}"));
    props.insert("length_km", (seed as f64) * 0.25);
    props.insert("open", seed % 2 == 0);
    props
}

/// Builds a deterministic feature row for `id`, with `seed` controlling
/// the payload so "same id, different content" scenarios are easy.
pub fn feature_row(id: u64, seed: u64) -> FeatureRow {
    FeatureRow::new(
        FeatureId::new(id),
        Geometry::from_wkb(point_wkb(seed as f64, -(seed as f64))),
        trail_properties(seed),
    )
}

/// Builds a deterministic insert candidate.
pub fn new_feature(seed: u64) -> NewFeature {
    NewFeature::new(
        Geometry::from_wkb(point_wkb(seed as f64, seed as f64 + 0.5)),
        trail_properties(seed),
    )
}
