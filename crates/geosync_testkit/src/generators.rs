//! Property-based test generators.

use geosync_model::{FeatureId, FeatureRow, Geometry, PropertyMap, PropertyValue};
use proptest::prelude::*;

use crate::data::point_wkb;

/// Strategy for one attribute value of any type.
pub fn property_value_strategy() -> impl Strategy<Value = PropertyValue> {
    prop_oneof![
        Just(PropertyValue::Null),
        any::<bool>().prop_map(PropertyValue::Bool),
        any::<i64>().prop_map(PropertyValue::Int),
        any::<f64>()
            .prop_filter("finite floats compare by value", |f| f.is_finite())
            .prop_map(PropertyValue::Float),
        "[a-z ]{0,32}".prop_map(PropertyValue::Text),
    ]
}

/// Strategy for an attribute map with distinct lowercase names.
pub fn property_map_strategy() -> impl Strategy<Value = PropertyMap> {
    proptest::collection::btree_map("[a-z]{1,12}", property_value_strategy(), 0..8)
        .prop_map(|entries| entries.into_iter().collect())
}

/// Strategy for a full feature row with ids drawn from `ids`.
pub fn feature_row_strategy(
    ids: impl Strategy<Value = u64> + 'static,
) -> impl Strategy<Value = FeatureRow> {
    (ids, any::<(f64, f64)>(), property_map_strategy()).prop_map(|(id, (x, y), properties)| {
        FeatureRow::new(
            FeatureId::new(id),
            Geometry::from_wkb(point_wkb(x, y)),
            properties,
        )
    })
}
