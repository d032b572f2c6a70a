#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Test utilities for geosync.
//!
//! This crate provides:
//! - [`MemoryRemote`]: a scriptable in-memory remote vector service
//!   with call counting and one-shot failure injection
//! - Deterministic sample data builders in [`data`]
//! - Temporary cache store fixtures in [`fixtures`]
//! - Property-based generators in [`generators`]

pub mod data;
pub mod fixtures;
pub mod generators;
pub mod remote;

pub use data::{feature_row, new_feature, point_wkb, trail_properties, trail_schema};
pub use fixtures::{with_temp_store, TempStore};
pub use remote::{CallCounts, MemoryRemote};
