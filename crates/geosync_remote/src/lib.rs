#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Interface to the remote vector service.
//!
//! This crate defines what the rest of geosync knows about the remote
//! side: the [`RemoteVectorClient`] trait, the types its calls exchange,
//! and the error taxonomy. It deliberately contains no transport code;
//! concrete HTTP or test implementations live elsewhere and plug in
//! through the trait.

mod client;
mod error;
mod types;

pub use client::RemoteVectorClient;
pub use error::{RemoteError, Result};
pub use types::{AttributeChange, DatasetDiff, GeometryChange};
