//! Extract, load and aggregate Citi Bike trip data
//!
//! Monthly trip archives are downloaded, bulk-loaded into fact tables and
//! folded into a running count of trips per directional station pair.

pub mod config;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod source;

pub use error::{Error, Result};
