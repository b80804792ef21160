//! Shared data model for the Mimeo engine.
//!
//! This crate holds the entity hierarchy, the per-pass resolution cache,
//! sample sets, and the API definitions (routes, bodies, persistence)
//! consumed by the resolver, formatter and simulator crates.

pub mod api;
pub mod cache;
pub mod entity;
pub mod error;
pub mod index;
pub mod persist;
pub mod resolved;
pub mod route;
pub mod sample;

pub use api::{Api, ApiBody, ApiService, Method};
pub use cache::Cache;
pub use entity::{Entity, EntityKind, NULL_VALUE, ValueType};
pub use error::{ModelError, Result};
pub use index::EntityIndex;
pub use persist::Persistence;
pub use resolved::{OBJ_PREFIX, Quoting, ResolvedValue};
pub use route::Route;
pub use sample::{Gender, Sample, Samples};
