//! Loaders for Mimeo service definitions, raw JSON entities and
//! samples files.
//!
//! The service loader consumes an already-parsed `serde_json::Value`
//! tree so any configuration syntax that can be bridged to JSON works
//! as an input format.

pub mod error;
pub mod json;
pub mod samples;
pub mod service;

pub use error::{SchemaError, SchemaResult};
pub use json::{PersistRecord, entity_from_json, normalize_relaxed};
pub use samples::{FileSampleSource, SampleSource, parse_samples};
pub use service::{load_service, load_service_str};
