//! API simulation: route dispatch, request ingestion, response
//! generation and the flat-file record store behind persisted routes.

pub mod error;
pub mod simulator;
pub mod store;

pub use error::{SimError, SimResult};
pub use simulator::Simulator;
pub use store::FileStore;
