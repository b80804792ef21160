use thiserror::Error;

use mimeo_engine::EngineError;

/// Errors from a simulated call. `NotFound` and `BadRequest` are the
/// two classes a host maps onto response statuses; everything else is
/// an internal failure of the current operation.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Model(#[from] mimeo_model::ModelError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type SimResult<T> = std::result::Result<T, SimError>;
