use thiserror::Error;

/// Errors raised while loading a service definition or its data files.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The entity section is malformed.
    #[error("{0}")]
    Entity(String),
    /// The alias section is malformed.
    #[error("{0}")]
    Alias(String),
    /// The api section is malformed.
    #[error("{0}")]
    Api(String),
    /// A samples file is malformed.
    #[error("samples '{name}': {reason}")]
    Samples { name: String, reason: String },
    /// A raw JSON document could not be turned into an entity.
    #[error("invalid json entity '{name}': {reason}")]
    JsonEntity { name: String, reason: String },
    #[error(transparent)]
    Model(#[from] mimeo_model::ModelError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type SchemaResult<T> = std::result::Result<T, SchemaError>;
