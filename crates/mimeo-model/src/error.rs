use thiserror::Error;

/// Error type shared by the Mimeo model crates.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Entity lookup failed.
    #[error("{0}: not found")]
    EntityNotFound(String),
    /// A chain of references never reached a concrete entity.
    #[error("cannot resolve entity '{0}' as it contains a circular reference")]
    CircularReference(String),
    /// An attribute was re-entered while it was still being resolved.
    #[error("cannot resolve '{0}' as it has a circular dependency")]
    CircularDependency(String),
    /// A cache lookup for a concrete value failed.
    #[error("attribute '{0}' not found")]
    AttributeNotFound(String),
    /// A value was read before it had been resolved.
    #[error("attribute '{0}' has not been resolved")]
    Unresolved(String),
    /// A parent entity defines the same attribute twice.
    #[error("{parent} defines attribute {child} multiple times")]
    DuplicateChild { parent: String, child: String },
    /// Children were added to a scalar, or a value to a container.
    #[error("invalid entity '{name}': {reason}")]
    InvalidEntity { name: String, reason: String },
    /// A `[name, count]` repeating reference is malformed.
    #[error("repeating entity '{def}' error - {reason}")]
    BadRepeat { def: String, reason: String },
    /// An API body definition is malformed.
    #[error("invalid api body '{def}': {reason}")]
    BadBody { def: String, reason: String },
    /// A persistence template is malformed.
    #[error("persist definition '{def}' is invalid: {reason}")]
    BadPersist { def: String, reason: String },
    /// A persistence variable matched nothing in scope.
    #[error("persist definition '{def}' variable '{var}' does not match any known attribute")]
    PersistVar { def: String, var: String },
    /// Gender or rarity rules were violated for a sample set.
    #[error("invalid samples '{name}': {reason}")]
    BadSample { name: String, reason: String },
}

/// Convenience alias for results returned by the model crates.
pub type Result<T> = std::result::Result<T, ModelError>;
