use thiserror::Error;

/// Errors raised while resolving templates or formatting output.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Resolution failure, wrapped with the attribute being resolved.
    #[error("cannot resolve {name}: {message}")]
    Resolve { name: String, message: String },
    /// A `func.` fragment with no opening bracket.
    #[error("function 'func.{0}' has missing opening bracket")]
    MissingOpenBracket(String),
    /// A function call whose brackets never balance.
    #[error("function 'func.{0}' has missing closing bracket")]
    MissingCloseBracket(String),
    #[error("unknown function 'func.{name}(...)'. Must be one of: {known}")]
    UnknownFunction { name: String, known: String },
    /// A function rejected its arguments; `called` is the full call text.
    #[error("{called} {message}")]
    Func { called: String, message: String },
    /// A ref or repeat attribute points at a missing entity.
    #[error("attribute '{name}' has bad reference '{target}': {message}")]
    BadReference {
        name: String,
        target: String,
        message: String,
    },
    /// Entity nesting exceeded the formatter's depth limit.
    #[error("cannot format '{0}': structure is nested too deeply")]
    TooDeep(String),
    /// SQL/CSV output needs a flat entity.
    #[error("cannot format '{name}' as {format}: {reason}")]
    NotFlat {
        name: String,
        format: &'static str,
        reason: String,
    },
    #[error(transparent)]
    Model(#[from] mimeo_model::ModelError),
    #[error(transparent)]
    Schema(#[from] mimeo_schema::SchemaError),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
