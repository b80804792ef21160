//! Value resolution, template functions and output formatting.
//!
//! The resolver walks value templates for embedded `func.NAME(...)`
//! calls and evaluates them through the function registry; the
//! formatter turns entity hierarchies into JSON, SQL or CSV output.

pub mod error;
pub mod formatter;
pub mod funcs;
pub mod resolver;

pub use error::{EngineError, EngineResult};
pub use formatter::Formatter;
pub use funcs::{FuncContext, FuncRegistry, FuncValue, TemplateFn};
pub use resolver::Resolver;
