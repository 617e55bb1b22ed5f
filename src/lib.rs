//! A small dynamically-typed language for numerical calculations.
//!
//! This crate compiles plain-text function definitions into executable Rust
//! closures. The language works on numbers and arbitrarily nested lists with
//! recursive elementwise broadcasting, supports Unicode operators (`√`, `·`,
//! `⌊ ⌋`, `| |`), calls between definitions, and solve statements that find
//! roots numerically with a Nelder-Mead minimizer.
//!
//! # Features
//!
//! - Incremental [`Registry`]: rescanning a source set recompiles only what
//!   changed, and hot-reloading a callee never recompiles its callers
//! - Host interop through [`GlobalEnvironment`] (injected variables) and
//!   [`HostSink`] (named output delivery)
//! - Positioned errors (`in function F (line L, col C): ...`) that never
//!   panic across the API boundary
//!
//! # Example
//!
//! ```rust
//! use mathscript::{InMemoryGlobals, Registry, Value};
//!
//! let mut registry = Registry::new();
//! registry.compile("escape_v", "in: mu\nin: r\nout: v\nv = √(2*mu/r)");
//!
//! let globals = InMemoryGlobals::new();
//! let result = registry
//!     .run_with(
//!         "escape_v",
//!         vec![Value::Number(3.5316e12), Value::Number(6.0e5)],
//!         &globals,
//!     )
//!     .unwrap();
//! assert!((result[0].as_number().unwrap() - 3431.03).abs() < 1.0);
//! ```

pub use errors::{EvalError, FunctionError, LexError, ParseError, SourcePos};
pub use function::Function;
pub use registry::{HostSink, Registry, ScanSummary, SourceEntry, SourceProvider};
pub use types::{Env, FunctionContext, GlobalEnvironment, InMemoryGlobals, NoFunctions};
pub use value::Value;

pub mod prelude {
    pub use crate::errors::{FunctionError, SourcePos};
    pub use crate::function::Function;
    pub use crate::registry::{HostSink, Registry, SourceEntry, SourceProvider};
    pub use crate::types::{GlobalEnvironment, InMemoryGlobals};
    pub use crate::value::Value;
}

/// Compilation of token streams into executable closures
pub mod builder;
/// The built-in function table and fixed constants
pub mod builtins;
/// Conversions from host numeric types into values
pub mod convert;
/// Error types for the various failure modes
pub mod errors;
/// Function definitions: header, body, error state
pub mod function;
/// The incrementally-scanned function registry
pub mod registry;
/// The Nelder-Mead minimizer behind solve statements
pub mod solver;
/// Tokens and the operator table
pub mod token;
/// The source-text tokenizer
pub mod tokenizer;
/// Closure aliases and the evaluation environment
pub mod types;
/// The dynamic value model and broadcasting
pub mod value;
/// Vector and matrix operations
pub mod vector_math;
