//! Error types for the mathscript crate.
//!
//! This module defines the failure modes of the language pipeline:
//!
//! - `LexError`: illegal input encountered while tokenizing source text
//! - `ParseError`: structural problems found while compiling a function body
//! - `EvalError`: dynamic failures raised while executing a compiled function
//! - `FunctionError`: the high-level wrapper exposed on the execution surface
//!
//! Every error carries a [`SourcePos`] where one is available, so messages come
//! out as `in function F (line L, col C): ...`. Errors never cross the public
//! execution boundary as panics; a function that fails to compile is kept in a
//! permanent error state and re-reports the same message until its source
//! changes (see [`crate::registry::Registry`]).

use std::fmt;

use thiserror::Error;

/// A 1-based position inside a named source definition.
///
/// Formats as the diagnostic prefix `in function F (line L, col C): `, which is
/// how every positioned error message in this crate starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePos {
    /// Identifier of the function definition the position refers to.
    pub source: String,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub col: u32,
}

impl SourcePos {
    pub fn new(source: impl Into<String>, line: u32, col: u32) -> Self {
        Self {
            source: source.into(),
            line,
            col,
        }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "in function {} (line {}, col {}): ",
            self.source, self.line, self.col
        )
    }
}

/// Errors raised while tokenizing source text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexError {
    /// A character that cannot extend the token currently being scanned.
    #[error("{pos}illegal character '{ch}'")]
    IllegalChar { ch: char, pos: SourcePos },
    /// A quoted description that is still open at the end of the input.
    #[error("{pos}unterminated quoted string")]
    UnterminatedString { pos: SourcePos },
    /// A second decimal point inside one number literal.
    #[error("{pos}number contains more than one decimal point")]
    DuplicateDecimalPoint { pos: SourcePos },
}

/// Errors raised while compiling a token stream into executable closures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// A token that cannot appear at this point of the grammar.
    #[error("{pos}unexpected {found}, expected {expected}")]
    UnexpectedToken {
        expected: String,
        found: String,
        pos: SourcePos,
    },
    /// The token stream ended in the middle of a construct.
    #[error("in function {function}: unexpected end of expression")]
    UnexpectedEnd { function: String },
    /// An opening brace without its matching closer.
    #[error("{pos}expected '{expected}'")]
    MissingCloser { expected: char, pos: SourcePos },
    /// Operand/operator counts do not form a single expression.
    #[error("{pos}malformed expression")]
    MalformedExpression { pos: SourcePos },
    /// A number token that does not parse as a floating point value.
    #[error("{pos}invalid number '{text}'")]
    InvalidNumber { text: String, pos: SourcePos },
    /// `[]` — list literals must contain at least one element.
    #[error("{pos}empty lists are not allowed")]
    EmptyList { pos: SourcePos },
    /// A function body without any statements.
    #[error("in function {function}: function does not contain any statements")]
    EmptyFunction { function: String },
    /// Piecewise blocks and `if`/`otherwise` are tokenized but not evaluated.
    #[error("{pos}'{construct}' is reserved and not supported here")]
    ReservedConstruct { construct: String, pos: SourcePos },
    /// Wrong number of arguments against a fixed-arity function.
    #[error("{pos}function {name} takes {expected} argument(s), but {got} were supplied")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
        pos: SourcePos,
    },
    /// An operator symbol with no entry in the operator table.
    #[error("{pos}unknown operator '{symbol}'")]
    UnknownOperator { symbol: String, pos: SourcePos },
}

/// Errors raised while executing a compiled function.
///
/// These are per-call: they are returned to the caller and do not put the
/// function into a persistent error state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// An identifier that matched no local, global, sibling function or built-in.
    #[error("{pos}variable or function {name} is not defined")]
    UndefinedVariable { name: String, pos: SourcePos },
    /// A call through the registry to a name that is not registered.
    #[error("{pos}unknown function: {name}")]
    UnknownFunction { name: String, pos: SourcePos },
    /// Elementwise pairing of two lists with different lengths.
    #[error("{pos}trying to perform a binary operation on lists of unequal size")]
    UnequalListSizes { pos: SourcePos },
    /// A value whose shape does not fit the operation.
    #[error("{pos}{message}")]
    TypeMismatch { message: String, pos: SourcePos },
    /// Multi-assignment against an expression of the wrong length.
    #[error("{pos}expression needed to yield {expected} values, but yielded {got}")]
    MultiAssignCount {
        expected: usize,
        got: usize,
        pos: SourcePos,
    },
    /// Wrong number of positional arguments passed to a function call.
    #[error("{pos}function {name} takes {expected} argument(s), but {got} were supplied")]
    ArgumentCount {
        name: String,
        expected: usize,
        got: usize,
        pos: SourcePos,
    },
    /// A declared output that the body never assigned.
    #[error("in function {function}: output variable {name} is not defined by the function")]
    OutputNotDefined { function: String, name: String },
    /// A solve objective that reduced to a nested list (no defined norm).
    #[error("{pos}solve objective must yield a number or a flat numeric list")]
    NonScalarObjective { pos: SourcePos },
    /// A user-function call that failed inside the callee.
    #[error("{pos}call to {name} failed: {message}")]
    CallFailed {
        name: String,
        message: String,
        pos: SourcePos,
    },
}

/// High-level errors exposed on the execution surface.
///
/// Compile-time variants (`Lex`, `Parse`) are stored on the function and
/// re-reported on every call until the source recompiles cleanly; `Eval` is
/// produced per call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FunctionError {
    /// The source text failed to tokenize.
    #[error(transparent)]
    Lex(#[from] LexError),
    /// The token stream failed to compile.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The compiled function failed at run time.
    #[error(transparent)]
    Eval(#[from] EvalError),
    /// The source could not be obtained from the provider.
    #[error("function {id} could not be read: {message}")]
    SourceUnavailable { id: String, message: String },
}
