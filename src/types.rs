//! Shared compile-target types and the per-call evaluation environment.
//!
//! A compiled function body is a sequence of [`CompiledStatement`] closures
//! built once and invoked many times. Each invocation owns a fresh [`Env`]
//! holding its local variables, so compiled functions may call each other
//! (and themselves) re-entrantly; the solver mutates the same `Env` while
//! re-evaluating its stored objective closure.
//!
//! Evaluation is strictly single-threaded by design, so compiled closures are
//! reference-counted with `Rc` and carry no `Send`/`Sync` bounds.

use std::collections::HashMap;
use std::rc::Rc;

use crate::errors::{EvalError, SourcePos};
use crate::value::Value;

/// A compiled sub-expression: evaluates to one value against an environment.
pub type CompiledExpr = Rc<dyn Fn(&mut Env<'_>) -> Result<Value, EvalError>>;

/// A compiled statement; yields the statement's value (the assigned value for
/// assignments, the solved point for solve statements).
pub type CompiledStatement = Rc<dyn Fn(&mut Env<'_>) -> Result<Value, EvalError>>;

/// Named bindings the host injects before a run (game state, orbital
/// quantities, ...). Consulted by compiled local-variable lookups after the
/// per-call locals, so host values refresh on every run without recompiling.
pub trait GlobalEnvironment {
    fn get(&self, identifier: &str) -> Option<Value>;
}

/// A simple map-backed [`GlobalEnvironment`] for hosts and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryGlobals {
    values: HashMap<String, Value>,
}

impl InMemoryGlobals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, identifier: impl Into<String>, value: Value) {
        self.values.insert(identifier.into(), value);
    }
}

impl GlobalEnvironment for InMemoryGlobals {
    fn get(&self, identifier: &str) -> Option<Value> {
        self.values.get(identifier).cloned()
    }
}

/// Resolves user-function calls by name at call time.
///
/// Compiled closures hold only the callee's name; the registry implements
/// this trait so a function can be hot-reloaded without recompiling its
/// callers, and so siblings need not be compiled before being referenced.
pub trait FunctionContext {
    /// Number of inputs of the named user function, or `None` if unknown.
    fn arity_of(&self, name: &str) -> Option<usize>;

    /// Executes the named user function with already-evaluated arguments.
    /// Multiple outputs are folded into a single list value.
    fn call(
        &self,
        name: &str,
        args: Vec<Value>,
        globals: &dyn GlobalEnvironment,
        pos: &SourcePos,
    ) -> Result<Value, EvalError>;
}

/// A [`FunctionContext`] with no user functions, for standalone expressions.
pub struct NoFunctions;

impl FunctionContext for NoFunctions {
    fn arity_of(&self, _name: &str) -> Option<usize> {
        None
    }

    fn call(
        &self,
        name: &str,
        _args: Vec<Value>,
        _globals: &dyn GlobalEnvironment,
        pos: &SourcePos,
    ) -> Result<Value, EvalError> {
        Err(EvalError::UnknownFunction {
            name: name.to_string(),
            pos: pos.clone(),
        })
    }
}

/// The per-call evaluation environment: one private local-variable map plus
/// shared references to the host globals and the function registry.
pub struct Env<'a> {
    locals: HashMap<String, Value>,
    pub globals: &'a dyn GlobalEnvironment,
    pub functions: &'a dyn FunctionContext,
}

impl<'a> Env<'a> {
    pub fn new(globals: &'a dyn GlobalEnvironment, functions: &'a dyn FunctionContext) -> Self {
        Self {
            locals: HashMap::new(),
            globals,
            functions,
        }
    }

    /// Looks up a local variable by name.
    pub fn local(&self, name: &str) -> Option<&Value> {
        self.locals.get(name)
    }

    /// Binds a local variable, replacing any previous value.
    pub fn set_local(&mut self, name: impl Into<String>, value: Value) {
        self.locals.insert(name.into(), value);
    }
}
