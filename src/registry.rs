//! The function registry: an incrementally maintained map of definitions.
//!
//! A [`Registry`] holds every known [`Function`] keyed by identifier and keeps
//! itself up to date against a [`SourceProvider`] with [`Registry::scan`]: new
//! definitions are compiled, missing ones dropped, and an existing definition
//! is recompiled only when the provider reports a newer modification time.
//! An unchanged rescan therefore compiles nothing.
//!
//! The registry is also the [`FunctionContext`] compiled bodies call through,
//! which is what makes hot reloading work: a caller holds only its callee's
//! name, so replacing the callee on the next scan changes what the caller
//! runs without recompiling it.

use std::collections::BTreeMap;
use std::io;
use std::time::SystemTime;

use itertools::{merge_join_by, EitherOrBoth};
use log::{debug, info};

use crate::builder;
use crate::errors::{EvalError, FunctionError, SourcePos};
use crate::function::Function;
use crate::tokenizer::tokenize;
use crate::types::{Env, FunctionContext, GlobalEnvironment};
use crate::value::Value;

/// One definition a [`SourceProvider`] can supply.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub id: String,
    pub modified: SystemTime,
}

/// Where function definitions come from: a directory of `.math` files, an
/// in-game text archive, an in-memory map in tests.
pub trait SourceProvider {
    /// Every currently available definition, in any order.
    fn list(&self) -> Vec<SourceEntry>;

    /// The source text of one definition.
    fn read(&self, id: &str) -> io::Result<String>;
}

/// Receives named outputs after a run; hosts use this to place maneuver
/// nodes, set alarms, or display results.
pub trait HostSink {
    fn accept(&mut self, name: &str, value: &Value);
}

/// What a [`Registry::scan`] did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

struct Entry {
    function: Function,
    modified: SystemTime,
}

/// The set of compiled function definitions.
#[derive(Default)]
pub struct Registry {
    functions: BTreeMap<String, Entry>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Compiles `source` and registers it under `id`, replacing any previous
    /// definition. Used by hosts that manage sources themselves.
    pub fn compile(&mut self, id: impl Into<String>, source: &str) {
        let id = id.into();
        let function = Function::new(&id, source);
        self.functions.insert(
            id,
            Entry {
                function,
                modified: SystemTime::now(),
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<&Function> {
        self.functions.get(id).map(|e| &e.function)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Reconciles the registry against the provider's current listing.
    ///
    /// The listing and the registry are both walked in identifier order, so
    /// the merge visits each side once. A definition whose source fails to
    /// read still registers, in an error state that names the read failure.
    pub fn scan(&mut self, provider: &dyn SourceProvider) -> ScanSummary {
        let mut listing = provider.list();
        listing.sort_by(|a, b| a.id.cmp(&b.id));

        let known: Vec<(String, SystemTime)> = self
            .functions
            .iter()
            .map(|(id, e)| (id.clone(), e.modified))
            .collect();

        let mut summary = ScanSummary::default();
        for merged in merge_join_by(listing, known, |l, (id, _)| l.id.cmp(id)) {
            match merged {
                EitherOrBoth::Left(entry) => {
                    debug!("new function {}", entry.id);
                    self.load(provider, entry);
                    summary.added += 1;
                }
                EitherOrBoth::Both(entry, (_, modified)) => {
                    if entry.modified > modified {
                        debug!("reloading function {}", entry.id);
                        self.load(provider, entry);
                        summary.updated += 1;
                    }
                }
                EitherOrBoth::Right((id, _)) => {
                    debug!("dropping function {id}");
                    self.functions.remove(&id);
                    summary.removed += 1;
                }
            }
        }

        info!(
            "scan: {} added, {} updated, {} removed, {} total",
            summary.added,
            summary.updated,
            summary.removed,
            self.functions.len()
        );
        summary
    }

    fn load(&mut self, provider: &dyn SourceProvider, entry: SourceEntry) {
        let function = match provider.read(&entry.id) {
            Ok(source) => Function::new(&entry.id, &source),
            Err(e) => Function::unavailable(&entry.id, e.to_string()),
        };
        self.functions.insert(
            entry.id,
            Entry {
                function,
                modified: entry.modified,
            },
        );
    }

    /// Runs a function that takes no inputs.
    pub fn run(
        &self,
        id: &str,
        globals: &dyn GlobalEnvironment,
    ) -> Result<Vec<Value>, FunctionError> {
        self.run_with(id, Vec::new(), globals)
    }

    /// Runs a function with positional arguments.
    pub fn run_with(
        &self,
        id: &str,
        args: Vec<Value>,
        globals: &dyn GlobalEnvironment,
    ) -> Result<Vec<Value>, FunctionError> {
        let function = self.get(id).ok_or_else(|| EvalError::UnknownFunction {
            name: id.to_string(),
            pos: SourcePos::new(id, 1, 1),
        })?;
        function.execute(args, globals, self)
    }

    /// Runs a function and delivers each named output to the sink.
    pub fn run_into(
        &self,
        id: &str,
        args: Vec<Value>,
        globals: &dyn GlobalEnvironment,
        sink: &mut dyn HostSink,
    ) -> Result<Vec<Value>, FunctionError> {
        let results = self.run_with(id, args, globals)?;
        let names = self
            .get(id)
            .map(Function::output_names)
            .unwrap_or_default();
        for (name, value) in names.iter().zip(&results) {
            sink.accept(name, value);
        }
        Ok(results)
    }

    /// Compiles and evaluates a bare expression (no header, no statements)
    /// against the registered functions and the given globals.
    pub fn run_expression(
        &self,
        source: &str,
        globals: &dyn GlobalEnvironment,
    ) -> Result<Value, FunctionError> {
        let mut tokens = tokenize(source, "expression")?;
        let expr = builder::compile_expression(&mut tokens, "expression", self)?;
        let mut env = Env::new(globals, self);
        Ok(expr(&mut env)?)
    }
}

impl FunctionContext for Registry {
    fn arity_of(&self, name: &str) -> Option<usize> {
        self.get(name).map(|f| f.ins().len())
    }

    fn call(
        &self,
        name: &str,
        args: Vec<Value>,
        globals: &dyn GlobalEnvironment,
        pos: &SourcePos,
    ) -> Result<Value, EvalError> {
        let function = self.get(name).ok_or_else(|| EvalError::UnknownFunction {
            name: name.to_string(),
            pos: pos.clone(),
        })?;
        let mut results =
            function
                .execute(args, globals, self)
                .map_err(|e| EvalError::CallFailed {
                    name: name.to_string(),
                    message: e.to_string(),
                    pos: pos.clone(),
                })?;
        // A single output flows through as-is; several fold into one list,
        // ready for a multi-assignment on the caller's side.
        if results.len() == 1 {
            Ok(results.pop().unwrap())
        } else {
            Ok(Value::List(results))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::types::InMemoryGlobals;

    struct MapProvider {
        sources: HashMap<String, (String, SystemTime)>,
    }

    impl MapProvider {
        fn new() -> MapProvider {
            MapProvider {
                sources: HashMap::new(),
            }
        }

        fn put(&mut self, id: &str, source: &str, stamp: u64) {
            self.sources.insert(
                id.to_string(),
                (
                    source.to_string(),
                    SystemTime::UNIX_EPOCH + Duration::from_secs(stamp),
                ),
            );
        }
    }

    impl SourceProvider for MapProvider {
        fn list(&self) -> Vec<SourceEntry> {
            self.sources
                .iter()
                .map(|(id, (_, modified))| SourceEntry {
                    id: id.clone(),
                    modified: *modified,
                })
                .collect()
        }

        fn read(&self, id: &str) -> io::Result<String> {
            match self.sources.get(id) {
                Some((source, _)) => Ok(source.clone()),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "no such function")),
            }
        }
    }

    #[derive(Default)]
    struct Collect(Vec<(String, Value)>);

    impl HostSink for Collect {
        fn accept(&mut self, name: &str, value: &Value) {
            self.0.push((name.to_string(), value.clone()));
        }
    }

    #[test]
    fn scan_adds_and_rescan_is_idle() {
        let mut provider = MapProvider::new();
        provider.put("double", "in: x\ny = x*2", 10);
        provider.put("quad", "in: x\ny = double(double(x))", 10);

        let mut registry = Registry::new();
        let first = registry.scan(&provider);
        assert_eq!(first, ScanSummary { added: 2, updated: 0, removed: 0 });
        assert_eq!(registry.scan(&provider), ScanSummary::default());

        let globals = InMemoryGlobals::new();
        let result = registry
            .run_with("quad", vec![Value::Number(3.0)], &globals)
            .unwrap();
        assert_eq!(result, vec![Value::Number(12.0)]);
    }

    #[test]
    fn hot_reload_changes_callers_behavior() {
        let mut provider = MapProvider::new();
        provider.put("helper", "in: x\ny = x + 1", 10);
        provider.put("caller", "in: x\ny = helper(x)", 10);

        let mut registry = Registry::new();
        registry.scan(&provider);
        let globals = InMemoryGlobals::new();
        assert_eq!(
            registry.run_with("caller", vec![Value::Number(1.0)], &globals).unwrap(),
            vec![Value::Number(2.0)]
        );

        // Replace the callee only; the caller is not recompiled.
        provider.put("helper", "in: x\ny = x + 100", 20);
        let summary = registry.scan(&provider);
        assert_eq!(summary, ScanSummary { added: 0, updated: 1, removed: 0 });
        assert_eq!(
            registry.run_with("caller", vec![Value::Number(1.0)], &globals).unwrap(),
            vec![Value::Number(101.0)]
        );
    }

    #[test]
    fn removed_sources_drop_out() {
        let mut provider = MapProvider::new();
        provider.put("a", "x = 1", 10);
        provider.put("b", "x = 2", 10);

        let mut registry = Registry::new();
        registry.scan(&provider);
        provider.sources.remove("a");
        let summary = registry.scan(&provider);
        assert_eq!(summary, ScanSummary { added: 0, updated: 0, removed: 1 });
        assert!(registry.get("a").is_none());
        assert!(registry.get("b").is_some());
    }

    #[test]
    fn deferred_user_calls_resolve_across_scan_order() {
        // "alpha" calls "zeta", which sorts after it; the arity is still
        // known when alpha's body compiles because compilation is lazy.
        let mut provider = MapProvider::new();
        provider.put("alpha", "y = zeta 3", 10);
        provider.put("zeta", "in: x\ny = x^2", 10);

        let mut registry = Registry::new();
        registry.scan(&provider);
        let globals = InMemoryGlobals::new();
        assert_eq!(
            registry.run("alpha", &globals).unwrap(),
            vec![Value::Number(9.0)]
        );
    }

    #[test]
    fn multi_output_callee_unpacks_in_caller() {
        let mut registry = Registry::new();
        registry.compile("pair", "out: a\nout: b\na = 1\nb = 2");
        registry.compile("sum", "x, y = pair()\ns = x + y");
        let globals = InMemoryGlobals::new();
        assert_eq!(
            registry.run("sum", &globals).unwrap(),
            vec![Value::Number(3.0)]
        );
    }

    #[test]
    fn run_into_delivers_named_outputs() {
        let mut registry = Registry::new();
        registry.compile("node", "maneuver: dv\ndv = [1, 2, 3]");
        let globals = InMemoryGlobals::new();
        let mut sink = Collect::default();
        registry
            .run_into("node", vec![], &globals, &mut sink)
            .unwrap();
        assert_eq!(
            sink.0,
            vec![("dv".to_string(), Value::from(vec![1.0, 2.0, 3.0]))]
        );
        assert_eq!(registry.get("node").unwrap().maneuver_outputs(), ["dv"]);
    }

    #[test]
    fn run_expression_uses_registered_functions() {
        let mut registry = Registry::new();
        registry.compile("double", "in: x\ny = x*2");
        let mut globals = InMemoryGlobals::new();
        globals.set("Altitude", Value::Number(21.0));
        assert_eq!(
            registry.run_expression("double(Altitude) / 2", &globals).unwrap(),
            Value::Number(21.0)
        );
        assert_eq!(
            registry.run_expression("1 + 2", &globals).unwrap(),
            Value::Number(3.0)
        );
    }

    #[test]
    fn unknown_function() {
        let registry = Registry::new();
        let globals = InMemoryGlobals::new();
        assert!(matches!(
            registry.run("missing", &globals),
            Err(FunctionError::Eval(EvalError::UnknownFunction { .. }))
        ));
    }

    #[test]
    fn unreadable_source_registers_in_error_state() {
        struct Phantom;
        impl SourceProvider for Phantom {
            fn list(&self) -> Vec<SourceEntry> {
                vec![SourceEntry {
                    id: "ghost".to_string(),
                    modified: SystemTime::UNIX_EPOCH,
                }]
            }
            fn read(&self, _id: &str) -> io::Result<String> {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
            }
        }

        let mut registry = Registry::new();
        registry.scan(&Phantom);
        let f = registry.get("ghost").unwrap();
        assert!(f.in_error());
        assert!(f.error_string().contains("locked"));
    }

    #[test]
    fn callee_failure_is_reported_at_the_call_site() {
        let mut registry = Registry::new();
        registry.compile("bad", "y = nope + 1");
        registry.compile("top", "y = bad()");
        let globals = InMemoryGlobals::new();
        let err = registry.run("top", &globals).unwrap_err();
        assert!(matches!(
            err,
            FunctionError::Eval(EvalError::CallFailed { .. })
        ));
        assert!(err.to_string().contains("nope"));
    }
}
