//! End-to-end tests driving the public API the way a host would: register
//! sources, scan, inject globals, run, read named outputs.

use std::collections::HashMap;
use std::io;
use std::time::{Duration, SystemTime};

use mathscript::{
    EvalError, FunctionError, HostSink, InMemoryGlobals, ParseError, Registry, ScanSummary,
    SourceEntry, SourceProvider, Value,
};

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
            None => Err(io::Error::new(io::ErrorKind::NotFound, "missing")),
        }
    }
}

fn expr(source: &str) -> Value {
    let registry = Registry::new();
    let globals = InMemoryGlobals::new();
    registry.run_expression(source, &globals).unwrap()
}

fn num(source: &str) -> f64 {
    expr(source).as_number().unwrap()
}

#[test]
fn arithmetic_and_unicode_operators() {
    assert_eq!(num("1 + 2 * 3"), 7.0);
    assert_eq!(num("2·3 + 4×5"), 26.0);
    assert_eq!(num("7 ÷ 2"), 3.5);
    assert_eq!(num("√9 + ⌊2.9⌋ + ⌈0.1⌉ + |0 - 1|"), 7.0);
}

#[test]
fn dual_arity_resolution() {
    assert_eq!(num("-3"), -3.0);
    assert_eq!(num("2 - 3"), -1.0);
    assert_eq!(num("2 - -3"), 5.0);
    assert_eq!(num("√9"), 3.0);
    // Binary √ takes the left operand as the root degree.
    assert!((num("2√9") - 3.0).abs() < 1e-12);
    assert!((num("3√27") - 3.0).abs() < 1e-12);
}

#[test]
fn equal_precedence_applies_rightmost_first() {
    assert_eq!(num("2-3-4"), 3.0);
    assert_eq!(num("16/4/2"), 8.0);
}

#[test]
fn deferred_calls_group_like_multiplication() {
    // sin x * y means sin(x*y); sin x + y means sin(x) + y.
    assert_eq!(num("cos 0 + 1"), 2.0);
    assert_eq!(num("cos 0 * 0"), 1.0);
}

#[test]
fn broadcasting() {
    assert_eq!(expr("[1, 2, 3] * 2"), Value::from(vec![2.0, 4.0, 6.0]));
    assert_eq!(expr("[1, 2] + [10, 20]"), Value::from(vec![11.0, 22.0]));
    assert_eq!(expr("abs([-1, [2, -3]])").to_string(), "[1, [2, 3]]");
    let registry = Registry::new();
    let globals = InMemoryGlobals::new();
    let err = registry
        .run_expression("[1, 2] + [1, 2, 3]", &globals)
        .unwrap_err();
    assert!(matches!(
        err,
        FunctionError::Eval(EvalError::UnequalListSizes { .. })
    ));
}

#[test]
fn vector_builtins() {
    assert_eq!(num("mag([3, 4])"), 5.0);
    assert_eq!(num("dot([1, 2, 3], [4, 5, 6])"), 32.0);
    assert_eq!(expr("cross([1,0,0], [0,1,0])"), Value::from(vec![0.0, 0.0, 1.0]));
    assert_eq!(num("len([1, [2, 3], 4])"), 3.0);
}

#[test]
fn globals_refresh_between_runs_without_recompiling() {
    let mut registry = Registry::new();
    registry.compile("twice", "y = Altitude * 2");

    let mut globals = InMemoryGlobals::new();
    globals.set("Altitude", Value::Number(10.0));
    assert_eq!(
        registry.run("twice", &globals).unwrap(),
        vec![Value::Number(20.0)]
    );

    globals.set("Altitude", Value::Number(50.0));
    assert_eq!(
        registry.run("twice", &globals).unwrap(),
        vec![Value::Number(100.0)]
    );
}

#[test]
fn undefined_names_carry_positions() {
    let mut registry = Registry::new();
    registry.compile("f", "a = 1\nb = bogus + 1");
    let globals = InMemoryGlobals::new();
    let err = registry.run("f", &globals).unwrap_err();
    assert_eq!(
        err.to_string(),
        "in function f (line 2, col 5): variable or function bogus is not defined"
    );
}

#[test]
fn solve_statements_find_roots() {
    let mut registry = Registry::new();
    // Kepler-style: solve E - e*sin(E) = M for E near M.
    registry.compile(
        "kepler",
        "in: M\nin: ecc\nout: E\nE = M\nE : E - ecc*sin(E) = M",
    );
    let globals = InMemoryGlobals::new();
    let result = registry
        .run_with(
            "kepler",
            vec![Value::Number(1.0), Value::Number(0.1)],
            &globals,
        )
        .unwrap();
    let e_anomaly = result[0].as_number().unwrap();
    assert!(
        (e_anomaly - 0.1 * e_anomaly.sin() - 1.0).abs() < 1e-6,
        "E = {e_anomaly}"
    );
}

#[test]
fn solve_multiple_variables() {
    let mut registry = Registry::new();
    registry.compile(
        "meet",
        "x = 0.5\ny = 0.5\nx, y : [x + y - 3, (x - y) - 1]\nout: x\nout: y",
    );
    // out: after the body is not header syntax; expect a parse failure.
    let globals = InMemoryGlobals::new();
    assert!(registry.run("meet", &globals).is_err());

    registry.compile(
        "meet",
        "out: x\nout: y\nx = 0.5\ny = 0.5\nx, y : [x + y - 3, (x - y) - 1]",
    );
    let result = registry.run("meet", &globals).unwrap();
    let x = result[0].as_number().unwrap();
    let y = result[1].as_number().unwrap();
    assert!((x - 2.0).abs() < 1e-5, "x = {x}");
    assert!((y - 1.0).abs() < 1e-5, "y = {y}");
}

#[test]
fn user_functions_compose() {
    let mut provider = MapProvider::new();
    provider.put("circumference", "in: r\nc = 2*pi*r", 1);
    provider.put("ratio", "in: r\nk = circumference(r) / r", 1);

    let mut registry = Registry::new();
    assert_eq!(
        registry.scan(&provider),
        ScanSummary { added: 2, updated: 0, removed: 0 }
    );

    let globals = InMemoryGlobals::new();
    let result = registry
        .run_with("ratio", vec![Value::Number(3.0)], &globals)
        .unwrap();
    assert!((result[0].as_number().unwrap() - std::f64::consts::TAU).abs() < 1e-12);
}

#[test]
fn rescan_recompiles_only_what_changed() {
    let mut provider = MapProvider::new();
    provider.put("a", "x = 1", 1);
    provider.put("b", "x = 2", 1);

    let mut registry = Registry::new();
    registry.scan(&provider);
    assert_eq!(registry.scan(&provider), ScanSummary::default());

    provider.put("b", "x = 20", 2);
    assert_eq!(
        registry.scan(&provider),
        ScanSummary { added: 0, updated: 1, removed: 0 }
    );
    let globals = InMemoryGlobals::new();
    assert_eq!(registry.run("b", &globals).unwrap(), vec![Value::Number(20.0)]);
}

#[test]
fn broken_definition_keeps_reporting_until_fixed() {
    let mut provider = MapProvider::new();
    provider.put("broken", "x = 1 +", 1);

    let mut registry = Registry::new();
    registry.scan(&provider);
    let globals = InMemoryGlobals::new();
    assert!(registry.run("broken", &globals).is_err());
    assert!(registry.run("broken", &globals).is_err());
    assert!(registry.get("broken").unwrap().in_error());

    provider.put("broken", "x = 1 + 1", 2);
    registry.scan(&provider);
    assert_eq!(
        registry.run("broken", &globals).unwrap(),
        vec![Value::Number(2.0)]
    );
}

#[test]
fn maneuver_outputs_reach_the_sink() {
    #[derive(Default)]
    struct Sink(Vec<(String, Value)>);
    impl HostSink for Sink {
        fn accept(&mut self, name: &str, value: &Value) {
            self.0.push((name.to_string(), value.clone()));
        }
    }

    let mut registry = Registry::new();
    registry.compile(
        "burn",
        "in: dv \"total delta-v\"\nmaneuver: node\nalarm: t\nnode = [dv, 0, 0]\nt = 60",
    );
    let f = registry.get("burn").unwrap();
    assert_eq!(f.maneuver_outputs(), ["node"]);
    assert_eq!(f.alarm_outputs(), ["t"]);
    assert_eq!(f.in_descriptions(), [Some("total delta-v".to_string())]);

    let globals = InMemoryGlobals::new();
    let mut sink = Sink::default();
    registry
        .run_into("burn", vec![Value::Number(250.0)], &globals, &mut sink)
        .unwrap();
    assert_eq!(sink.0.len(), 2);
    assert_eq!(sink.0[0], ("node".to_string(), Value::from(vec![250.0, 0.0, 0.0])));
    assert_eq!(sink.0[1], ("t".to_string(), Value::Number(60.0)));
}

#[test]
fn piecewise_syntax_is_reserved() {
    let mut registry = Registry::new();
    registry.compile("pw", "y ={ 1 if x\n2 otherwise }");
    let globals = InMemoryGlobals::new();
    let err = registry.run("pw", &globals).unwrap_err();
    assert!(matches!(
        err,
        FunctionError::Parse(ParseError::ReservedConstruct { .. })
    ));
}

#[test]
fn line_continuations_and_comments() {
    let mut registry = Registry::new();
    registry.compile(
        "long",
        "# a very long sum\ny = 1 + \\\n    2 + \\\n    3 # inline note",
    );
    let globals = InMemoryGlobals::new();
    assert_eq!(registry.run("long", &globals).unwrap(), vec![Value::Number(6.0)]);
}

#[test]
fn dotted_global_identifiers() {
    let mut registry = Registry::new();
    registry.compile("apo", "y = Craft.Apoapsis / 1000");
    let mut globals = InMemoryGlobals::new();
    globals.set("Craft.Apoapsis", Value::Number(80_000.0));
    assert_eq!(registry.run("apo", &globals).unwrap(), vec![Value::Number(80.0)]);
}

#[test]
fn constants() {
    assert_eq!(num("pi"), std::f64::consts::PI);
    assert_eq!(num("π"), std::f64::consts::PI);
    assert_eq!(num("e"), std::f64::consts::E);
    assert!((num("G * 1e11") - 6.67384).abs() < 1e-12);
}
