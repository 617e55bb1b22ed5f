//! A named function definition: header, compiled body, error state.
//!
//! Construction tokenizes the source and parses the `in:`/`out:` header
//! eagerly, so inputs, outputs and descriptions are available immediately and
//! a broken definition still registers with its error attached. The body
//! compiles once, on first execution, when the whole registry has been
//! scanned; compiled calls bind sibling names at run time, so definitions may
//! reference each other (and themselves) regardless of scan order.

use std::cell::OnceCell;
use std::collections::VecDeque;
use std::fmt;

use colored::Colorize;
use log::debug;

use crate::builder::{self, Statement};
use crate::errors::{EvalError, FunctionError, ParseError, SourcePos};
use crate::token::{Token, TokenKind};
use crate::tokenizer::tokenize;
use crate::types::{Env, FunctionContext, GlobalEnvironment};
use crate::value::Value;

/// A function definition compiled from `.math`-style source text.
pub struct Function {
    id: String,
    ins: Vec<String>,
    in_descriptions: Vec<Option<String>>,
    outs: Vec<String>,
    out_descriptions: Vec<Option<String>>,
    maneuver_outs: Vec<String>,
    alarm_outs: Vec<String>,
    body: VecDeque<Token>,
    compiled: OnceCell<Result<Vec<Statement>, ParseError>>,
    error: Option<FunctionError>,
}

impl Function {
    /// Parses `source` as the definition of function `id`.
    ///
    /// Always returns a `Function`: tokenizer and header errors are stashed in
    /// the error state and re-reported on every execution attempt, so a broken
    /// definition stays visible to the host instead of vanishing.
    pub fn new(id: impl Into<String>, source: &str) -> Function {
        let id = id.into();
        let mut f = Function {
            id: id.clone(),
            ins: Vec::new(),
            in_descriptions: Vec::new(),
            outs: Vec::new(),
            out_descriptions: Vec::new(),
            maneuver_outs: Vec::new(),
            alarm_outs: Vec::new(),
            body: VecDeque::new(),
            compiled: OnceCell::new(),
            error: None,
        };

        // The trailing newline terminates a last statement that lacks one.
        let mut text = source.to_string();
        text.push('\n');

        match tokenize(&text, &id) {
            Ok(tokens) => {
                f.body = tokens;
                if let Err(e) = f.parse_header() {
                    f.error = Some(e.into());
                } else if !f.body.iter().any(|t| t.kind != TokenKind::End) {
                    f.error = Some(
                        ParseError::EmptyFunction {
                            function: id.clone(),
                        }
                        .into(),
                    );
                }
            }
            Err(e) => f.error = Some(e.into()),
        }

        if let Some(e) = &f.error {
            debug!("function {id} failed to parse: {e}");
        }
        f
    }

    /// A placeholder for a definition whose source could not be read; it
    /// registers under `id` in a permanent error state.
    pub(crate) fn unavailable(id: impl Into<String>, message: impl Into<String>) -> Function {
        let id = id.into();
        let mut f = Function::new(&id, "");
        f.error = Some(FunctionError::SourceUnavailable {
            id,
            message: message.into(),
        });
        f
    }

    /// Consumes the `in:`/`out:`/`maneuver:`/`alarm:` lines off the front of
    /// the token queue, leaving the statement body. Blank-line runs between
    /// header lines are allowed; `maneuver:`/`alarm:` declare extra outputs
    /// flagged for host interpretation.
    fn parse_header(&mut self) -> Result<(), ParseError> {
        loop {
            match self.body.front().map(|t| t.kind) {
                Some(TokenKind::End) => {
                    self.body.pop_front();
                }
                Some(kind @ (TokenKind::In | TokenKind::Out)) => {
                    self.body.pop_front();
                    let id = self.header_identifier()?;
                    let description = self.optional_description();
                    self.header_end()?;
                    if kind == TokenKind::In {
                        self.ins.push(id);
                        self.in_descriptions.push(description);
                    } else {
                        self.outs.push(id);
                        self.out_descriptions.push(description);
                    }
                }
                Some(kind @ (TokenKind::Maneuver | TokenKind::Alarm)) => {
                    self.body.pop_front();
                    let id = self.header_identifier()?;
                    self.header_end()?;
                    if kind == TokenKind::Maneuver {
                        self.maneuver_outs.push(id.clone());
                    } else {
                        self.alarm_outs.push(id.clone());
                    }
                    if !self.outs.contains(&id) {
                        self.outs.push(id);
                        self.out_descriptions.push(None);
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn header_identifier(&mut self) -> Result<String, ParseError> {
        match self.body.pop_front() {
            Some(t) if t.kind == TokenKind::Identifier => Ok(t.text),
            Some(t) => Err(ParseError::UnexpectedToken {
                expected: "identifier".into(),
                found: t.describe(),
                pos: t.pos,
            }),
            None => Err(ParseError::UnexpectedEnd {
                function: self.id.clone(),
            }),
        }
    }

    fn optional_description(&mut self) -> Option<String> {
        match self.body.front() {
            Some(t) if t.kind == TokenKind::Text => Some(self.body.pop_front().unwrap().text),
            _ => None,
        }
    }

    fn header_end(&mut self) -> Result<(), ParseError> {
        match self.body.pop_front() {
            Some(t) if t.kind == TokenKind::End => Ok(()),
            Some(t) => Err(ParseError::UnexpectedToken {
                expected: "end of statement".into(),
                found: t.describe(),
                pos: t.pos,
            }),
            None => Ok(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Input names, in declaration order.
    pub fn ins(&self) -> &[String] {
        &self.ins
    }

    /// Quoted description of each input, if one was given.
    pub fn in_descriptions(&self) -> &[Option<String>] {
        &self.in_descriptions
    }

    /// Declared output names, including maneuver/alarm outputs.
    pub fn outs(&self) -> &[String] {
        &self.outs
    }

    pub fn out_descriptions(&self) -> &[Option<String>] {
        &self.out_descriptions
    }

    /// Output names the host should interpret as maneuver nodes.
    pub fn maneuver_outputs(&self) -> &[String] {
        &self.maneuver_outs
    }

    /// Output names the host should interpret as alarms.
    pub fn alarm_outputs(&self) -> &[String] {
        &self.alarm_outs
    }

    /// The names `execute` results correspond to: the declared outputs, or the
    /// identifiers assigned by the last statement when no `out:` line exists.
    /// The implicit form is only known once the body has compiled.
    pub fn output_names(&self) -> Vec<String> {
        if !self.outs.is_empty() {
            return self.outs.clone();
        }
        match self.compiled.get() {
            Some(Ok(statements)) => statements
                .last()
                .map(|s| s.ids.clone())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Whether the definition failed to tokenize or compile.
    pub fn in_error(&self) -> bool {
        self.error.is_some() || matches!(self.compiled.get(), Some(Err(_)))
    }

    /// The stored compile-time error message, or an empty string.
    pub fn error_string(&self) -> String {
        if let Some(e) = &self.error {
            return e.to_string();
        }
        match self.compiled.get() {
            Some(Err(e)) => e.to_string(),
            _ => String::new(),
        }
    }

    fn statements(&self, ctx: &dyn FunctionContext) -> Result<&[Statement], FunctionError> {
        let compiled = self.compiled.get_or_init(|| {
            debug!("compiling body of {}", self.id);
            let mut tokens = self.body.clone();
            builder::compile_statements(&mut tokens, &self.id, ctx)
        });
        match compiled {
            Ok(statements) => Ok(statements),
            Err(e) => Err(e.clone().into()),
        }
    }

    /// Executes the function with positional arguments.
    ///
    /// Each call owns a fresh set of locals; arguments are copied in by value,
    /// so a callee can never alias or mutate its caller's data. Returns one
    /// value per output name (see [`Function::output_names`]).
    pub fn execute(
        &self,
        args: Vec<Value>,
        globals: &dyn GlobalEnvironment,
        functions: &dyn FunctionContext,
    ) -> Result<Vec<Value>, FunctionError> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        let statements = self.statements(functions)?;

        if args.len() != self.ins.len() {
            return Err(EvalError::ArgumentCount {
                name: self.id.clone(),
                expected: self.ins.len(),
                got: args.len(),
                pos: SourcePos::new(&self.id, 1, 1),
            }
            .into());
        }

        let mut env = Env::new(globals, functions);
        for (name, value) in self.ins.iter().zip(args) {
            env.set_local(name.clone(), value);
        }

        for statement in statements {
            (statement.run)(&mut env)?;
        }

        let names: &[String] = if self.outs.is_empty() {
            // No out: block; the last statement's identifiers are the result.
            statements.last().map(|s| s.ids.as_slice()).unwrap_or(&[])
        } else {
            &self.outs
        };

        let mut results = Vec::with_capacity(names.len());
        for name in names {
            match env.local(name) {
                Some(v) => results.push(v.clone()),
                None => {
                    return Err(EvalError::OutputNotDefined {
                        function: self.id.clone(),
                        name: name.clone(),
                    }
                    .into())
                }
            }
        }
        Ok(results)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        writeln!(f, "    {}: {}", "Function".cyan(), self.id)?;
        writeln!(f, "    {}: {:?}", "Inputs".cyan(), self.ins)?;
        writeln!(f, "    {}: {:?}", "Outputs".cyan(), self.outs)?;
        if self.in_error() {
            writeln!(f, "    {}: {}", "Error".red(), self.error_string())?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InMemoryGlobals, NoFunctions};

    fn run(source: &str, args: Vec<Value>) -> Result<Vec<Value>, FunctionError> {
        let globals = InMemoryGlobals::new();
        Function::new("f", source).execute(args, &globals, &NoFunctions)
    }

    #[test]
    fn declared_outputs() {
        let result = run("in: x\nout: y\ny = x*2", vec![Value::Number(3.0)]).unwrap();
        assert_eq!(result, vec![Value::Number(6.0)]);
    }

    #[test]
    fn implicit_outputs_come_from_the_last_statement() {
        let result = run("a = 1\nb, c = [2, 3]", vec![]).unwrap();
        assert_eq!(result, vec![Value::Number(2.0), Value::Number(3.0)]);
    }

    #[test]
    fn output_names_follow_the_same_rule() {
        let globals = InMemoryGlobals::new();
        let f = Function::new("f", "a = 1\nb, c = [2, 3]");
        f.execute(vec![], &globals, &NoFunctions).unwrap();
        assert_eq!(f.output_names(), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn header_descriptions() {
        let f = Function::new("f", "in: v \"velocity\"\nin: t\nout: d \"distance\"\nd = v*t");
        assert_eq!(f.ins(), ["v", "t"]);
        assert_eq!(
            f.in_descriptions(),
            [Some("velocity".to_string()), None]
        );
        assert_eq!(f.out_descriptions(), [Some("distance".to_string())]);
    }

    #[test]
    fn maneuver_and_alarm_lines_flag_outputs() {
        let f = Function::new("node", "in: t\nmaneuver: dv\nalarm: when\ndv = [t, 0, 0]\nwhen = t");
        assert_eq!(f.outs(), ["dv", "when"]);
        assert_eq!(f.maneuver_outputs(), ["dv"]);
        assert_eq!(f.alarm_outputs(), ["when"]);
        let globals = InMemoryGlobals::new();
        let result = f
            .execute(vec![Value::Number(5.0)], &globals, &NoFunctions)
            .unwrap();
        assert_eq!(result[0], Value::from(vec![5.0, 0.0, 0.0]));
        assert_eq!(result[1], Value::Number(5.0));
    }

    #[test]
    fn wrong_argument_count() {
        let err = run("in: x\nx2 = x^2", vec![]).unwrap_err();
        assert!(matches!(
            err,
            FunctionError::Eval(EvalError::ArgumentCount { expected: 1, got: 0, .. })
        ));
    }

    #[test]
    fn undeclared_output_is_an_error() {
        let err = run("out: y\nz = 1", vec![]).unwrap_err();
        assert!(matches!(
            err,
            FunctionError::Eval(EvalError::OutputNotDefined { .. })
        ));
    }

    #[test]
    fn tokenizer_errors_put_the_function_in_error_state() {
        let f = Function::new("f", "x = 1.2.3");
        assert!(f.in_error());
        assert!(f.error_string().contains("decimal"));
        let globals = InMemoryGlobals::new();
        assert!(f.execute(vec![], &globals, &NoFunctions).is_err());
    }

    #[test]
    fn body_compile_errors_surface_on_execute() {
        let f = Function::new("f", "x = 1 +");
        assert!(!f.in_error());
        let globals = InMemoryGlobals::new();
        assert!(f.execute(vec![], &globals, &NoFunctions).is_err());
        // The error state persists after the first failed compile.
        assert!(f.in_error());
        assert!(!f.error_string().is_empty());
    }

    #[test]
    fn empty_function() {
        let f = Function::new("f", "in: x\n\n");
        assert!(f.in_error());
        assert!(matches!(
            f.execute(vec![Value::Number(1.0)], &InMemoryGlobals::new(), &NoFunctions),
            Err(FunctionError::Parse(ParseError::EmptyFunction { .. }))
        ));
    }

    #[test]
    fn solve_statement_inside_a_function() {
        let result = run("in: a\nout: x\nx = a\nx : x^2 = 25", vec![Value::Number(4.0)]);
        let x = result.unwrap()[0].as_number().unwrap();
        assert!((x - 5.0).abs() < 1e-6, "x = {x}");
    }

    #[test]
    fn display_mentions_the_header() {
        let f = Function::new("orbit", "in: r\nout: v\nv = √(G/r)");
        let s = format!("{f}");
        assert!(s.contains("orbit"));
        assert!(s.contains("[\"r\"]"));
    }
}
