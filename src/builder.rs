//! Compiles token streams into executable closures.
//!
//! Expressions compile with a pair of stacks, one for operands and one for
//! pending operators. Operands are already-compiled closures; an incoming
//! operator first pops and applies every stacked operator of strictly higher
//! precedence, so equal precedence groups to the right. Operators whose arity
//! depends on context (`-`, `√`, `|`) are resolved by testing whether the
//! stacks already form a complete expression.
//!
//! A function name without an argument list compiles to a deferred call: a
//! function reference on the operand stack plus a pseudo operator that binds
//! at multiplication precedence and applies as soon as its single operand
//! materializes. `sin x * y` is therefore `sin(x*y)` while `sin x + y` is
//! `sin(x) + y`.

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use log::trace;

use crate::builtins;
use crate::errors::{EvalError, ParseError, SourcePos};
use crate::solver;
use crate::token::{
    lookup, Arity, Token, TokenKind, BUILTIN_CALL, CALL_PRECEDENCE, UNARY_PRECEDENCE, USER_CALL,
};
use crate::types::{CompiledExpr, CompiledStatement, Env, FunctionContext};
use crate::value::{apply_binary, apply_unary, Value};

/// One compiled statement together with the identifiers it assigns, which
/// determine a function's outputs when no `out:` block is present.
pub struct Statement {
    pub ids: Vec<String>,
    pub run: CompiledStatement,
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

/// Compiles every statement in a (header-stripped) token stream.
pub fn compile_statements(
    tokens: &mut VecDeque<Token>,
    source: &str,
    ctx: &dyn FunctionContext,
) -> Result<Vec<Statement>, ParseError> {
    let mut compiler = Compiler { tokens, source, ctx };
    let mut statements = Vec::new();
    while let Some(t) = compiler.tokens.front() {
        if t.kind == TokenKind::End {
            compiler.tokens.pop_front();
            continue;
        }
        statements.push(compiler.statement()?);
        match compiler.tokens.front() {
            None => {}
            Some(t) if t.kind == TokenKind::End => {
                compiler.tokens.pop_front();
            }
            Some(t) => {
                return Err(ParseError::UnexpectedToken {
                    expected: "end of statement".into(),
                    found: t.describe(),
                    pos: t.pos.clone(),
                })
            }
        }
    }
    Ok(statements)
}

/// Compiles a single bare expression, for expression-mode evaluation.
pub fn compile_expression(
    tokens: &mut VecDeque<Token>,
    source: &str,
    ctx: &dyn FunctionContext,
) -> Result<CompiledExpr, ParseError> {
    Compiler { tokens, source, ctx }.expression()
}

/// An entry on the operand stack: either a compiled sub-expression or a
/// function reference awaiting its deferred argument.
enum Operand {
    Compiled(CompiledExpr),
    FuncRef {
        name: String,
        builtin: bool,
        pos: SourcePos,
    },
}

/// A stacked operator with its arity already resolved.
struct PendingOp {
    symbol: String,
    precedence: u8,
    arity: Arity,
    pos: SourcePos,
}

/// The operand/operator count test that disambiguates dual-arity operators
/// and decides whether `|` opens or closes an absolute-value brace: the
/// stacks form a complete expression when exactly one operand is left over
/// after every stacked operator takes its operands.
fn possibly_complete(operands: usize, ops: &[PendingOp]) -> bool {
    if operands == 0 && ops.is_empty() {
        return false;
    }
    let supplied = operands + ops.len();
    let required: usize = ops
        .iter()
        .map(|op| if op.arity == Arity::Binary { 2 } else { 1 })
        .sum();
    supplied == required + 1
}

struct Compiler<'t, 'c> {
    tokens: &'t mut VecDeque<Token>,
    source: &'t str,
    ctx: &'c dyn FunctionContext,
}

impl Compiler<'_, '_> {
    fn unexpected_end(&self) -> ParseError {
        ParseError::UnexpectedEnd {
            function: self.source.to_string(),
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ParseError> {
        let t = self.tokens.pop_front().ok_or_else(|| self.unexpected_end())?;
        if t.kind == kind {
            Ok(t)
        } else {
            Err(ParseError::UnexpectedToken {
                expected: expected.into(),
                found: t.describe(),
                pos: t.pos,
            })
        }
    }

    /// Consumes the closing half of a brace pair, reporting the opener's
    /// position when it is missing.
    fn expect_closer(&mut self, closer: char, opener_pos: &SourcePos) -> Result<(), ParseError> {
        match self.tokens.front() {
            Some(t)
                if matches!(t.kind, TokenKind::Brace | TokenKind::List)
                    && t.text == closer.to_string() =>
            {
                self.tokens.pop_front();
                Ok(())
            }
            _ => Err(ParseError::MissingCloser {
                expected: closer,
                pos: opener_pos.clone(),
            }),
        }
    }

    // ---- statements ----

    /// `ids = expr`, or the solve forms `ids : expr` and `ids : expr = expr`.
    fn statement(&mut self) -> Result<Statement, ParseError> {
        let mut ids = Vec::new();
        let first = self.expect(TokenKind::Identifier, "identifier")?;
        let pos = first.pos.clone();
        ids.push(first.text);

        loop {
            match self.tokens.front() {
                Some(t) if t.kind == TokenKind::Comma => {
                    self.tokens.pop_front();
                    ids.push(self.expect(TokenKind::Identifier, "identifier")?.text);
                }
                Some(t) if t.kind == TokenKind::Assign => {
                    self.tokens.pop_front();
                    return self.assignment(ids, pos);
                }
                Some(t) if t.kind == TokenKind::Colon => {
                    self.tokens.pop_front();
                    return self.solve_statement(ids, pos);
                }
                Some(t) => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "'=' or ':'".into(),
                        found: t.describe(),
                        pos: t.pos.clone(),
                    })
                }
                None => return Err(self.unexpected_end()),
            }
        }
    }

    fn assignment(&mut self, ids: Vec<String>, pos: SourcePos) -> Result<Statement, ParseError> {
        let expr = self.expression()?;
        let run: CompiledStatement = if ids.len() == 1 {
            let id = ids[0].clone();
            Rc::new(move |env: &mut Env<'_>| {
                let val = expr(env)?;
                env.set_local(id.clone(), val.clone());
                Ok(val)
            })
        } else {
            let names = ids.clone();
            Rc::new(move |env: &mut Env<'_>| {
                let val = expr(env)?;
                let got = match val.as_list() {
                    Some(elements) => elements.len(),
                    None => 1,
                };
                if got != names.len() {
                    return Err(EvalError::MultiAssignCount {
                        expected: names.len(),
                        got,
                        pos: pos.clone(),
                    });
                }
                for (name, element) in names.iter().zip(val.as_list().unwrap()) {
                    env.set_local(name.clone(), element.clone());
                }
                Ok(val)
            })
        };
        Ok(Statement { ids, run })
    }

    /// `ids : expr` minimizes the expression; `ids : expr = expr2` finds a
    /// root by minimizing their difference.
    fn solve_statement(
        &mut self,
        ids: Vec<String>,
        pos: SourcePos,
    ) -> Result<Statement, ParseError> {
        let lhs = self.expression()?;
        let objective = match self.tokens.front() {
            Some(t) if t.kind == TokenKind::Assign => {
                let eq_pos = t.pos.clone();
                self.tokens.pop_front();
                let rhs = self.expression()?;
                let diff: CompiledExpr = Rc::new(move |env: &mut Env<'_>| {
                    let a = lhs(env)?;
                    let b = rhs(env)?;
                    apply_binary(&a, &b, |x, y| x - y, &eq_pos)
                });
                diff
            }
            _ => lhs,
        };
        let vars = ids.clone();
        let run: CompiledStatement =
            Rc::new(move |env: &mut Env<'_>| solver::solve(&objective, &vars, env, &pos));
        Ok(Statement { ids, run })
    }

    // ---- expressions ----

    fn expression(&mut self) -> Result<CompiledExpr, ParseError> {
        let mut operands: Vec<Operand> = Vec::new();
        let mut ops: Vec<PendingOp> = Vec::new();
        let start = self
            .tokens
            .front()
            .map(|t| t.pos.clone())
            .unwrap_or_else(|| SourcePos::new(self.source, 1, 1));

        while let Some(t) = self.tokens.front() {
            match t.kind {
                TokenKind::Brace => {
                    let is_left = match t.text.as_str() {
                        "(" | "{" | "⌊" | "⌈" => true,
                        "|" => !possibly_complete(operands.len(), &ops),
                        _ => false,
                    };
                    if !is_left {
                        break;
                    }
                    let opener = self.tokens.pop_front().unwrap();
                    let inner = self.expression()?;
                    operands.push(Operand::Compiled(inner));
                    match opener.text.as_str() {
                        "(" => self.expect_closer(')', &opener.pos)?,
                        "{" => self.expect_closer('}', &opener.pos)?,
                        symbol => {
                            let closer = match symbol {
                                "⌊" => '⌋',
                                "⌈" => '⌉',
                                _ => '|',
                            };
                            self.expect_closer(closer, &opener.pos)?;
                            let op = lookup(symbol).ok_or_else(|| ParseError::UnknownOperator {
                                symbol: symbol.to_string(),
                                pos: opener.pos.clone(),
                            })?;
                            while ops.last().is_some_and(|top| top.precedence > op.precedence) {
                                let top = ops.pop().unwrap();
                                apply(top, &mut operands)?;
                            }
                            ops.push(PendingOp {
                                symbol: symbol.to_string(),
                                precedence: op.precedence,
                                arity: Arity::Unary,
                                pos: opener.pos,
                            });
                        }
                    }
                }

                TokenKind::Number => {
                    let t = self.tokens.pop_front().unwrap();
                    let n: f64 = t.text.parse().map_err(|_| ParseError::InvalidNumber {
                        text: t.text.clone(),
                        pos: t.pos.clone(),
                    })?;
                    operands.push(Operand::Compiled(Rc::new(move |_: &mut Env<'_>| {
                        Ok(Value::Number(n))
                    })));
                }

                TokenKind::Operator => {
                    let t = self.tokens.pop_front().unwrap();
                    let op = lookup(&t.text).ok_or_else(|| ParseError::UnknownOperator {
                        symbol: t.text.clone(),
                        pos: t.pos.clone(),
                    })?;
                    let (arity, precedence) = match op.arity {
                        Arity::Both => {
                            if possibly_complete(operands.len(), &ops) {
                                trace!("{} is binary", t.text);
                                (Arity::Binary, op.precedence)
                            } else {
                                trace!("{} is unary", t.text);
                                (Arity::Unary, UNARY_PRECEDENCE)
                            }
                        }
                        arity => (arity, op.precedence),
                    };
                    while ops.last().is_some_and(|top| top.precedence > precedence) {
                        let top = ops.pop().unwrap();
                        apply(top, &mut operands)?;
                    }
                    ops.push(PendingOp {
                        symbol: t.text,
                        precedence,
                        arity,
                        pos: t.pos,
                    });
                }

                TokenKind::Identifier => {
                    let t = self.tokens.pop_front().unwrap();
                    self.identifier(t, &mut operands, &mut ops)?;
                }

                TokenKind::List => {
                    if t.text == "]" {
                        break;
                    }
                    let opener = self.tokens.pop_front().unwrap();
                    let elements = self.element_list(']', &opener.pos)?;
                    if elements.is_empty() {
                        return Err(ParseError::EmptyList { pos: opener.pos });
                    }
                    operands.push(Operand::Compiled(Rc::new(move |env: &mut Env<'_>| {
                        let mut vals = Vec::with_capacity(elements.len());
                        for e in &elements {
                            vals.push(e(env)?);
                        }
                        Ok(Value::List(vals))
                    })));
                }

                TokenKind::Piecewise | TokenKind::Conditional => {
                    return Err(ParseError::ReservedConstruct {
                        construct: t.text.clone(),
                        pos: t.pos.clone(),
                    })
                }

                _ => break,
            }
        }

        while let Some(top) = ops.pop() {
            apply(top, &mut operands)?;
        }

        match operands.len() {
            0 => Err(self.unexpected_end()),
            1 => match operands.pop().unwrap() {
                Operand::Compiled(expr) => Ok(expr),
                Operand::FuncRef { pos, .. } => Err(ParseError::MalformedExpression { pos }),
            },
            _ => Err(ParseError::MalformedExpression { pos: start }),
        }
    }

    /// Parses comma-separated sub-expressions up to (and including) `closer`.
    fn element_list(
        &mut self,
        closer: char,
        opener_pos: &SourcePos,
    ) -> Result<Vec<CompiledExpr>, ParseError> {
        let mut elements = Vec::new();
        loop {
            match self.tokens.front() {
                None => return Err(ParseError::MissingCloser {
                    expected: closer,
                    pos: opener_pos.clone(),
                }),
                Some(t) if t.text == closer.to_string() => {
                    self.tokens.pop_front();
                    return Ok(elements);
                }
                Some(_) => {
                    elements.push(self.expression()?);
                    match self.tokens.front() {
                        Some(t) if t.kind == TokenKind::Comma => {
                            self.tokens.pop_front();
                        }
                        Some(t) if t.text == closer.to_string() => {}
                        _ => {
                            return Err(ParseError::MissingCloser {
                                expected: closer,
                                pos: opener_pos.clone(),
                            })
                        }
                    }
                }
            }
        }
    }

    /// Resolves an identifier: user function, then built-in, then fixed
    /// constant, then a runtime variable lookup (locals before host globals).
    fn identifier(
        &mut self,
        t: Token,
        operands: &mut Vec<Operand>,
        ops: &mut Vec<PendingOp>,
    ) -> Result<(), ParseError> {
        let known_arity = self
            .ctx
            .arity_of(&t.text)
            .map(|n| (n, false))
            .or_else(|| builtins::arity(&t.text).map(|n| (n, true)));

        if let Some((arity, builtin)) = known_arity {
            let name = t.text;
            let pos = t.pos;
            let has_paren = self
                .tokens
                .front()
                .is_some_and(|n| n.kind == TokenKind::Brace && n.text == "(");

            if has_paren {
                let opener = self.tokens.pop_front().unwrap();
                let args = self.element_list(')', &opener.pos)?;
                if args.len() != arity {
                    return Err(ParseError::ArityMismatch {
                        name,
                        expected: arity,
                        got: args.len(),
                        pos,
                    });
                }
                operands.push(Operand::Compiled(call_closure(name, builtin, args, pos)));
            } else if arity == 0 {
                // A niladic function needs no deferral; it runs in place.
                operands.push(Operand::Compiled(call_closure(name, builtin, vec![], pos)));
            } else {
                if arity != 1 {
                    return Err(ParseError::ArityMismatch {
                        name,
                        expected: arity,
                        got: 1,
                        pos,
                    });
                }
                trace!("deferring call to {name}");
                operands.push(Operand::FuncRef {
                    name,
                    builtin,
                    pos: pos.clone(),
                });
                ops.push(PendingOp {
                    symbol: if builtin { BUILTIN_CALL } else { USER_CALL }.to_string(),
                    precedence: CALL_PRECEDENCE,
                    arity: Arity::Binary,
                    pos,
                });
            }
            return Ok(());
        }

        if let Some(n) = builtins::constant(&t.text) {
            operands.push(Operand::Compiled(Rc::new(move |_: &mut Env<'_>| {
                Ok(Value::Number(n))
            })));
            return Ok(());
        }

        let name = t.text;
        let pos = t.pos;
        operands.push(Operand::Compiled(Rc::new(move |env: &mut Env<'_>| {
            if let Some(v) = env.local(&name) {
                return Ok(v.clone());
            }
            env.globals
                .get(&name)
                .ok_or_else(|| EvalError::UndefinedVariable {
                    name: name.clone(),
                    pos: pos.clone(),
                })
        })));
        Ok(())
    }
}

/// Builds the closure for a built-in or user-function call with evaluated
/// arguments. User calls resolve through the registry at run time, so a
/// callee may be replaced between runs without recompiling this caller.
fn call_closure(
    name: String,
    builtin: bool,
    args: Vec<CompiledExpr>,
    pos: SourcePos,
) -> CompiledExpr {
    Rc::new(move |env: &mut Env<'_>| {
        let mut vals = Vec::with_capacity(args.len());
        for a in &args {
            vals.push(a(env)?);
        }
        if builtin {
            builtins::call(&name, &vals, &pos)
        } else {
            let functions = env.functions;
            let globals = env.globals;
            functions.call(&name, vals, globals, &pos)
        }
    })
}

fn pop_value(operands: &mut Vec<Operand>, pos: &SourcePos) -> Result<CompiledExpr, ParseError> {
    match operands.pop() {
        Some(Operand::Compiled(expr)) => Ok(expr),
        Some(Operand::FuncRef { pos, .. }) => Err(ParseError::MalformedExpression { pos }),
        None => Err(ParseError::MalformedExpression { pos: pos.clone() }),
    }
}

fn binary(
    operands: &mut Vec<Operand>,
    pos: &SourcePos,
    f: fn(f64, f64) -> f64,
) -> Result<CompiledExpr, ParseError> {
    let b = pop_value(operands, pos)?;
    let a = pop_value(operands, pos)?;
    let pos = pos.clone();
    Ok(Rc::new(move |env: &mut Env<'_>| {
        let x = a(env)?;
        let y = b(env)?;
        apply_binary(&x, &y, f, &pos)
    }))
}

fn unary(
    operands: &mut Vec<Operand>,
    pos: &SourcePos,
    f: fn(f64) -> f64,
) -> Result<CompiledExpr, ParseError> {
    let a = pop_value(operands, pos)?;
    Ok(Rc::new(move |env: &mut Env<'_>| Ok(apply_unary(&a(env)?, f))))
}

/// Pops a pending operator's operands and pushes the combined closure.
fn apply(op: PendingOp, operands: &mut Vec<Operand>) -> Result<(), ParseError> {
    trace!("applying {}", op.symbol);
    let pos = &op.pos;
    let compiled = match op.symbol.as_str() {
        "+" => binary(operands, pos, |a, b| a + b)?,
        "-" => match op.arity {
            Arity::Unary => unary(operands, pos, |a| -a)?,
            _ => binary(operands, pos, |a, b| a - b)?,
        },
        "*" | "·" | "×" => binary(operands, pos, |a, b| a * b)?,
        "/" | "÷" => binary(operands, pos, |a, b| a / b)?,
        "%" => binary(operands, pos, |a, b| a % b)?,
        "^" => binary(operands, pos, f64::powf)?,
        // Binary form takes the left operand as the degree: 2√9 is the
        // square root of 9.
        "√" => match op.arity {
            Arity::Unary => unary(operands, pos, f64::sqrt)?,
            _ => binary(operands, pos, |a, b| b.powf(1.0 / a))?,
        },
        "⌊" => unary(operands, pos, f64::floor)?,
        "⌈" => unary(operands, pos, f64::ceil)?,
        "|" => unary(operands, pos, f64::abs)?,

        "==" => binary(operands, pos, |a, b| f64::from(a == b))?,
        "!=" => binary(operands, pos, |a, b| f64::from(a != b))?,
        "<" => binary(operands, pos, |a, b| f64::from(a < b))?,
        ">" => binary(operands, pos, |a, b| f64::from(a > b))?,
        "<=" => binary(operands, pos, |a, b| f64::from(a <= b))?,
        ">=" => binary(operands, pos, |a, b| f64::from(a >= b))?,

        "and" => binary(operands, pos, |a, b| f64::from(a != 0.0 && b != 0.0))?,
        "or" => binary(operands, pos, |a, b| f64::from(a != 0.0 || b != 0.0))?,
        "not" => unary(operands, pos, |a| f64::from(a == 0.0))?,

        BUILTIN_CALL | USER_CALL => {
            let arg = pop_value(operands, pos)?;
            match operands.pop() {
                Some(Operand::FuncRef { name, builtin, pos }) => {
                    call_closure(name, builtin, vec![arg], pos)
                }
                _ => return Err(ParseError::MalformedExpression { pos: pos.clone() }),
            }
        }

        symbol => {
            return Err(ParseError::UnknownOperator {
                symbol: symbol.to_string(),
                pos: pos.clone(),
            })
        }
    };
    operands.push(Operand::Compiled(compiled));
    Ok(())
}
