//! The dynamic value model: scalars and arbitrarily nested lists.
//!
//! Every expression in the language evaluates to a [`Value`]: either a single
//! number or a non-empty list whose elements are themselves values. Vectors
//! are flat lists of numbers, matrices are lists of equal-length numeric
//! lists. Elementwise operations broadcast recursively over this shape, so
//! the arithmetic operators and the scalar built-ins work on any nesting
//! depth without dedicated vector code paths.

use std::fmt;

use crate::errors::{EvalError, SourcePos};

/// A dynamically-typed value: a number or a non-empty nested list.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    List(Vec<Value>),
}

impl Value {
    /// Returns the number if this value is a scalar.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::List(_) => None,
        }
    }

    /// Returns the elements if this value is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::Number(_) => None,
            Value::List(elements) => Some(elements),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<Vec<f64>> for Value {
    fn from(ns: Vec<f64>) -> Self {
        Value::List(ns.into_iter().map(Value::Number).collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::List(elements) => {
                write!(f, "[")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Applies a scalar function elementwise, recursing through nested lists.
pub fn apply_unary(v: &Value, f: impl Fn(f64) -> f64 + Copy) -> Value {
    match v {
        Value::Number(n) => Value::Number(f(*n)),
        Value::List(elements) => {
            Value::List(elements.iter().map(|e| apply_unary(e, f)).collect())
        }
    }
}

/// Applies a scalar function to a pair of values under the broadcasting rule:
/// scalars are broadcast against every element of a list, lists pair up
/// elementwise and must have equal lengths, and the recursion handles any
/// nesting depth.
pub fn apply_binary(
    a: &Value,
    b: &Value,
    f: impl Fn(f64, f64) -> f64 + Copy,
    pos: &SourcePos,
) -> Result<Value, EvalError> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Ok(Value::Number(f(*x, *y))),
        (Value::Number(_), Value::List(elements)) => Ok(Value::List(
            elements
                .iter()
                .map(|e| apply_binary(a, e, f, pos))
                .collect::<Result<_, _>>()?,
        )),
        (Value::List(elements), Value::Number(_)) => Ok(Value::List(
            elements
                .iter()
                .map(|e| apply_binary(e, b, f, pos))
                .collect::<Result<_, _>>()?,
        )),
        (Value::List(xs), Value::List(ys)) => {
            if xs.len() != ys.len() {
                return Err(EvalError::UnequalListSizes { pos: pos.clone() });
            }
            Ok(Value::List(
                xs.iter()
                    .zip(ys)
                    .map(|(x, y)| apply_binary(x, y, f, pos))
                    .collect::<Result<_, _>>()?,
            ))
        }
    }
}
