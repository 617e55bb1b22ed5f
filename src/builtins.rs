//! The fixed-arity built-in function table and the global constants.
//!
//! Scalar built-ins apply through the broadcasting rule in [`crate::value`],
//! so they accept nested lists transparently; the vector built-ins delegate to
//! [`crate::vector_math`] and validate shapes themselves.

use std::f64::consts;

use crate::errors::{EvalError, SourcePos};
use crate::value::{apply_binary, apply_unary, Value};
use crate::vector_math;

/// Returns the number of arguments the named built-in takes, or `None` if no
/// such built-in exists.
pub fn arity(name: &str) -> Option<usize> {
    match name {
        "abs" | "acos" | "asin" | "atan" | "ceil" | "cos" | "exp" | "floor" | "ln" | "log"
        | "log10" | "sign" | "sin" | "sqrt" | "tan" | "len" | "mag" | "norm" | "any" | "all" => {
            Some(1)
        }
        "max" | "min" | "pow" | "round" | "dot" | "cross" => Some(2),
        _ => None,
    }
}

/// Looks up a fixed global constant substituted as a literal at compile time.
pub fn constant(name: &str) -> Option<f64> {
    match name {
        "pi" | "π" => Some(consts::PI),
        "e" => Some(consts::E),
        "G" => Some(6.67384e-11),
        _ => None,
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn round_digits(value: f64, digits: f64) -> f64 {
    let scale = 10f64.powi(digits.trunc() as i32);
    (value * scale).round() / scale
}

/// Invokes the named built-in on already-evaluated arguments.
///
/// The argument count is validated by the compiler against [`arity`]; this
/// function assumes it is correct.
pub fn call(name: &str, args: &[Value], pos: &SourcePos) -> Result<Value, EvalError> {
    let unary = |f: fn(f64) -> f64| Ok(apply_unary(&args[0], f));
    let binary = |f: fn(f64, f64) -> f64| apply_binary(&args[0], &args[1], f, pos);

    match name {
        "abs" => unary(f64::abs),
        "acos" => unary(f64::acos),
        "asin" => unary(f64::asin),
        "atan" => unary(f64::atan),
        "ceil" => unary(f64::ceil),
        "cos" => unary(f64::cos),
        "exp" => unary(f64::exp),
        "floor" => unary(f64::floor),
        "ln" | "log" => unary(f64::ln),
        "log10" => unary(f64::log10),
        "sign" => unary(sign),
        "sin" => unary(f64::sin),
        "sqrt" => unary(f64::sqrt),
        "tan" => unary(f64::tan),

        "max" => binary(f64::max),
        "min" => binary(f64::min),
        "pow" => binary(f64::powf),
        "round" => binary(round_digits),

        "len" => vector_math::len(&args[0], pos),
        "mag" => vector_math::mag(&args[0], pos),
        "norm" => vector_math::norm(&args[0], pos),
        "any" => vector_math::any(&args[0], pos),
        "all" => vector_math::all(&args[0], pos),
        "dot" => vector_math::dot(&args[0], &args[1], pos),
        "cross" => vector_math::cross(&args[0], &args[1], pos),

        _ => Err(EvalError::UnknownFunction {
            name: name.to_string(),
            pos: pos.clone(),
        }),
    }
}
