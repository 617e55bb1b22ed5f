//! Vector and matrix operations over flat or rectangular numeric lists.
//!
//! Unlike the elementwise built-ins, these functions care about the shape of
//! their arguments: a vector is a flat list of numbers and a matrix is a list
//! of equal-length numeric lists. Anything else is rejected eagerly with a
//! positioned type error instead of producing garbage.

use crate::errors::{EvalError, SourcePos};
use crate::value::Value;

fn type_error(message: impl Into<String>, pos: &SourcePos) -> EvalError {
    EvalError::TypeMismatch {
        message: message.into(),
        pos: pos.clone(),
    }
}

/// Interprets a value as a flat numeric vector.
pub fn as_vector(v: &Value) -> Option<Vec<f64>> {
    let elements = v.as_list()?;
    elements.iter().map(Value::as_number).collect()
}

/// Interprets a value as a rectangular numeric matrix (a non-empty list of
/// equal-length numeric rows).
pub fn as_matrix(v: &Value) -> Option<Vec<Vec<f64>>> {
    let rows: Vec<Vec<f64>> = v
        .as_list()?
        .iter()
        .map(as_vector)
        .collect::<Option<_>>()?;
    let width = rows.first()?.len();
    if rows.iter().all(|r| r.len() == width) {
        Some(rows)
    } else {
        None
    }
}

fn vector_value(ns: Vec<f64>) -> Value {
    Value::from(ns)
}

fn matrix_value(rows: Vec<Vec<f64>>) -> Value {
    Value::List(rows.into_iter().map(Value::from).collect())
}

/// `len(list)` — shallow element count, not recursive.
pub fn len(a: &Value, pos: &SourcePos) -> Result<Value, EvalError> {
    match a.as_list() {
        Some(elements) => Ok(Value::Number(elements.len() as f64)),
        None => Err(type_error(
            "function len() can only be called with a list as argument",
            pos,
        )),
    }
}

/// `mag(list)` — Euclidean norm of a flat numeric vector.
pub fn mag(a: &Value, pos: &SourcePos) -> Result<Value, EvalError> {
    match as_vector(a) {
        Some(ns) => Ok(Value::Number(
            ns.iter().map(|n| n * n).sum::<f64>().sqrt(),
        )),
        None => Err(type_error(
            "argument to function mag() must be a list that contains only numbers",
            pos,
        )),
    }
}

/// `norm(list)` — the vector scaled to unit length.
pub fn norm(a: &Value, pos: &SourcePos) -> Result<Value, EvalError> {
    let ns = as_vector(a).ok_or_else(|| {
        type_error(
            "argument to function norm() must be a list that contains only numbers",
            pos,
        )
    })?;
    let mag = ns.iter().map(|n| n * n).sum::<f64>().sqrt();
    Ok(vector_value(ns.into_iter().map(|n| n / mag).collect()))
}

/// `dot(a, b)` — inner product for vectors, matrix product for matrices.
///
/// A vector paired with a matrix is promoted to a 1×N row (left side) or N×1
/// column (right side), multiplied, and the single-row or single-column result
/// is demoted back to a flat vector.
pub fn dot(a: &Value, b: &Value, pos: &SourcePos) -> Result<Value, EvalError> {
    match (as_vector(a), as_vector(b)) {
        (Some(x), Some(y)) => {
            if x.len() != y.len() {
                return Err(type_error(
                    "arguments to function dot() must be lists of equal length",
                    pos,
                ));
            }
            Ok(Value::Number(
                x.iter().zip(&y).map(|(p, q)| p * q).sum(),
            ))
        }
        (Some(x), None) => {
            let m = as_matrix(b).ok_or_else(|| dot_shape_error(pos))?;
            // Row vector times matrix, demoted back to a vector.
            let product = mat_mul(&[x], &m, pos)?;
            Ok(vector_value(product.into_iter().next().unwrap()))
        }
        (None, Some(y)) => {
            let m = as_matrix(a).ok_or_else(|| dot_shape_error(pos))?;
            // Matrix times column vector, demoted back to a vector.
            let column: Vec<Vec<f64>> = y.into_iter().map(|n| vec![n]).collect();
            let product = mat_mul(&m, &column, pos)?;
            Ok(vector_value(
                product.into_iter().map(|row| row[0]).collect(),
            ))
        }
        (None, None) => {
            let x = as_matrix(a).ok_or_else(|| dot_shape_error(pos))?;
            let y = as_matrix(b).ok_or_else(|| dot_shape_error(pos))?;
            Ok(matrix_value(mat_mul(&x, &y, pos)?))
        }
    }
}

fn dot_shape_error(pos: &SourcePos) -> EvalError {
    type_error(
        "arguments to function dot() must be numeric vectors or matrices",
        pos,
    )
}

fn mat_mul(a: &[Vec<f64>], b: &[Vec<f64>], pos: &SourcePos) -> Result<Vec<Vec<f64>>, EvalError> {
    let inner = a[0].len();
    if inner != b.len() {
        return Err(type_error(
            "inner matrix dimensions of dot() arguments must match",
            pos,
        ));
    }
    let cols = b[0].len();
    Ok(a.iter()
        .map(|row| {
            (0..cols)
                .map(|j| (0..inner).map(|k| row[k] * b[k][j]).sum())
                .collect()
        })
        .collect())
}

/// `cross(a, b)` — cross product of two length-3 numeric vectors.
pub fn cross(a: &Value, b: &Value, pos: &SourcePos) -> Result<Value, EvalError> {
    let (x, y) = match (as_vector(a), as_vector(b)) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(type_error(
                "arguments to function cross() must be lists that contain only numbers",
                pos,
            ))
        }
    };
    if x.len() != 3 || y.len() != 3 {
        return Err(type_error(
            "function cross() requires two lists of length 3",
            pos,
        ));
    }
    Ok(vector_value(vec![
        x[1] * y[2] - x[2] * y[1],
        x[2] * y[0] - x[0] * y[2],
        x[0] * y[1] - x[1] * y[0],
    ]))
}

/// `any(list)` — 1.0 if any element of a flat numeric list is nonzero.
pub fn any(a: &Value, pos: &SourcePos) -> Result<Value, EvalError> {
    let ns = as_vector(a).ok_or_else(|| {
        type_error(
            "argument to function any() must be a list that contains only numbers",
            pos,
        )
    })?;
    Ok(Value::Number(if ns.iter().any(|n| *n != 0.0) {
        1.0
    } else {
        0.0
    }))
}

/// `all(list)` — 1.0 if every element of a flat numeric list is nonzero.
pub fn all(a: &Value, pos: &SourcePos) -> Result<Value, EvalError> {
    let ns = as_vector(a).ok_or_else(|| {
        type_error(
            "argument to function all() must be a list that contains only numbers",
            pos,
        )
    })?;
    Ok(Value::Number(if ns.iter().all(|n| *n != 0.0) {
        1.0
    } else {
        0.0
    }))
}
