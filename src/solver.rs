//! Derivative-free Nelder-Mead minimizer backing solve statements.
//!
//! A solve statement (`y : expr` or `y : expr = expr2`) names the variables of
//! interest and stores its objective as a compiled sub-expression. The solver
//! repeatedly rebinds those variables in the per-call environment, re-evaluates
//! the closure, and reshapes an N+1 vertex simplex until both the vertex
//! spread and the objective spread fall below tolerance or the evaluation
//! budget runs out. Budget exhaustion is not an error; the best point found so
//! far is accepted.

use log::trace;

use crate::errors::{EvalError, SourcePos};
use crate::types::{CompiledExpr, Env};
use crate::value::Value;
use crate::vector_math;

/// Reflection coefficient.
const RHO: f64 = 1.0;
/// Expansion coefficient.
const CHI: f64 = 2.0;
/// Contraction coefficient.
const PSI: f64 = 0.5;
/// Shrink coefficient.
const SIGMA: f64 = 0.5;

/// Convergence tolerance on the simplex coordinate spread.
const XATOL: f64 = 1e-8;
/// Convergence tolerance on the objective value spread.
const FATOL: f64 = 1e-8;

/// Evaluations and iterations allowed per variable of interest.
const BUDGET_PER_VAR: usize = 200;

struct Objective<'o, 'e, 'a> {
    expr: &'o CompiledExpr,
    vars: &'o [String],
    env: &'e mut Env<'a>,
    pos: &'o SourcePos,
    evals: usize,
}

impl Objective<'_, '_, '_> {
    /// Rebinds the variables of interest to `point` and reduces the stored
    /// expression to a scalar cost: |x| for a number, the Euclidean norm for
    /// a flat numeric list. Nested lists have no defined norm.
    fn cost(&mut self, point: &[f64]) -> Result<f64, EvalError> {
        for (var, x) in self.vars.iter().zip(point) {
            self.env.set_local(var.clone(), Value::Number(*x));
        }
        self.evals += 1;
        match (self.expr)(self.env)? {
            Value::Number(n) => Ok(n.abs()),
            list => match vector_math::as_vector(&list) {
                Some(ns) => Ok(ns.iter().map(|n| n * n).sum::<f64>().sqrt()),
                None => Err(EvalError::NonScalarObjective {
                    pos: self.pos.clone(),
                }),
            },
        }
    }
}

/// Minimizes `objective` over the named variables, mutating them in place in
/// `env`, and returns their final values as a number (N=1) or list (N>1).
pub fn solve(
    objective: &CompiledExpr,
    vars: &[String],
    env: &mut Env<'_>,
    pos: &SourcePos,
) -> Result<Value, EvalError> {
    let n = vars.len();
    if n == 0 {
        // Unreachable from parsed source; a solve statement names at least
        // one identifier.
        return Ok(Value::List(Vec::new()));
    }
    let max_evals = BUDGET_PER_VAR * n;
    let max_iters = BUDGET_PER_VAR * n;

    // Vertex 0 starts from the current value of each variable, if any.
    let x0: Vec<f64> = vars
        .iter()
        .map(|v| env.local(v).and_then(Value::as_number).unwrap_or(0.0))
        .collect();

    let mut objective = Objective {
        expr: objective,
        vars,
        env,
        pos,
        evals: 0,
    };

    // The remaining N vertices perturb one coordinate each.
    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
    let f0 = objective.cost(&x0)?;
    simplex.push((x0.clone(), f0));
    for i in 0..n {
        let mut xi = x0.clone();
        xi[i] = if xi[i] != 0.0 { xi[i] * 1.05 } else { 0.00025 };
        let fi = objective.cost(&xi)?;
        simplex.push((xi, fi));
    }

    sort_simplex(&mut simplex);

    let mut iters = 0;
    while iters < max_iters && objective.evals < max_evals && !converged(&simplex) {
        iters += 1;

        let worst = simplex[n].0.clone();
        let f_worst = simplex[n].1;
        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|(x, _)| x[j]).sum::<f64>() / n as f64)
            .collect();

        let reflected: Vec<f64> = (0..n)
            .map(|j| centroid[j] + RHO * (centroid[j] - worst[j]))
            .collect();
        let f_reflected = objective.cost(&reflected)?;

        if f_reflected < simplex[0].1 {
            // Try expanding past the reflection point.
            let expanded: Vec<f64> = (0..n)
                .map(|j| centroid[j] + RHO * CHI * (centroid[j] - worst[j]))
                .collect();
            let f_expanded = objective.cost(&expanded)?;
            simplex[n] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
        } else if f_reflected < simplex[n - 1].1 {
            simplex[n] = (reflected, f_reflected);
        } else if f_reflected < f_worst {
            // Outside contraction.
            let contracted: Vec<f64> = (0..n)
                .map(|j| centroid[j] + PSI * RHO * (centroid[j] - worst[j]))
                .collect();
            let f_contracted = objective.cost(&contracted)?;
            if f_contracted <= f_reflected {
                simplex[n] = (contracted, f_contracted);
            } else {
                shrink(&mut simplex, &mut objective)?;
            }
        } else {
            // Inside contraction.
            let contracted: Vec<f64> = (0..n)
                .map(|j| centroid[j] - PSI * (centroid[j] - worst[j]))
                .collect();
            let f_contracted = objective.cost(&contracted)?;
            if f_contracted < f_worst {
                simplex[n] = (contracted, f_contracted);
            } else {
                shrink(&mut simplex, &mut objective)?;
            }
        }

        sort_simplex(&mut simplex);
    }

    trace!(
        "solve finished after {} iterations, {} evaluations, cost {}",
        iters,
        objective.evals,
        simplex[0].1
    );

    // Leave the best point bound in the environment and read the results
    // back out of it.
    let best = simplex[0].0.clone();
    for (var, x) in vars.iter().zip(&best) {
        objective.env.set_local(var.clone(), Value::Number(*x));
    }
    if n == 1 {
        Ok(Value::Number(best[0]))
    } else {
        Ok(Value::List(best.into_iter().map(Value::Number).collect()))
    }
}

fn sort_simplex(simplex: &mut [(Vec<f64>, f64)]) {
    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
}

fn converged(simplex: &[(Vec<f64>, f64)]) -> bool {
    let (best, f_best) = &simplex[0];
    let x_spread = simplex[1..]
        .iter()
        .flat_map(|(x, _)| x.iter().zip(best).map(|(a, b)| (a - b).abs()))
        .fold(0.0f64, f64::max);
    let f_spread = simplex[1..]
        .iter()
        .map(|(_, f)| (f - f_best).abs())
        .fold(0.0f64, f64::max);
    x_spread <= XATOL && f_spread <= FATOL
}

fn shrink(
    simplex: &mut [(Vec<f64>, f64)],
    objective: &mut Objective<'_, '_, '_>,
) -> Result<(), EvalError> {
    let best = simplex[0].0.clone();
    for vertex in &mut simplex[1..] {
        for (x, b) in vertex.0.iter_mut().zip(&best) {
            *x = b + SIGMA * (*x - b);
        }
        vertex.1 = objective.cost(&vertex.0)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::types::{InMemoryGlobals, NoFunctions};

    fn pos() -> SourcePos {
        SourcePos::new("test", 1, 1)
    }

    fn local(env: &Env<'_>, name: &str) -> f64 {
        env.local(name).and_then(Value::as_number).unwrap()
    }

    #[test]
    fn finds_positive_root_from_positive_seed() {
        // y : x^2 - 4 = 0 with x seeded at 3 converges to the nearby root.
        let objective: CompiledExpr = Rc::new(|env: &mut Env<'_>| {
            let x = env.local("x").and_then(Value::as_number).unwrap();
            Ok(Value::Number(x * x - 4.0))
        });
        let globals = InMemoryGlobals::new();
        let mut env = Env::new(&globals, &NoFunctions);
        env.set_local("x", Value::Number(3.0));
        let result = solve(&objective, &["x".to_string()], &mut env, &pos()).unwrap();
        let x = result.as_number().unwrap();
        assert!((x - 2.0).abs() < 1e-6, "x = {x}");
        assert!((local(&env, "x") - 2.0).abs() < 1e-6);
    }

    #[test]
    fn finds_negative_root_from_negative_seed() {
        let objective: CompiledExpr = Rc::new(|env: &mut Env<'_>| {
            let x = env.local("x").and_then(Value::as_number).unwrap();
            Ok(Value::Number(x * x - 4.0))
        });
        let globals = InMemoryGlobals::new();
        let mut env = Env::new(&globals, &NoFunctions);
        env.set_local("x", Value::Number(-1.0));
        let result = solve(&objective, &["x".to_string()], &mut env, &pos()).unwrap();
        assert!((result.as_number().unwrap() + 2.0).abs() < 1e-6);
    }

    #[test]
    fn unset_variables_seed_at_zero() {
        // Minimize |x - 1| with no prior binding; the zero seed plus the
        // 0.00025 perturbation still reaches the minimum.
        let objective: CompiledExpr = Rc::new(|env: &mut Env<'_>| {
            let x = env.local("x").and_then(Value::as_number).unwrap();
            Ok(Value::Number(x - 1.0))
        });
        let globals = InMemoryGlobals::new();
        let mut env = Env::new(&globals, &NoFunctions);
        let result = solve(&objective, &["x".to_string()], &mut env, &pos()).unwrap();
        assert!((result.as_number().unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn vector_objective_uses_euclidean_norm() {
        // Two residuals at once: [x-1, y-2] drives (x, y) to (1, 2).
        let objective: CompiledExpr = Rc::new(|env: &mut Env<'_>| {
            let x = env.local("x").and_then(Value::as_number).unwrap();
            let y = env.local("y").and_then(Value::as_number).unwrap();
            Ok(Value::List(vec![
                Value::Number(x - 1.0),
                Value::Number(y - 2.0),
            ]))
        });
        let globals = InMemoryGlobals::new();
        let mut env = Env::new(&globals, &NoFunctions);
        env.set_local("x", Value::Number(0.5));
        env.set_local("y", Value::Number(0.5));
        let vars = vec!["x".to_string(), "y".to_string()];
        let result = solve(&objective, &vars, &mut env, &pos()).unwrap();
        let point = vector_math::as_vector(&result).unwrap();
        assert!((point[0] - 1.0).abs() < 1e-5, "point = {point:?}");
        assert!((point[1] - 2.0).abs() < 1e-5, "point = {point:?}");
    }

    #[test]
    fn nested_list_objective_is_rejected() {
        let objective: CompiledExpr = Rc::new(|_: &mut Env<'_>| {
            Ok(Value::List(vec![Value::List(vec![Value::Number(1.0)])]))
        });
        let globals = InMemoryGlobals::new();
        let mut env = Env::new(&globals, &NoFunctions);
        let err = solve(&objective, &["x".to_string()], &mut env, &pos()).unwrap_err();
        assert!(matches!(err, EvalError::NonScalarObjective { .. }));
    }

    #[test]
    fn budget_exhaustion_returns_best_point() {
        // Seeded nine orders of magnitude from the minimum, the budget may
        // run out first; the best point found so far still comes back Ok.
        let objective: CompiledExpr = Rc::new(|env: &mut Env<'_>| {
            let x = env.local("x").and_then(Value::as_number).unwrap();
            Ok(Value::Number(x))
        });
        let globals = InMemoryGlobals::new();
        let mut env = Env::new(&globals, &NoFunctions);
        env.set_local("x", Value::Number(1.0e9));
        let result = solve(&objective, &["x".to_string()], &mut env, &pos());
        assert!(result.is_ok());
    }
}
