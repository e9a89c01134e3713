//! Conjugate gradient solver for symmetric positive (semi-)definite systems.
//!
//! The operator is never materialised: callers hand in anything that can map
//! a coefficient vector to a coefficient vector. Failure to converge within
//! the iteration budget is reported through the diagnostics, not as an error,
//! because a partially converged iterate is often still usable.

use ndarray::Array1;

use crate::error::{Error, Result};

/// Matrix-free linear operator on coefficient vectors.
pub trait LinearOperator {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn apply(&self, v: &Array1<f64>) -> Array1<f64>;
}

/// Adapter turning a closure into a `LinearOperator`.
pub struct FnOperator<F: Fn(&Array1<f64>) -> Array1<f64>> {
    len: usize,
    f: F,
}

impl<F: Fn(&Array1<f64>) -> Array1<f64>> FnOperator<F> {
    pub fn new(len: usize, f: F) -> Self {
        Self { len, f }
    }
}

impl<F: Fn(&Array1<f64>) -> Array1<f64>> LinearOperator for FnOperator<F> {
    fn len(&self) -> usize {
        self.len
    }

    fn apply(&self, v: &Array1<f64>) -> Array1<f64> {
        (self.f)(v)
    }
}

#[derive(Clone, Debug)]
pub struct CgConfig {
    pub max_iterations: usize,
    /// Convergence threshold on the relative residual norm ‖r‖/‖b‖.
    pub tolerance: f64,
    /// Also record the objective ½xᵀAx - bᵀx at every iteration. Costs one
    /// extra operator application per iteration.
    pub store_objective: bool,
    /// Starting iterate; zero vector if absent.
    pub initial_guess: Option<Array1<f64>>,
}

impl Default for CgConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-15,
            store_objective: false,
            initial_guess: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CgDiagnostics {
    /// Relative residual norm after each iteration.
    pub residuals: Vec<f64>,
    /// Objective values, present iff `store_objective` was requested.
    pub objectives: Option<Vec<f64>>,
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Clone, Debug)]
pub struct CgSolution {
    pub x: Array1<f64>,
    pub diagnostics: CgDiagnostics,
}

fn norm(v: &Array1<f64>) -> f64 {
    v.dot(v).sqrt()
}

/// Solve `A x = b` by preconditioned conjugate gradients.
///
/// `preconditioner`, when present, applies M⁻¹. Regularisation is the
/// caller's business: fold `+λx` into the operator before calling.
pub fn solve(
    operator: &dyn LinearOperator,
    b: &Array1<f64>,
    preconditioner: Option<&dyn LinearOperator>,
    config: &CgConfig,
) -> Result<CgSolution> {
    let n = operator.len();
    if b.len() != n {
        return Err(Error::shape(format!(
            "rhs has length {}, operator expects {n}", b.len()
        )));
    }
    if let Some(m) = preconditioner {
        if m.len() != n {
            return Err(Error::shape(format!(
                "preconditioner has length {}, operator expects {n}", m.len()
            )));
        }
    }
    if !(config.tolerance > 0.0) {
        return Err(Error::config(format!(
            "tolerance must be positive, got {}", config.tolerance
        )));
    }
    if let Some(x0) = &config.initial_guess {
        if x0.len() != n {
            return Err(Error::shape(format!(
                "initial guess has length {}, operator expects {n}", x0.len()
            )));
        }
    }

    let b_norm = norm(b);
    if b_norm == 0.0 {
        // A x = 0 has the trivial solution for any positive semi-definite A.
        return Ok(CgSolution {
            x: Array1::zeros(n),
            diagnostics: CgDiagnostics {
                residuals: vec![],
                objectives: config.store_objective.then(Vec::new),
                iterations: 0,
                converged: true,
            },
        });
    }

    let mut x = match &config.initial_guess {
        Some(x0) => x0.clone(),
        None => Array1::zeros(n),
    };
    let mut r = match &config.initial_guess {
        Some(_) => b - &operator.apply(&x),
        None => b.clone(),
    };
    let mut z = match preconditioner {
        Some(m) => m.apply(&r),
        None => r.clone(),
    };
    let mut p = z.clone();
    let mut rz = r.dot(&z);

    let mut residuals = Vec::new();
    let mut objectives = config.store_objective.then(Vec::new);
    let mut converged = norm(&r) / b_norm < config.tolerance;
    let mut iterations = 0;

    while !converged && iterations < config.max_iterations {
        let ap = operator.apply(&p);
        let pap = p.dot(&ap);
        if pap <= 0.0 {
            // Search direction fell into the operator's null space: the
            // iterate cannot improve further along it.
            break;
        }
        let alpha = rz / pap;
        x.scaled_add(alpha, &p);
        r.scaled_add(-alpha, &ap);
        iterations += 1;

        let res = norm(&r) / b_norm;
        residuals.push(res);
        if let Some(obj) = objectives.as_mut() {
            obj.push(0.5 * x.dot(&operator.apply(&x)) - b.dot(&x));
        }
        if res < config.tolerance {
            converged = true;
            break;
        }

        z = match preconditioner {
            Some(m) => m.apply(&r),
            None => r.clone(),
        };
        let rz_new = r.dot(&z);
        let beta = rz_new / rz;
        rz = rz_new;
        p *= beta;
        p += &z;
    }

    if !converged {
        log::warn!(
            "cg: stopped after {iterations} iterations with relative residual {:.3e} (tolerance {:.3e})",
            residuals.last().copied().unwrap_or(1.0),
            config.tolerance,
        );
    }

    Ok(CgSolution {
        x,
        diagnostics: CgDiagnostics { residuals, objectives, iterations, converged },
    })
}
