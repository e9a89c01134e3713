//! Mean-volume estimation.
//!
//! Solves the normal equations `(K + λI) x = b` where K is the mean
//! projection/back-projection kernel acting on basis coefficients and b is
//! the backprojected image sum, already in coefficient form.

use ndarray::Array1;

use crate::basis::Basis;
use crate::cg::{self, CgConfig, CgSolution, LinearOperator};
use crate::error::{Error, Result};
use crate::kernel::FourierKernel;

#[derive(Clone, Debug)]
pub struct MeanOptions {
    /// λ added uniformly to the kernel (and to the preconditioner kernel).
    pub regularizer: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub store_objective: bool,
}

impl Default for MeanOptions {
    fn default() -> Self {
        Self {
            regularizer: 0.0,
            max_iterations: 50,
            tolerance: 1e-15,
            store_objective: false,
        }
    }
}

struct KernelOperator<'a> {
    kernel: &'a FourierKernel,
    basis: &'a dyn Basis,
}

impl LinearOperator for KernelOperator<'_> {
    fn len(&self) -> usize {
        self.basis.count()
    }

    fn apply(&self, v: &Array1<f64>) -> Array1<f64> {
        self.kernel.apply(v, self.basis)
            .expect("kernel/basis compatibility was validated at construction")
    }
}

pub struct MeanEstimator<'a> {
    kernel: FourierKernel,
    precond: Option<FourierKernel>,
    basis: &'a dyn Basis,
    options: MeanOptions,
}

impl<'a> MeanEstimator<'a> {
    pub fn new(kernel: &FourierKernel, basis: &'a dyn Basis, options: MeanOptions) -> Result<Self> {
        validate_kernel(kernel, basis)?;
        let kernel = kernel.regularized(options.regularizer)?;
        Ok(Self { kernel, precond: None, basis, options })
    }

    /// Precondition CG with the reciprocal of `kernel`, regularised the same
    /// way as the main kernel.
    pub fn with_preconditioner(mut self, kernel: &FourierKernel) -> Result<Self> {
        validate_kernel(kernel, self.basis)?;
        self.precond = Some(kernel.regularized(self.options.regularizer)?.reciprocal());
        Ok(self)
    }

    /// Estimate mean coefficients from the backprojected image sum `b`.
    pub fn estimate(&self, b: &Array1<f64>) -> Result<CgSolution> {
        if b.len() != self.basis.count() {
            return Err(Error::shape(format!(
                "rhs has length {}, basis has {} coefficients",
                b.len(), self.basis.count()
            )));
        }
        let operator = KernelOperator { kernel: &self.kernel, basis: self.basis };
        let precond = self.precond.as_ref()
            .map(|kernel| KernelOperator { kernel, basis: self.basis });
        let config = CgConfig {
            max_iterations: self.options.max_iterations,
            tolerance: self.options.tolerance,
            store_objective: self.options.store_objective,
            initial_guess: None,
        };
        let solution = cg::solve(
            &operator,
            b,
            precond.as_ref().map(|p| p as &dyn LinearOperator),
            &config,
        )?;
        log::info!(
            "mean estimation: {} cg iterations, converged = {}",
            solution.diagnostics.iterations, solution.diagnostics.converged,
        );
        Ok(solution)
    }
}

// The basis must produce volumes whose doubled side matches the kernel grid.
// Checked once, up front, so the CG inner loop can treat application as
// infallible.
fn validate_kernel(kernel: &FourierKernel, basis: &dyn Basis) -> Result<()> {
    let probe = basis.from_coefficients(&Array1::zeros(basis.count()))?;
    let side = probe.dim().0;
    if 2 * side != kernel.side() {
        return Err(Error::shape(format!(
            "kernel grid side {} does not double the basis volume side {side}", kernel.side()
        )));
    }
    Ok(())
}
