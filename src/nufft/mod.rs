//! Non-uniform Fourier transform plans.
//!
//! A `Plan` fixes the output grid, the number of non-uniform points and a
//! transform strategy at construction; the frequency points themselves are
//! supplied exactly once via `set_points`. Forward and adjoint transforms are
//! then available for the lifetime of the plan:
//!
//! ```text
//! transform: sig_f[k] = Σ_x signal[x] · exp(-i ⟨points[:,k], x⟩)
//! adjoint:   sig[x]   = Σ_k freq[k]   · exp(+i ⟨points[:,k], x⟩)
//! ```
//!
//! where x runs over the *centered* integer grid `-⌊n/2⌋ .. n-1-⌊n/2⌋` in
//! each of the 1–3 dimensions. All backends implement these two formulas; the
//! gridded ones approximate them to the plan's tolerance on an oversampled
//! grid, so backends are freely substitutable.

pub(crate) mod direct;
pub(crate) mod gridded;

use ndarray::{Array1, Array2, ArrayD};
use num_complex::Complex64;
use serde::Deserialize;
use std::f64::consts::PI;

use crate::error::{Error, Result};

/// Working precision of a plan's outputs.
///
/// Gridded backends always compute in double precision internally (their
/// deconvolution factors are ill-conditioned in reduced precision) and round
/// the result back to the requested precision on return.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Single,
    #[default]
    Double,
}

impl Precision {
    /// Machine epsilon of the working precision: the floor below which a
    /// requested tolerance cannot go.
    pub fn epsilon(self) -> f64 {
        match self {
            Precision::Single => f32::EPSILON as f64,
            Precision::Double => f64::EPSILON,
        }
    }
}

/// Transform strategy. A closed set: every variant implements identical
/// forward/adjoint semantics at a different accuracy/speed trade-off.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Exact O(N·K) summation. The reference the other backends are tested
    /// against; only affordable for small problems.
    Direct,
    /// Gaussian-kernel gridding on a 2x-oversampled grid.
    Gaussian,
    /// Kaiser-Bessel-kernel gridding. Best accuracy per unit of spreading
    /// width, hence the default.
    #[default]
    KaiserBessel,
    /// Exponential-of-semicircle-kernel gridding.
    ExpSemicircle,
}

#[derive(Clone, Copy, Debug)]
pub struct PlanOptions {
    pub backend: Backend,
    pub precision: Precision,
    /// Requested tolerance; the effective tolerance is
    /// `max(epsilon, precision.epsilon())`.
    pub epsilon: f64,
    /// If nonzero, transforms run inside a dedicated rayon pool of this many
    /// threads instead of the ambient one.
    pub thread_budget: usize,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            precision: Precision::default(),
            epsilon: 1e-15,
            thread_budget: 0,
        }
    }
}

/// Backend interface: one implementation per `Backend` variant, chosen at
/// plan construction so no call site ever branches on the backend code.
pub(crate) trait Transformer: Send + Sync {
    fn transform(&self, points: &Array2<f64>, signal: &ArrayD<Complex64>) -> Array1<Complex64>;
    fn adjoint(&self, points: &Array2<f64>, freq: &Array1<Complex64>) -> ArrayD<Complex64>;
}

pub struct Plan {
    sz: Vec<usize>,
    num_points: usize,
    options: PlanOptions,
    epsilon: f64,
    points: Option<Array2<f64>>,
    engine: Box<dyn Transformer>,
}

impl Plan {
    /// Create a plan for a `sz`-shaped grid (1–3 positive dimensions) and
    /// `num_points` non-uniform points.
    pub fn new(sz: &[usize], num_points: usize, options: PlanOptions) -> Result<Self> {
        if sz.is_empty() || sz.len() > 3 {
            return Err(Error::config(format!(
                "grid must have 1 to 3 dimensions, got {}", sz.len()
            )));
        }
        if sz.iter().any(|&n| n == 0) {
            return Err(Error::config(format!("grid sides must be positive, got {sz:?}")));
        }
        if !(options.epsilon > 0.0) {
            return Err(Error::config(format!("epsilon must be positive, got {}", options.epsilon)));
        }
        let epsilon = options.epsilon.max(options.precision.epsilon());
        let engine: Box<dyn Transformer> = match options.backend {
            Backend::Direct => Box::new(direct::Direct::new(sz)),
            Backend::Gaussian =>
                Box::new(gridded::Gridded::new(sz, epsilon, gridded::SpreadKernel::Gaussian)),
            Backend::KaiserBessel =>
                Box::new(gridded::Gridded::new(sz, epsilon, gridded::SpreadKernel::KaiserBessel)),
            Backend::ExpSemicircle =>
                Box::new(gridded::Gridded::new(sz, epsilon, gridded::SpreadKernel::ExpSemicircle)),
        };
        Ok(Self { sz: sz.to_vec(), num_points, options, epsilon, points: None, engine })
    }

    pub fn size(&self) -> &[usize] { &self.sz }

    pub fn dimensions(&self) -> usize { self.sz.len() }

    pub fn num_points(&self) -> usize { self.num_points }

    /// Effective tolerance: `max(requested, precision floor)`.
    pub fn epsilon(&self) -> f64 { self.epsilon }

    /// Fix the non-uniform frequency points: a (d, K) array with every
    /// coordinate in [-π, π]. May be called at most once per plan.
    pub fn set_points(&mut self, points: Array2<f64>) -> Result<()> {
        if self.points.is_some() {
            return Err(Error::state("frequency points are already set for this plan"));
        }
        let (d, k) = points.dim();
        if d != self.sz.len() {
            return Err(Error::shape(format!(
                "points have {d} coordinates but the plan is {}-dimensional", self.sz.len()
            )));
        }
        if k != self.num_points {
            return Err(Error::shape(format!(
                "expected {} points, got {k}", self.num_points
            )));
        }
        if points.iter().any(|t| !t.is_finite() || t.abs() > PI) {
            return Err(Error::config("frequency points must lie in [-π, π]".to_string()));
        }
        self.points = Some(points);
        Ok(())
    }

    /// Forward transform of a `sz`-shaped signal to the K frequency values.
    pub fn transform(&self, signal: &ArrayD<Complex64>) -> Result<Array1<Complex64>> {
        let points = self.points_ref()?;
        if signal.shape() != self.sz.as_slice() {
            return Err(Error::shape(format!(
                "signal has shape {:?}, plan expects {:?}", signal.shape(), self.sz
            )));
        }
        let out = self.scoped(|| self.engine.transform(points, signal))?;
        Ok(match self.options.precision {
            Precision::Double => out,
            Precision::Single => out.mapv(round_single),
        })
    }

    /// Adjoint transform of K frequency values back to a `sz`-shaped signal.
    pub fn adjoint(&self, freq: &Array1<Complex64>) -> Result<ArrayD<Complex64>> {
        let points = self.points_ref()?;
        if freq.len() != self.num_points {
            return Err(Error::shape(format!(
                "expected {} frequency values, got {}", self.num_points, freq.len()
            )));
        }
        let out = self.scoped(|| self.engine.adjoint(points, freq))?;
        Ok(match self.options.precision {
            Precision::Double => out,
            Precision::Single => out.mapv(round_single),
        })
    }

    fn points_ref(&self) -> Result<&Array2<f64>> {
        self.points.as_ref()
            .ok_or_else(|| Error::state("frequency points have not been set"))
    }

    // Run `f` under the plan's thread budget. A nonzero budget builds a
    // dedicated pool for the duration of the call; dropping it on scope exit
    // restores the ambient pool on every path, including panics.
    fn scoped<T: Send>(&self, f: impl FnOnce() -> T + Send) -> Result<T> {
        match self.options.thread_budget {
            0 => Ok(f()),
            n => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| Error::config(format!("could not build thread pool: {e}")))?;
                Ok(pool.install(f))
            }
        }
    }
}

fn round_single(v: Complex64) -> Complex64 {
    Complex64::new(v.re as f32 as f64, v.im as f32 as f64)
}
