//! Frequency-domain convolution kernels.
//!
//! A projection followed by back-projection is a convolution, so the whole
//! composite can be captured once as a Fourier array on the doubled grid
//! (2L)^d and then applied to any volume with two uniform FFTs. The doubled
//! grid makes the circular convolution exact for voxel-index differences in
//! (-L, L), which is all a Toeplitz operator ever produces.

use itertools::iproduct;
use ndarray::{Array1, Array2, ArrayD, Ix3};
use num_complex::Complex64;
use num_traits::Zero;

use crate::basis::Basis;
use crate::error::{Error, Result};
use crate::fft;

#[derive(Clone)]
pub struct FourierKernel {
    data: ArrayD<Complex64>,
}

impl FourierKernel {
    /// Wrap a non-centered Fourier array of shape (2L)^d, d ∈ 1..=3.
    pub fn new(data: ArrayD<Complex64>) -> Result<Self> {
        let d = data.ndim();
        if d == 0 || d > 3 {
            return Err(Error::shape(format!("kernel must have 1 to 3 dimensions, got {d}")));
        }
        let side = data.shape()[0];
        if data.shape().iter().any(|&n| n != side) {
            return Err(Error::shape(format!("kernel grid must be cubic, got {:?}", data.shape())));
        }
        if side % 2 != 0 {
            return Err(Error::shape(format!("doubled kernel grid must have even side, got {side}")));
        }
        Ok(Self { data })
    }

    /// Build the kernel from its *centered* spatial representation on the
    /// doubled grid, e.g. straight from an adjoint transform of unit weights.
    pub fn from_centered_spatial(spatial: &ArrayD<Complex64>) -> Result<Self> {
        let mut data = fft::ifftshift(spatial);
        fft::fftn(&mut data);
        Self::new(data)
    }

    /// The identity kernel for volumes of side `signal_side`: convolution
    /// with a unit impulse.
    pub fn identity(signal_side: usize, dims: usize) -> Self {
        let shape = vec![2 * signal_side; dims];
        Self { data: ArrayD::from_elem(shape, Complex64::new(1.0, 0.0)) }
    }

    /// Side of the doubled grid, 2L.
    pub fn side(&self) -> usize {
        self.data.shape()[0]
    }

    /// Side of the volumes this kernel convolves, L.
    pub fn signal_side(&self) -> usize {
        self.side() / 2
    }

    pub fn dimensions(&self) -> usize {
        self.data.ndim()
    }

    pub fn as_array(&self) -> &ArrayD<Complex64> {
        &self.data
    }

    /// Kernel with λ added uniformly: the operator becomes K + λI.
    pub fn regularized(&self, lambda: f64) -> Result<Self> {
        if !(lambda >= 0.0) {
            return Err(Error::config(format!("regularizer must be non-negative, got {lambda}")));
        }
        Ok(Self { data: self.data.mapv(|v| v + lambda) })
    }

    /// Pointwise reciprocal, with exact zeros left at zero. Applied to a
    /// (regularized) kernel this yields the standard circulant
    /// preconditioner for the normal equations.
    pub fn reciprocal(&self) -> Self {
        Self {
            data: self.data.mapv(|v| {
                if v.is_zero() { Complex64::zero() } else { v.inv() }
            }),
        }
    }

    /// Apply the convolution to basis coefficients: inverse-map to a volume,
    /// zero-pad to the doubled grid, multiply in the Fourier domain, crop
    /// back, forward-map to coefficients. Linear, and symmetric positive
    /// semi-definite whenever the kernel comes from a genuine
    /// projection/back-projection composite.
    pub fn apply(&self, coeff: &Array1<f64>, basis: &dyn Basis) -> Result<Array1<f64>> {
        if self.dimensions() != 3 {
            return Err(Error::shape("only 3-dimensional kernels convolve volumes".to_string()));
        }
        let volume = basis.from_coefficients(coeff)?;
        let side = volume.dim().0;
        if 2 * side != self.side() {
            return Err(Error::shape(format!(
                "kernel grid side {} does not double the volume side {side}", self.side()
            )));
        }
        let complex = volume.mapv(|v| Complex64::new(v, 0.0)).into_dyn();
        let mut padded = fft::pad_centered(&complex, self.side())?;
        fft::fftn(&mut padded);
        padded *= &self.data;
        fft::ifftn(&mut padded);
        let cropped = fft::crop_centered(&padded, side)?;
        let spatial = cropped
            .mapv(|v| v.re)
            .into_dimensionality::<Ix3>()
            .expect("cropped grid is cubic and 3-dimensional");
        basis.to_coefficients(&spatial)
    }

    /// Toeplitz expansion: the L³×L³ volume-matrix whose (i, j) entry is the
    /// spatial kernel at the voxel-index difference i-j. This is the expected
    /// contribution of unit-variance per-pixel noise to an uncentered
    /// covariance built from this kernel's back-projections.
    pub fn toeplitz(&self) -> Result<Array2<f64>> {
        if self.dimensions() != 3 {
            return Err(Error::shape("the Toeplitz expansion needs a 3-dimensional kernel".to_string()));
        }
        let mut spatial = self.data.clone();
        fft::ifftn(&mut spatial);
        let spatial = spatial.as_slice().expect("owned array is contiguous");
        let m = self.side() as isize;
        let l = self.signal_side();
        let n = l * l * l;
        let mut out = Array2::zeros((n, n));
        for (i, (i0, i1, i2)) in iproduct!(0..l, 0..l, 0..l).enumerate() {
            for (j, (j0, j1, j2)) in iproduct!(0..l, 0..l, 0..l).enumerate() {
                let z0 = (i0 as isize - j0 as isize).rem_euclid(m) as usize;
                let z1 = (i1 as isize - j1 as isize).rem_euclid(m) as usize;
                let z2 = (i2 as isize - j2 as isize).rem_euclid(m) as usize;
                out[(i, j)] = spatial[(z0 * m as usize + z1) * m as usize + z2].re;
            }
        }
        Ok(out)
    }
}
