//! Exact direct-summation backend.
//!
//! Evaluates the defining sums term by term: O(N·K), no approximation beyond
//! floating point. The other backends are tested against this one.

use ndarray::{Array1, Array2, ArrayD, IxDyn};
use num_complex::Complex64;
use rayon::prelude::*;

use super::Transformer;

pub(crate) struct Direct {
    sz: Vec<usize>,
    centre: Vec<f64>,
}

impl Direct {
    pub fn new(sz: &[usize]) -> Self {
        let centre = sz.iter().map(|&n| (n / 2) as f64).collect();
        Self { sz: sz.to_vec(), centre }
    }
}

impl Transformer for Direct {
    fn transform(&self, points: &Array2<f64>, signal: &ArrayD<Complex64>) -> Array1<Complex64> {
        let mut out = Array1::zeros(points.ncols());
        out.as_slice_mut()
            .expect("freshly allocated output is contiguous")
            .par_iter_mut()
            .enumerate()
            .for_each(|(k, o)| {
                let t = points.column(k);
                let mut sum = Complex64::default();
                for (idx, &v) in signal.indexed_iter() {
                    let mut phase = 0.0;
                    for (d, c) in self.centre.iter().enumerate() {
                        phase += t[d] * (idx[d] as f64 - c);
                    }
                    sum += v * Complex64::from_polar(1.0, -phase);
                }
                *o = sum;
            });
        out
    }

    fn adjoint(&self, points: &Array2<f64>, freq: &Array1<Complex64>) -> ArrayD<Complex64> {
        let mut out = ArrayD::zeros(IxDyn(&self.sz));
        let sz = &self.sz;
        out.as_slice_mut()
            .expect("freshly allocated output is contiguous")
            .par_iter_mut()
            .enumerate()
            .for_each(|(lin, o)| {
                // Unravel the linear (C-order) index into a multi-index, since
                // `Zip::indexed` requires a `Copy` dimension and `IxDyn` is not.
                let mut idx = vec![0usize; sz.len()];
                let mut rem = lin;
                for d in (0..sz.len()).rev() {
                    idx[d] = rem % sz[d];
                    rem /= sz[d];
                }
                let mut sum = Complex64::default();
                for (k, &f) in freq.iter().enumerate() {
                    let mut phase = 0.0;
                    for (d, c) in self.centre.iter().enumerate() {
                        phase += points[(d, k)] * (idx[d] as f64 - c);
                    }
                    sum += f * Complex64::from_polar(1.0, phase);
                }
                *o = sum;
            });
        out
    }
}
