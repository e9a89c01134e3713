//! Uniform d-dimensional FFT plumbing on top of rustfft (d ≤ 3).
//!
//! Conventions follow NumPy: `fftn` is unnormalized, `ifftn` carries the 1/N
//! factor, so `ifftn(fftn(x)) == x`. Axes of length 1 are skipped, which lets
//! the same code serve 1-, 2- and 3-dimensional signals.

use ndarray::{ArrayD, Axis, IxDyn, SliceInfoElem};
use num_complex::Complex64;
use rustfft::{FftDirection, FftPlanner};

use crate::error::{Error, Result};

fn transform_axes(data: &mut ArrayD<Complex64>, direction: FftDirection) {
    let mut planner = FftPlanner::new();
    for ax in 0..data.ndim() {
        let n = data.len_of(Axis(ax));
        if n <= 1 { continue; }
        let fft = planner.plan_fft(n, direction);
        // Lanes along non-leading axes are strided: gather into a contiguous
        // buffer, transform, scatter back.
        let mut buffer = vec![Complex64::default(); n];
        for mut lane in data.lanes_mut(Axis(ax)) {
            for (b, v) in buffer.iter_mut().zip(lane.iter()) { *b = *v }
            fft.process(&mut buffer);
            for (v, b) in lane.iter_mut().zip(buffer.iter()) { *v = *b }
        }
    }
}

/// In-place forward FFT over every axis, unnormalized.
pub fn fftn(data: &mut ArrayD<Complex64>) {
    transform_axes(data, FftDirection::Forward)
}

/// In-place inverse FFT over every axis, with the 1/N normalization.
pub fn ifftn(data: &mut ArrayD<Complex64>) {
    ifftn_unscaled(data);
    let scale = 1.0 / data.len() as f64;
    data.mapv_inplace(|v| v * scale);
}

/// Inverse FFT without the 1/N factor: computes `Σ_j a[j]·exp(+2πi jk/N)`.
pub(crate) fn ifftn_unscaled(data: &mut ArrayD<Complex64>) {
    transform_axes(data, FftDirection::Inverse)
}

fn roll(data: &ArrayD<Complex64>, shift_of: fn(usize) -> usize) -> ArrayD<Complex64> {
    let shape = data.shape().to_vec();
    let mut out = ArrayD::zeros(IxDyn(&shape));
    let mut to = vec![0; shape.len()];
    for (idx, &v) in data.indexed_iter() {
        for (d, t) in to.iter_mut().enumerate() {
            *t = (idx[d] + shift_of(shape[d])) % shape[d];
        }
        out[IxDyn(&to)] = v;
    }
    out
}

/// Move the zero-frequency element to the centre of every axis.
pub fn fftshift(data: &ArrayD<Complex64>) -> ArrayD<Complex64> {
    roll(data, |n| n / 2)
}

/// Inverse of `fftshift`.
pub fn ifftshift(data: &ArrayD<Complex64>) -> ArrayD<Complex64> {
    roll(data, |n| n - n / 2)
}

fn centered_window(small: &[usize], big: &[usize]) -> Result<Vec<SliceInfoElem>> {
    if small.iter().zip(big).any(|(&n, &m)| n > m) {
        return Err(Error::shape(format!(
            "cannot centre shape {small:?} inside a grid of shape {big:?}"
        )));
    }
    Ok(small.iter().zip(big)
        .map(|(&n, &m)| {
            let start = (m / 2 - n / 2) as isize;
            SliceInfoElem::Slice { start, end: Some(start + n as isize), step: 1 }
        })
        .collect())
}

/// Embed `src` in the centre of a zero grid with every axis of length `side`.
///
/// "Centre" means centered-index alignment: the element with centered index 0
/// (storage position ⌊n/2⌋) lands at storage position ⌊side/2⌋.
pub fn pad_centered(src: &ArrayD<Complex64>, side: usize) -> Result<ArrayD<Complex64>> {
    let big = vec![side; src.ndim()];
    let window = centered_window(src.shape(), &big)?;
    let mut out = ArrayD::zeros(IxDyn(&big));
    out.slice_mut(window.as_slice()).assign(src);
    Ok(out)
}

/// Extract the centered window with every axis of length `side` from `src`.
pub fn crop_centered(src: &ArrayD<Complex64>, side: usize) -> Result<ArrayD<Complex64>> {
    let small = vec![side; src.ndim()];
    let window = centered_window(&small, src.shape())?;
    Ok(src.slice(window.as_slice()).to_owned())
}

pub fn to_complex(data: &ArrayD<f64>) -> ArrayD<Complex64> {
    data.mapv(|v| Complex64::new(v, 0.0))
}

pub fn real_part(data: &ArrayD<Complex64>) -> ArrayD<f64> {
    data.mapv(|v| v.re)
}
