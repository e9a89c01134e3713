//! Figures of merit for comparing volume-matrix estimates against ground
//! truth, evaluated independently per trailing ("series") index.

use ndarray::{ArrayD, Axis};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fom {
    /// ‖truth - estimate‖ / ‖truth‖ (Frobenius norms).
    pub relative_error: f64,
    /// ⟨truth, estimate⟩ / (‖truth‖·‖estimate‖), in [-1, 1].
    pub correlation: f64,
}

/// Compare two equally-shaped tensors slice by slice along the last axis.
///
/// For the covariance use case the inputs are (L,L,L,L,L,L,K) volume-matrix
/// stacks, but any rank ≥ 1 works the same way.
pub fn evaluate(truth: &ArrayD<f64>, estimate: &ArrayD<f64>) -> Result<Vec<Fom>> {
    if truth.shape() != estimate.shape() {
        return Err(Error::shape(format!(
            "truth has shape {:?}, estimate has shape {:?}", truth.shape(), estimate.shape()
        )));
    }
    if truth.ndim() == 0 {
        return Err(Error::shape("evaluation needs at least one axis".to_string()));
    }
    let axis = Axis(truth.ndim() - 1);
    truth.axis_iter(axis).zip(estimate.axis_iter(axis))
        .map(|(t, e)| {
            let mut dot = 0.0;
            let mut t_sq = 0.0;
            let mut e_sq = 0.0;
            let mut diff_sq = 0.0;
            for (&a, &b) in t.iter().zip(e.iter()) {
                dot += a * b;
                t_sq += a * a;
                e_sq += b * b;
                diff_sq += (a - b) * (a - b);
            }
            let t_norm = t_sq.sqrt();
            let e_norm = e_sq.sqrt();
            let relative_error = if t_norm == 0.0 {
                if diff_sq == 0.0 { 0.0 } else { f64::INFINITY }
            } else {
                diff_sq.sqrt() / t_norm
            };
            let correlation = if t_norm == 0.0 || e_norm == 0.0 {
                0.0
            } else {
                (dot / (t_norm * e_norm)).clamp(-1.0, 1.0)
            };
            Ok(Fom { relative_error, correlation })
        })
        .collect()
}

pub fn relative_error(truth: &ArrayD<f64>, estimate: &ArrayD<f64>) -> Result<Vec<f64>> {
    Ok(evaluate(truth, estimate)?.iter().map(|f| f.relative_error).collect())
}

pub fn correlation(truth: &ArrayD<f64>, estimate: &ArrayD<f64>) -> Result<Vec<f64>> {
    Ok(evaluate(truth, estimate)?.iter().map(|f| f.correlation).collect())
}
