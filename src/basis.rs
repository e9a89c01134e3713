//! Linear, invertible mappings between voxel volumes and coefficient vectors.
//!
//! Estimation algorithms never look inside a basis: they only round-trip
//! volumes through this capability interface.

use ndarray::{Array1, Array3};

use crate::error::{Error, Result};

pub trait Basis {
    /// Length of the coefficient vector.
    fn count(&self) -> usize;

    fn to_coefficients(&self, volume: &Array3<f64>) -> Result<Array1<f64>>;

    fn from_coefficients(&self, coeff: &Array1<f64>) -> Result<Array3<f64>>;
}

/// The identity basis: coefficients are the voxel intensities themselves, in
/// standard (row-major) order. `count` is L³.
pub struct VoxelBasis {
    side: usize,
}

impl VoxelBasis {
    pub fn new(side: usize) -> Self {
        Self { side }
    }

    pub fn side(&self) -> usize {
        self.side
    }
}

impl Basis for VoxelBasis {
    fn count(&self) -> usize {
        self.side.pow(3)
    }

    fn to_coefficients(&self, volume: &Array3<f64>) -> Result<Array1<f64>> {
        let expected = (self.side, self.side, self.side);
        if volume.dim() != expected {
            return Err(Error::shape(format!(
                "volume has shape {:?}, basis expects {expected:?}", volume.dim()
            )));
        }
        Ok(volume.iter().copied().collect())
    }

    fn from_coefficients(&self, coeff: &Array1<f64>) -> Result<Array3<f64>> {
        if coeff.len() != self.count() {
            return Err(Error::shape(format!(
                "coefficient vector has length {}, basis expects {}",
                coeff.len(), self.count()
            )));
        }
        let shape = (self.side, self.side, self.side);
        Ok(Array3::from_shape_vec(shape, coeff.to_vec())
            .expect("length checked against side³ above"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use pretty_assertions::assert_eq;

    #[test]
    fn voxel_basis_roundtrip() {
        let basis = VoxelBasis::new(3);
        let volume = Array3::from_shape_fn((3, 3, 3), |(i, j, k)| (i * 9 + j * 3 + k) as f64);
        let coeff = basis.to_coefficients(&volume).unwrap();
        assert_eq!(coeff.len(), basis.count());
        let back = basis.from_coefficients(&coeff).unwrap();
        assert_eq!(back, volume);
    }

    #[test]
    fn shape_mismatches_are_rejected() {
        let basis = VoxelBasis::new(4);
        let wrong = Array3::zeros((4, 4, 3));
        assert!(matches!(basis.to_coefficients(&wrong), Err(Error::Shape(_))));
        let short = ndarray::Array1::zeros(63);
        assert!(matches!(basis.from_coefficients(&short), Err(Error::Shape(_))));
    }
}
