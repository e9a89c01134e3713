pub use crate::error::{Error, Result};
pub use crate::nufft::{Backend, Plan, PlanOptions, Precision};
pub use crate::kernel::FourierKernel;
pub use crate::cg::{CgConfig, CgDiagnostics, CgSolution, FnOperator, LinearOperator};
pub use crate::basis::{Basis, VoxelBasis};
pub use crate::source::ImageSource;
pub use crate::mean::{MeanEstimator, MeanOptions};
pub use crate::covar::{estimate_covariance, CovarOptions};
pub use crate::fom::Fom;

/// Voxel intensities of a cubic reconstruction volume of side L.
pub type Volume = ndarray::Array3<f64>;
/// A single square projection image of side L.
pub type Image = ndarray::Array2<f64>;
/// Basis coefficients of a volume, as produced by a `Basis`.
pub type Coefficients = ndarray::Array1<f64>;
/// Covariance structure over pairs of voxels, flattened to (L³, L³).
pub type VolumeMatrix = ndarray::Array2<f64>;
