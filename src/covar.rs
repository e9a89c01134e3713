//! Covariance backward projection.
//!
//! Streams the image source in batches to bound peak memory, accumulates the
//! outer products of centered back-projected images into a running
//! volume-matrix, and debiases the total by the expected per-pixel-noise
//! contribution (the Toeplitz expansion of the mean kernel).
//!
//! Every outer product carries weight 1/n, with n the *total* image count:
//! batches are summed, never averaged per batch, so the running total is an
//! unbiased accumulator over all n images regardless of where the batch
//! boundaries fall.

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array1;

use crate::error::{Error, Result};
use crate::kernel::FourierKernel;
use crate::nufft::Precision;
use crate::source::ImageSource;
use crate::utils::group_digits;
use crate::{Volume, VolumeMatrix};

#[derive(Clone, Copy, Debug)]
pub struct CovarOptions {
    pub batch_size: usize,
    pub precision: Precision,
}

impl Default for CovarOptions {
    fn default() -> Self {
        Self { batch_size: 512, precision: Precision::Single }
    }
}

/// Estimate the uncentered covariance volume-matrix of the source's images
/// around the estimated mean volume. `noise_var` is the per-pixel noise
/// variance; `mean_kernel` must be the kernel the mean was estimated with.
pub fn estimate_covariance(
    source: &dyn ImageSource,
    mean_volume: &Volume,
    mean_kernel: &FourierKernel,
    noise_var: f64,
    options: &CovarOptions,
) -> Result<VolumeMatrix> {
    if options.batch_size == 0 {
        return Err(Error::config("batch size must be positive".to_string()));
    }
    if noise_var < 0.0 {
        return Err(Error::config(format!("noise variance must be non-negative, got {noise_var}")));
    }
    let l = source.image_side_length();
    if mean_volume.dim() != (l, l, l) {
        return Err(Error::shape(format!(
            "mean volume has shape {:?}, source images have side {l}", mean_volume.dim()
        )));
    }
    if mean_kernel.side() != 2 * l {
        return Err(Error::shape(format!(
            "mean kernel grid side {} does not double the image side {l}", mean_kernel.side()
        )));
    }
    let n = source.image_count();
    if n == 0 {
        return Err(Error::config("image source is empty".to_string()));
    }

    let m = l * l * l;
    let mut accumulator = VolumeMatrix::zeros((m, m));
    let weight = 1.0 / n as f64;

    let bar = ProgressBar::new(n as u64);
    bar.set_style(ProgressStyle::default_bar()
        .template("Back-projecting: [{elapsed_precise}] {wide_bar} {pos}/{len}")
        .expect("static template is well-formed"));

    for start in (0..n).step_by(options.batch_size) {
        let count = options.batch_size.min(n - start);
        let images = source.read_images(start, count)?;
        let projections = source.forward_project(mean_volume, start, count)?;
        if images.len() != count || projections.len() != count {
            return Err(Error::shape(format!(
                "source returned {}/{} images for a batch of {count}",
                images.len(), projections.len()
            )));
        }
        for (offset, (image, projection)) in images.iter().zip(&projections).enumerate() {
            if image.dim() != (l, l) || projection.dim() != (l, l) {
                return Err(Error::shape(format!(
                    "batch image has shape {:?}, expected ({l}, {l})", image.dim()
                )));
            }
            let centered = image - projection;
            let volume = source.back_project(&centered, start + offset)?;
            if volume.dim() != (l, l, l) {
                return Err(Error::shape(format!(
                    "back-projection has shape {:?}, expected side {l}", volume.dim()
                )));
            }
            let v: Array1<f64> = volume.iter().copied().collect();
            let v = match options.precision {
                Precision::Double => v,
                Precision::Single => v.mapv(|x| x as f32 as f64),
            };
            for (i, &vi) in v.iter().enumerate() {
                accumulator.row_mut(i).scaled_add(weight * vi, &v);
            }
        }
        bar.inc(count as u64);
        log::debug!("covariance: accumulated images {start}..{}", start + count);
    }
    bar.finish_and_clear();

    if noise_var != 0.0 {
        accumulator.scaled_add(-noise_var, &mean_kernel.toeplitz()?);
    }
    log::info!("covariance: {} images of side {l} accumulated", group_digits(n));
    Ok(accumulator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Image;
    use float_eq::assert_float_eq;
    use ndarray::{Array2, Array3};
    use rand::{Rng, SeedableRng};
    use rand_isaac::Isaac64Rng;

    // Deterministic stand-in for an image source: preset images and
    // projections, and a back-projector that smears the image along the
    // first volume axis with a depth-dependent weight.
    struct StubSource {
        images: Vec<Image>,
        projections: Vec<Image>,
    }

    impl StubSource {
        fn random(n: usize, l: usize, seed: u64) -> Self {
            let mut rng = Isaac64Rng::seed_from_u64(seed);
            let mut random_images = |count: usize| -> Vec<Image> {
                (0..count)
                    .map(|_| Array2::from_shape_fn((l, l), |_| rng.gen_range(-1.0..1.0)))
                    .collect()
            };
            Self { images: random_images(n), projections: random_images(n) }
        }
    }

    impl ImageSource for StubSource {
        fn image_count(&self) -> usize { self.images.len() }

        fn image_side_length(&self) -> usize { self.images[0].nrows() }

        fn read_images(&self, start: usize, count: usize) -> Result<Vec<Image>> {
            Ok(self.images[start..start + count].to_vec())
        }

        fn forward_project(&self, _volume: &Volume, start: usize, count: usize)
            -> Result<Vec<Image>>
        {
            Ok(self.projections[start..start + count].to_vec())
        }

        fn back_project(&self, image: &Image, index: usize) -> Result<Volume> {
            let l = self.image_side_length();
            let scale = 1.0 + (index % 3) as f64;
            Ok(Array3::from_shape_fn((l, l, l), |(i, j, k)| {
                image[(j, k)] * scale * (i + 1) as f64 / l as f64
            }))
        }
    }

    fn direct_outer_product(source: &StubSource, options: &CovarOptions) -> VolumeMatrix {
        let l = source.image_side_length();
        let n = source.image_count();
        let m = l * l * l;
        let mut expected = VolumeMatrix::zeros((m, m));
        let weight = 1.0 / n as f64;
        for (index, (image, projection)) in
            source.images.iter().zip(&source.projections).enumerate()
        {
            let centered = image - projection;
            let volume = source.back_project(&centered, index).unwrap();
            let v: Array1<f64> = volume.iter().copied().collect();
            let v = match options.precision {
                Precision::Double => v,
                Precision::Single => v.mapv(|x| x as f32 as f64),
            };
            for (i, &vi) in v.iter().enumerate() {
                expected.row_mut(i).scaled_add(weight * vi, &v);
            }
        }
        expected
    }

    #[test]
    fn single_batch_equals_direct_mean_outer_product() {
        let source = StubSource::random(6, 3, 1);
        let mean = Array3::zeros((3, 3, 3));
        let kernel = FourierKernel::identity(3, 3);
        let options = CovarOptions { batch_size: 512, ..CovarOptions::default() };
        let got = estimate_covariance(&source, &mean, &kernel, 0.0, &options).unwrap();
        let expected = direct_outer_product(&source, &options);
        for (a, b) in got.iter().zip(expected.iter()) {
            assert_float_eq!(*a, *b, abs <= 1e-12);
        }
    }

    // The 1/n-per-term weighting makes the total independent of where the
    // batch boundaries fall.
    #[test]
    fn batch_size_does_not_change_the_estimate() {
        let source = StubSource::random(7, 3, 2);
        let mean = Array3::zeros((3, 3, 3));
        let kernel = FourierKernel::identity(3, 3);
        let small = CovarOptions { batch_size: 2, precision: Precision::Double };
        let large = CovarOptions { batch_size: 100, precision: Precision::Double };
        let a = estimate_covariance(&source, &mean, &kernel, 0.0, &small).unwrap();
        let b = estimate_covariance(&source, &mean, &kernel, 0.0, &large).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_float_eq!(*x, *y, abs <= 1e-12);
        }
    }

    #[test]
    fn noise_debias_subtracts_the_toeplitz_term() {
        let source = StubSource::random(4, 2, 3);
        let mean = Array3::zeros((2, 2, 2));
        let kernel = FourierKernel::identity(2, 3);
        let options = CovarOptions { batch_size: 512, precision: Precision::Double };
        let clean = estimate_covariance(&source, &mean, &kernel, 0.0, &options).unwrap();
        let noise_var = 0.25;
        let debiased = estimate_covariance(&source, &mean, &kernel, noise_var, &options).unwrap();
        // Identity kernel: the Toeplitz expansion is the identity matrix.
        for ((i, j), a) in clean.indexed_iter() {
            let expected = if i == j { a - noise_var } else { *a };
            assert_float_eq!(debiased[(i, j)], expected, abs <= 1e-12);
        }
    }

    #[test]
    fn invalid_inputs_are_rejected_eagerly() {
        let source = StubSource::random(3, 2, 4);
        let mean = Array3::zeros((2, 2, 2));
        let kernel = FourierKernel::identity(2, 3);

        let zero_batch = CovarOptions { batch_size: 0, ..CovarOptions::default() };
        assert!(matches!(
            estimate_covariance(&source, &mean, &kernel, 0.0, &zero_batch),
            Err(Error::Configuration(_))
        ));

        let wrong_mean = Array3::zeros((3, 3, 3));
        assert!(matches!(
            estimate_covariance(&source, &wrong_mean, &kernel, 0.0, &CovarOptions::default()),
            Err(Error::Shape(_))
        ));

        let wrong_kernel = FourierKernel::identity(3, 3);
        assert!(matches!(
            estimate_covariance(&source, &mean, &wrong_kernel, 0.0, &CovarOptions::default()),
            Err(Error::Shape(_))
        ));

        assert!(matches!(
            estimate_covariance(&source, &mean, &kernel, -1.0, &CovarOptions::default()),
            Err(Error::Configuration(_))
        ));
    }
}
