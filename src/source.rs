//! Contract for collections of projection images.
//!
//! Loading experimental data, simulating synthetic images and the imaging
//! geometry itself all live behind this interface; the estimators only ever
//! stream images and ask the source to project/back-project at the imaging
//! parameters of a given image index.

use crate::error::Result;
use crate::{Image, Volume};

pub trait ImageSource {
    /// Total number of images in the collection.
    fn image_count(&self) -> usize;

    /// Side length L of every (square) image.
    fn image_side_length(&self) -> usize;

    /// Load images `start .. start + count`.
    fn read_images(&self, start: usize, count: usize) -> Result<Vec<Image>>;

    /// Project `volume` at the imaging parameters of images
    /// `start .. start + count`.
    fn forward_project(&self, volume: &Volume, start: usize, count: usize) -> Result<Vec<Image>>;

    /// Back-project one image at the imaging parameters of image `index`.
    fn back_project(&self, image: &Image, index: usize) -> Result<Volume>;
}
