//! Converts a color image into black-and-white line art.
//!
//! The pipeline runs in a fixed order on the whole image:
//! luma reduction, 5x5 Gaussian smoothing, adaptive mean thresholding,
//! optional 3x3 closing, optional inversion and finally expansion back to three
//! identical channels.

pub mod blur;
pub mod luma;
pub mod morphology;
mod params;
pub mod threshold;

use image::*;
use serde::{Deserialize, Serialize};
use tracing::*;

use crate::FilterError;

pub use params::FilterParams;

pub const WHITE: u8 = 255;
pub const BLACK: u8 = 0;

const MIN_BLOCK_SIZE: u32 = 3;
const DEFAULT_THRESHOLD: i32 = 127;
const DEFAULT_BLOCK_SIZE: u32 = 11;
const DEFAULT_C_VALUE: f64 = 2.0;

/// Runs the line-art pipeline on an RGB image.
///
/// # Errors
/// [`FilterError::ConfigurationError`] for invalid parameters,
/// [`FilterError::InputError`] for an image with a zero dimension.
///
/// # Example
/// ```
/// use colorbook::{apply, FilterParams};
/// use image::{Rgb, RgbImage};
///
/// let img = RgbImage::from_pixel(100, 100, Rgb([128, 128, 128]));
/// let params = FilterParams { invert_colors: true, ..FilterParams::default() };
/// let art = apply(&img, &params).unwrap();
/// assert!(art.pixels().all(|p| p.0 == [0, 0, 0]));
/// ```
pub fn apply(image: &RgbImage, params: &FilterParams) -> Result<RgbImage, FilterError> {
    params.validate()?;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        error!(
            "Invalid image dimensions: width={}, height={}",
            width, height
        );
        return Err(FilterError::InputError(format!(
            "image is empty: width={width}, height={height}"
        )));
    }
    debug!(
        "Applying line-art filter to {}x{} image with {:?}",
        width, height, params
    );

    let gray = luma::to_luma(image);
    let binary = binarize(&gray, params);
    Ok(expand_channels(&binary))
}

/// Same as [`apply`] but accepts any decoded image, normalizing it to RGB first.
pub fn apply_dynamic(
    image: &DynamicImage,
    params: &FilterParams,
) -> Result<RgbImage, FilterError> {
    apply(&image.to_rgb8(), params)
}

/// The single-channel part of the pipeline: blur, threshold, closing, inversion.
///
/// `params` is assumed valid.
pub fn binarize(gray: &GrayImage, params: &FilterParams) -> GrayImage {
    let blurred = blur::gaussian_blur_5x5(gray);
    let mut binary =
        threshold::adaptive_mean_threshold(&blurred, params.block_size, params.c_value);
    if params.enhance_lines {
        binary = morphology::close_lines(&binary);
    }
    if params.invert_colors {
        imageops::invert(&mut binary);
    }
    binary
}

/// Replicates a single channel into three identical ones.
pub fn expand_channels(binary: &GrayImage) -> RgbImage {
    RgbImage::from_fn(binary.width(), binary.height(), |x, y| {
        let Luma([v]) = *binary.get_pixel(x, y);
        Rgb([v, v, v])
    })
}

/// A validated filter configuration that can be applied to many images.
///
/// # Example
/// ```
/// use colorbook::{FilterError, FilterParams, LineArtFilter};
///
/// let err = LineArtFilter::new(FilterParams { block_size: 10, ..Default::default() });
/// assert!(matches!(err, Err(FilterError::ConfigurationError(_))));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LineArtFilter {
    params: FilterParams,
}

impl LineArtFilter {
    pub fn new(params: FilterParams) -> Result<Self, FilterError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    pub fn apply(&self, image: &RgbImage) -> Result<RgbImage, FilterError> {
        apply(image, &self.params)
    }

    pub fn apply_dynamic(&self, image: &DynamicImage) -> Result<RgbImage, FilterError> {
        apply_dynamic(image, &self.params)
    }
}

impl TryFrom<FilterParams> for LineArtFilter {
    type Error = FilterError;

    fn try_from(params: FilterParams) -> Result<Self, Self::Error> {
        LineArtFilter::new(params)
    }
}
