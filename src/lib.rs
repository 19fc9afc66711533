//! This crate converts raster images into black-and-white "coloring book" line art
//! and carries the small amount of publishing glue needed around that conversion:
//! PNG/base64 encoding, a framework-free conversion service, a parallel batch
//! processor, KDP publishing tables and subscription tiers.
//!
//! The filter is built on the `image` and `imageproc` crates.
//!
//! # Example
//! ```
//! use colorbook::{FilterParams, LineArtFilter};
//! use image::{Rgb, RgbImage};
//!
//! let img = RgbImage::from_pixel(32, 32, Rgb([128, 128, 128]));
//! let filter = LineArtFilter::new(FilterParams::default()).unwrap();
//! let art = filter.apply(&img).unwrap();
//!
//! assert_eq!(art.dimensions(), (32, 32));
//! assert!(art.pixels().all(|p| p.0 == [255, 255, 255]));
//! ```

/// Batch conversion of uploaded files, one independent outcome per file.
pub mod batch;
/// PNG encoding with physical DPI metadata and base64 wrapping.
pub mod encode;
/// The line-art filter pipeline.
pub mod filter;
/// KDP publishing tables: trim sizes, bleed, print resolution and margins.
pub mod kdp;
/// Conversion requests and responses, independent of any HTTP framework.
pub mod service;
/// Subscription tiers and the [`subscription::UsageTracker`] capability.
pub mod subscription;

use thiserror::Error;

pub use batch::{BatchReport, FileOutcome, UploadedFile};
pub use encode::EncodeError;
pub use filter::{apply, apply_dynamic, FilterParams, LineArtFilter};
pub use service::{ConversionOptions, ConversionResponse, Converter, ServiceError};
pub use subscription::{Action, InMemoryUsageTracker, SubscriptionTier, Unmetered, UsageTracker};

/// Errors produced by a single filter invocation.
///
/// The filter never recovers internally: a failure aborts the invocation and is
/// handed back to the caller, which decides how to surface it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    /// The filter parameters cannot be used, e.g. an even `block_size`.
    #[error("Invalid filter configuration: {0}")]
    ConfigurationError(String),

    /// The image is empty, malformed or could not be decoded.
    #[error("Invalid input image: {0}")]
    InputError(String),
}
