//! The image-to-coloring conversion request, minus the HTTP framework.
//!
//! A web layer hands over the uploaded file and the raw form fields; this
//! module parses options, runs the filter, encodes a 300 DPI PNG and builds the
//! JSON envelope. Every failure is a typed [`ServiceError`] carrying the status
//! code the web layer should answer with.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::batch::{self, BatchReport, UploadedFile};
use crate::encode::{self, EncodeError};
use crate::filter::{FilterParams, LineArtFilter};
use crate::kdp::PRINT_DPI;
use crate::subscription::{Action, Unmetered, UsageTracker};
use crate::FilterError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("No image file provided")]
    MissingImage,

    #[error("No image file selected")]
    EmptyFilename,

    #[error("No files provided")]
    NoFiles,

    #[error("Invalid value {value:?} for option {field}")]
    InvalidOption { field: &'static str, value: String },

    #[error("Unsupported file type: {filename}")]
    UnsupportedFile { filename: String },

    #[error("User {user_id} is not allowed to perform {action:?}")]
    QuotaExceeded { user_id: String, action: Action },

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl ServiceError {
    /// HTTP status a web layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingImage
            | Self::EmptyFilename
            | Self::NoFiles
            | Self::InvalidOption { .. }
            | Self::UnsupportedFile { .. }
            | Self::Filter(_) => 400,
            Self::QuotaExceeded { .. } => 403,
            Self::Encode(_) => 500,
        }
    }
}

/// Failure envelope returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        Self {
            error: format!("Conversion failed: {err}"),
        }
    }
}

/// Filter parameters and caller identity extracted from a request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConversionOptions {
    pub params: FilterParams,
    pub user_id: Option<String>,
}

fn parse_field<T: FromStr>(
    form: &HashMap<String, String>,
    field: &'static str,
    default: T,
) -> Result<T, ServiceError> {
    match form.get(field) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ServiceError::InvalidOption {
            field,
            value: raw.clone(),
        }),
    }
}

/// Form booleans are true only when spelled `true`, ignoring case.
fn parse_flag(form: &HashMap<String, String>, field: &str, default: bool) -> bool {
    form.get(field)
        .map_or(default, |raw| raw.eq_ignore_ascii_case("true"))
}

impl ConversionOptions {
    /// Reads the conversion options from raw form fields, falling back to the
    /// defaults for anything missing.
    ///
    /// # Example
    /// ```
    /// use colorbook::ConversionOptions;
    /// use std::collections::HashMap;
    ///
    /// let form = HashMap::from([
    ///     ("block_size".to_string(), "15".to_string()),
    ///     ("invert_colors".to_string(), "True".to_string()),
    /// ]);
    /// let options = ConversionOptions::from_form(&form).unwrap();
    /// assert_eq!(options.params.block_size, 15);
    /// assert!(options.params.invert_colors);
    /// assert!(options.params.enhance_lines);
    /// ```
    pub fn from_form(form: &HashMap<String, String>) -> Result<Self, ServiceError> {
        let defaults = FilterParams::default();
        let params = FilterParams::new(
            parse_field(form, "threshold", defaults.threshold)?,
            parse_field(form, "block_size", defaults.block_size)?,
            parse_field(form, "c_value", defaults.c_value)?,
            parse_flag(form, "invert_colors", defaults.invert_colors),
            parse_flag(form, "enhance_lines", defaults.enhance_lines),
        );
        let user_id = form
            .get("user_id")
            .filter(|id| !id.is_empty())
            .cloned();
        Ok(Self { params, user_id })
    }
}

/// Success envelope of a single conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionResponse {
    pub success: bool,
    /// Base64 PNG.
    pub image_data: String,
    pub file_size_mb: f64,
    pub processing_options: FilterParams,
}

/// A conversion request as received from a multipart upload.
#[derive(Debug, Clone, Default)]
pub struct ConversionRequest {
    pub image: Option<UploadedFile>,
    pub form: HashMap<String, String>,
}

/// Decodes uploaded bytes and normalizes them to RGB before filtering.
pub fn decode_and_filter(
    bytes: &[u8],
    filter: &LineArtFilter,
) -> Result<image::RgbImage, ServiceError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| FilterError::InputError(format!("failed to decode image: {e}")))?;
    Ok(filter.apply_dynamic(&decoded)?)
}

/// Runs conversions on behalf of users, consulting a [`UsageTracker`].
pub struct Converter {
    tracker: Arc<dyn UsageTracker>,
    dpi: u32,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(Arc::new(Unmetered))
    }
}

impl Converter {
    pub fn new(tracker: Arc<dyn UsageTracker>) -> Self {
        Self {
            tracker,
            dpi: PRINT_DPI,
        }
    }

    /// Overrides the resolution written into single-conversion PNGs.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn tracker(&self) -> &dyn UsageTracker {
        self.tracker.as_ref()
    }

    /// Reserves one `action` for the user, counting it right away so concurrent
    /// requests cannot overrun the quota. Anonymous callers are not metered.
    fn acquire(&self, user_id: Option<&str>, action: Action) -> Result<(), ServiceError> {
        match user_id {
            Some(user_id) if !self.tracker.try_acquire(user_id, action) => {
                info!("Denied {:?} for user {}", action, user_id);
                Err(ServiceError::QuotaExceeded {
                    user_id: user_id.to_string(),
                    action,
                })
            }
            _ => Ok(()),
        }
    }

    fn refund(&self, user_id: Option<&str>, action: Action) {
        if let Some(user_id) = user_id {
            debug!("Refunding {:?} for user {}", action, user_id);
            self.tracker.release(user_id, action);
        }
    }

    /// Full request handling: validates the upload, parses the form and converts.
    pub fn handle(&self, request: &ConversionRequest) -> Result<ConversionResponse, ServiceError> {
        let image = request.image.as_ref().ok_or(ServiceError::MissingImage)?;
        if image.filename.is_empty() {
            return Err(ServiceError::EmptyFilename);
        }
        let options = ConversionOptions::from_form(&request.form)?;
        self.convert(image, &options).inspect_err(|e| {
            error!("Image to coloring conversion failed: {}", e);
        })
    }

    /// Converts one uploaded image into a coloring page.
    pub fn convert(
        &self,
        file: &UploadedFile,
        options: &ConversionOptions,
    ) -> Result<ConversionResponse, ServiceError> {
        let user_id = options.user_id.as_deref();
        self.acquire(user_id, Action::Conversion)?;
        self.render(file, options)
            .inspect_err(|_| self.refund(user_id, Action::Conversion))
    }

    fn render(
        &self,
        file: &UploadedFile,
        options: &ConversionOptions,
    ) -> Result<ConversionResponse, ServiceError> {
        let filter = LineArtFilter::new(options.params)?;
        let art = decode_and_filter(&file.bytes, &filter)?;
        let png = encode::encode_png(&art, Some(self.dpi))?;
        debug!("Converted {} -> {} bytes", file.filename, png.len());

        Ok(ConversionResponse {
            success: true,
            image_data: encode::to_base64(&png),
            file_size_mb: encode::file_size_mb(png.len()),
            processing_options: options.params,
        })
    }

    /// Converts every uploaded image with default parameters. One file failing
    /// never affects the others; only an empty upload or a denied user fails
    /// the whole batch.
    pub fn process_batch(
        &self,
        files: &[UploadedFile],
        user_id: Option<&str>,
    ) -> Result<BatchReport, ServiceError> {
        if files.is_empty() {
            return Err(ServiceError::NoFiles);
        }
        self.acquire(user_id, Action::BatchProcessing)?;
        Ok(batch::process_batch(files, &LineArtFilter::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{InMemoryUsageTracker, SubscriptionTier};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use image::{Rgb, RgbImage};
    use test_case::test_case;

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn gray_png() -> UploadedFile {
        let img = RgbImage::from_pixel(24, 16, Rgb([128, 128, 128]));
        let bytes = encode::encode_png(&img, None).unwrap();
        UploadedFile::new("page.png", bytes)
    }

    #[test]
    fn test_form_defaults() {
        let options = ConversionOptions::from_form(&HashMap::new()).unwrap();
        assert_eq!(options.params, FilterParams::default());
        assert_eq!(options.user_id, None);
    }

    #[test_case("true" => true ; "lowercase")]
    #[test_case("TRUE" => true ; "uppercase")]
    #[test_case("yes" => false ; "yes is not true")]
    #[test_case("1" => false ; "one is not true")]
    fn test_form_flag(raw: &str) -> bool {
        let options = ConversionOptions::from_form(&form(&[("invert_colors", raw)])).unwrap();
        options.params.invert_colors
    }

    #[test]
    fn test_enhance_lines_can_be_disabled() {
        let options = ConversionOptions::from_form(&form(&[("enhance_lines", "false")])).unwrap();
        assert!(!options.params.enhance_lines);
    }

    #[test]
    fn test_form_rejects_bad_numbers() {
        let err = ConversionOptions::from_form(&form(&[("block_size", "eleven")])).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidOption {
                field: "block_size",
                ..
            }
        ));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_form_numbers() {
        let options = ConversionOptions::from_form(&form(&[
            ("threshold", "90"),
            ("c_value", "3.5"),
            ("user_id", "u-1"),
        ]))
        .unwrap();
        assert_eq!(options.params.threshold, 90);
        assert_eq!(options.params.c_value, 3.5);
        assert_eq!(options.user_id.as_deref(), Some("u-1"));
    }

    #[test]
    fn test_convert_gray_page() {
        let response = Converter::default()
            .convert(&gray_png(), &ConversionOptions::default())
            .unwrap();
        assert!(response.success);
        assert_eq!(response.processing_options, FilterParams::default());

        let png = STANDARD.decode(&response.image_data).unwrap();
        assert_eq!(response.file_size_mb, encode::file_size_mb(png.len()));
        let art = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(art.dimensions(), (24, 16));
        assert!(art.pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn test_handle_missing_image() {
        let err = Converter::default()
            .handle(&ConversionRequest::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::MissingImage));
    }

    #[test]
    fn test_handle_empty_filename() {
        let request = ConversionRequest {
            image: Some(UploadedFile::new("", vec![1, 2, 3])),
            form: HashMap::new(),
        };
        let err = Converter::default().handle(&request).unwrap_err();
        assert!(matches!(err, ServiceError::EmptyFilename));
    }

    #[test]
    fn test_handle_invalid_block_size() {
        let request = ConversionRequest {
            image: Some(gray_png()),
            form: form(&[("block_size", "10")]),
        };
        let err = Converter::default().handle(&request).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Filter(FilterError::ConfigurationError(_))
        ));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_undecodable_upload_is_input_error() {
        let file = UploadedFile::new("broken.png", b"not an image".to_vec());
        let err = Converter::default()
            .convert(&file, &ConversionOptions::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Filter(FilterError::InputError(_))));
        assert!(ErrorResponse::from(&err)
            .error
            .starts_with("Conversion failed:"));
    }

    #[test]
    fn test_conversions_are_metered() {
        let tracker = Arc::new(InMemoryUsageTracker::new());
        let converter = Converter::new(tracker.clone());
        let options = ConversionOptions {
            user_id: Some("free-user".to_string()),
            ..ConversionOptions::default()
        };
        for _ in 0..5 {
            converter.convert(&gray_png(), &options).unwrap();
        }
        assert_eq!(tracker.usage("free-user").conversions, 5);

        let err = converter.convert(&gray_png(), &options).unwrap_err();
        assert!(matches!(err, ServiceError::QuotaExceeded { .. }));
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn test_concurrent_conversions_respect_quota() {
        let tracker = Arc::new(InMemoryUsageTracker::new());
        let converter = Converter::new(tracker.clone());
        let options = ConversionOptions {
            user_id: Some("free".to_string()),
            ..ConversionOptions::default()
        };
        let file = gray_png();
        let barrier = std::sync::Barrier::new(16);

        let results: Vec<bool> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        converter.convert(&file, &options).is_ok()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|ok| **ok).count(), 5);
        assert_eq!(tracker.usage("free").conversions, 5);
    }

    #[test]
    fn test_failed_conversion_is_not_metered() {
        let tracker = Arc::new(InMemoryUsageTracker::new());
        let converter = Converter::new(tracker.clone());
        let options = ConversionOptions {
            user_id: Some("u".to_string()),
            ..ConversionOptions::default()
        };
        let broken = UploadedFile::new("x.png", vec![0; 4]);
        assert!(converter.convert(&broken, &options).is_err());
        assert_eq!(tracker.usage("u").conversions, 0);
    }

    #[test]
    fn test_batch_requires_paid_tier() {
        let tracker = Arc::new(InMemoryUsageTracker::new());
        let converter = Converter::new(tracker.clone());
        let files = vec![gray_png()];

        let err = converter.process_batch(&files, Some("free")).unwrap_err();
        assert!(matches!(err, ServiceError::QuotaExceeded { .. }));

        tracker.set_tier("pro", SubscriptionTier::Pro);
        let report = converter.process_batch(&files, Some("pro")).unwrap();
        assert_eq!(report.total_files, 1);
        assert_eq!(tracker.usage("pro").batch_operations, 1);
    }

    #[test]
    fn test_batch_without_files() {
        let err = Converter::default().process_batch(&[], None).unwrap_err();
        assert!(matches!(err, ServiceError::NoFiles));
    }
}
