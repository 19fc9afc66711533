//! Converts many uploads at once.
//!
//! Files are processed in parallel on the rayon pool. Each file ends up with
//! its own [`FileOutcome`]; a broken upload is reported next to the good ones
//! instead of aborting the batch.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::encode;
use crate::filter::LineArtFilter;
use crate::service::{decode_and_filter, ServiceError};

/// File name suffixes handled as images, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 3] = [".png", ".jpg", ".jpeg"];

/// An uploaded file: the client-side name and the raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// # Example
    /// ```
    /// use colorbook::UploadedFile;
    ///
    /// assert!(UploadedFile::new("Cover.JPEG", vec![]).is_image());
    /// assert!(!UploadedFile::new("book.pdf", vec![]).is_image());
    /// ```
    pub fn is_image(&self) -> bool {
        let name = self.filename.to_lowercase();
        IMAGE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
    }
}

/// Result of converting one file of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FileOutcome {
    Converted {
        success: bool,
        /// Base64 PNG.
        data: String,
        #[serde(rename = "type")]
        kind: &'static str,
    },
    Failed {
        success: bool,
        error: String,
        filename: String,
    },
}

impl FileOutcome {
    pub fn converted(data: String) -> Self {
        Self::Converted {
            success: true,
            data,
            kind: "image",
        }
    }

    pub fn failed(filename: &str, error: &ServiceError) -> Self {
        Self::Failed {
            success: false,
            error: error.to_string(),
            filename: filename.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Converted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub success: bool,
    /// Outcomes keyed `file_<index>` by upload position.
    pub results: BTreeMap<String, FileOutcome>,
    pub total_files: usize,
    /// Seconds since the Unix epoch.
    pub completed_at: u64,
}

impl BatchReport {
    pub fn outcome(&self, index: usize) -> Option<&FileOutcome> {
        self.results.get(&result_key(index))
    }

    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|o| o.is_success()).count()
    }
}

fn result_key(index: usize) -> String {
    format!("file_{index}")
}

/// Converts one batch entry to a base64 PNG. Batch output carries no DPI tag.
fn convert_file(file: &UploadedFile, filter: &LineArtFilter) -> Result<String, ServiceError> {
    if !file.is_image() {
        return Err(ServiceError::UnsupportedFile {
            filename: file.filename.clone(),
        });
    }
    let art = decode_and_filter(&file.bytes, filter)?;
    let png = encode::encode_png(&art, None)?;
    Ok(encode::to_base64(&png))
}

/// Converts every file with the same filter, in parallel.
pub fn process_batch(files: &[UploadedFile], filter: &LineArtFilter) -> BatchReport {
    info!("Processing batch of {} files", files.len());

    let outcomes: Vec<FileOutcome> = files
        .par_iter()
        .enumerate()
        .map(|(index, file)| match convert_file(file, filter) {
            Ok(data) => FileOutcome::converted(data),
            Err(e) => {
                warn!("Batch file {} ({}) failed: {}", index, file.filename, e);
                FileOutcome::failed(&file.filename, &e)
            }
        })
        .collect();

    let results: BTreeMap<String, FileOutcome> = outcomes
        .into_iter()
        .enumerate()
        .map(|(index, outcome)| (result_key(index), outcome))
        .collect();

    let completed_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let report = BatchReport {
        success: true,
        results,
        total_files: files.len(),
        completed_at,
    };
    info!(
        "Batch finished: {}/{} files converted",
        report.succeeded(),
        report.total_files
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FilterParams;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use image::{Rgb, RgbImage};
    use insta::assert_yaml_snapshot;
    use pretty_assertions::assert_eq;

    fn png_upload(name: &str, value: u8) -> UploadedFile {
        let img = RgbImage::from_pixel(16, 16, Rgb([value, value, value]));
        UploadedFile::new(name, encode::encode_png(&img, None).unwrap())
    }

    #[test]
    fn test_mixed_batch_reports_each_file() {
        let files = vec![
            png_upload("a.png", 128),
            UploadedFile::new("b.jpg", b"garbage".to_vec()),
            UploadedFile::new("manuscript.pdf", b"%PDF-1.7".to_vec()),
            png_upload("D.PNG", 10),
        ];
        let report = process_batch(&files, &LineArtFilter::default());

        assert!(report.success);
        assert_eq!(report.total_files, 4);
        assert_eq!(report.succeeded(), 2);
        assert!(report.outcome(0).unwrap().is_success());
        assert!(!report.outcome(1).unwrap().is_success());
        assert!(report.outcome(3).unwrap().is_success());

        match report.outcome(2).unwrap() {
            FileOutcome::Failed {
                error, filename, ..
            } => {
                assert_eq!(filename, "manuscript.pdf");
                assert_eq!(error, "Unsupported file type: manuscript.pdf");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_batch_uses_default_params() {
        let file = png_upload("page.png", 128);
        let report = process_batch(std::slice::from_ref(&file), &LineArtFilter::default());
        let FileOutcome::Converted { data, .. } = report.outcome(0).unwrap() else {
            panic!("conversion failed");
        };
        let png = STANDARD.decode(data).unwrap();
        let expected = decode_and_filter(&file.bytes, &LineArtFilter::default()).unwrap();
        assert_eq!(image::load_from_memory(&png).unwrap().to_rgb8(), expected);
        assert_eq!(
            LineArtFilter::default().params(),
            &FilterParams::default()
        );
    }

    #[test]
    fn test_failure_outcome_snapshot() {
        let files = vec![UploadedFile::new("notes.txt", b"hello".to_vec())];
        let report = process_batch(&files, &LineArtFilter::default());
        assert_yaml_snapshot!(report, {
            ".completed_at" => 0,
        }, @r###"
        success: true
        results:
          file_0:
            success: false
            error: "Unsupported file type: notes.txt"
            filename: notes.txt
        total_files: 1
        completed_at: 0
        "###);
    }
}
