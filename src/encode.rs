//! Encoding of converted pages: PNG bytes, optionally tagged with a physical
//! resolution, and the base64 text that goes into JSON envelopes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::RgbImage;
use png::{BitDepth, ColorType, Encoder, PixelDimensions, Unit};
use thiserror::Error;
use tracing::debug;

const METERS_PER_INCH: f64 = 0.0254;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Failed to encode PNG: {0}")]
    Png(#[from] png::EncodingError),
}

/// Converts dots per inch into the pixels-per-meter unit stored in a PNG `pHYs` chunk.
///
/// # Example
/// ```
/// assert_eq!(colorbook::encode::dpi_to_ppm(300), 11811);
/// assert_eq!(colorbook::encode::dpi_to_ppm(150), 5906);
/// ```
pub fn dpi_to_ppm(dpi: u32) -> u32 {
    (dpi as f64 / METERS_PER_INCH).round() as u32
}

/// Encodes an RGB image as an 8-bit PNG. With `dpi` set, the file records that
/// resolution so print tooling lays the page out at the intended size.
pub fn encode_png(image: &RgbImage, dpi: Option<u32>) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    {
        let mut encoder = Encoder::new(&mut buf, image.width(), image.height());
        encoder.set_color(ColorType::Rgb);
        encoder.set_depth(BitDepth::Eight);
        if let Some(dpi) = dpi {
            let ppm = dpi_to_ppm(dpi);
            encoder.set_pixel_dims(Some(PixelDimensions {
                xppu: ppm,
                yppu: ppm,
                unit: Unit::Meter,
            }));
        }
        let mut writer = encoder.write_header()?;
        writer.write_image_data(image.as_raw())?;
        writer.finish()?;
    }
    debug!(
        "Encoded {}x{} image -> {} bytes PNG",
        image.width(),
        image.height(),
        buf.len()
    );
    Ok(buf)
}

pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Size of a payload in mebibytes, as reported to clients.
pub fn file_size_mb(len: usize) -> f64 {
    len as f64 / BYTES_PER_MB
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn page() -> RgbImage {
        RgbImage::from_fn(6, 4, |x, _| {
            if x % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    fn pixel_dims(bytes: &[u8]) -> Option<(u32, u32, bool)> {
        let reader = png::Decoder::new(Cursor::new(bytes)).read_info().unwrap();
        reader
            .info()
            .pixel_dims
            .as_ref()
            .map(|d| (d.xppu, d.yppu, matches!(d.unit, Unit::Meter)))
    }

    #[test]
    fn test_png_carries_print_resolution() {
        let bytes = encode_png(&page(), Some(300)).unwrap();
        assert_eq!(pixel_dims(&bytes), Some((11811, 11811, true)));
    }

    #[test]
    fn test_png_without_resolution() {
        let bytes = encode_png(&page(), None).unwrap();
        assert!(pixel_dims(&bytes).is_none());
    }

    #[test]
    fn test_png_decodes_to_same_pixels() {
        let img = page();
        let bytes = encode_png(&img, Some(300)).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_base64_is_decodable() {
        let bytes = encode_png(&page(), None).unwrap();
        let text = to_base64(&bytes);
        assert_eq!(STANDARD.decode(text).unwrap(), bytes);
    }

    #[test]
    fn test_file_size_mb() {
        assert_eq!(file_size_mb(0), 0.0);
        assert_eq!(file_size_mb(1024 * 1024), 1.0);
        assert_eq!(file_size_mb(512 * 1024), 0.5);
    }
}
