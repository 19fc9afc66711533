use super::*;
use imageproc::distance_transform::Norm;

/// Morphological closing with a 3x3 square: dilation followed
/// by erosion. Pixels outside the image never take part in either pass.
///
/// `imageproc` treats non-zero pixels as foreground, so on a 0/255 image this
/// is a 3x3 max filter followed by a 3x3 min filter. Black features narrower
/// than the element disappear; wider strokes keep their shape.
pub fn close_lines(binary: &GrayImage) -> GrayImage {
    trace!(
        "Closing lines on {}x{} binary image",
        binary.width(),
        binary.height()
    );
    imageproc::morphology::close(binary, Norm::LInf, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_close_keeps_uniform_images() {
        let white = GrayImage::from_pixel(8, 8, Luma([WHITE]));
        assert_eq!(close_lines(&white), white);
        let black = GrayImage::from_pixel(8, 8, Luma([BLACK]));
        assert_eq!(close_lines(&black), black);
    }

    #[test]
    fn test_close_removes_isolated_black_speck() {
        let mut img = GrayImage::from_pixel(7, 7, Luma([WHITE]));
        img.put_pixel(3, 3, Luma([BLACK]));
        let closed = close_lines(&img);
        assert!(closed.pixels().all(|p| p[0] == WHITE));
    }

    #[test]
    fn test_close_keeps_wide_stroke() {
        let img = GrayImage::from_fn(9, 9, |x, _| {
            Luma([if (3..=5).contains(&x) { BLACK } else { WHITE }])
        });
        assert_eq!(close_lines(&img), img);
    }

    #[test]
    fn test_close_drops_hairline_and_keeps_white_gap() {
        let hairline = GrayImage::from_fn(9, 9, |x, _| Luma([if x == 4 { BLACK } else { WHITE }]));
        assert!(close_lines(&hairline).pixels().all(|p| p[0] == WHITE));

        let gap = GrayImage::from_fn(9, 9, |x, _| Luma([if x == 4 { WHITE } else { BLACK }]));
        assert_eq!(close_lines(&gap), gap);
    }
}
