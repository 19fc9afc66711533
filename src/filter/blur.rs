use super::*;

// 5-tap Gaussian derived from the kernel size alone: [1 4 6 4 1] / 16.
const KERNEL: [u32; 5] = [1, 4, 6, 4, 1];
const RADIUS: i64 = 2;
// Squared kernel weight (16 * 16) halved, for round-half-up after both passes.
const ROUNDING: u32 = 128;
const SHIFT: u32 = 8;

/// Maps an out-of-range coordinate back into `0..len` by mirroring around the
/// edge pixel without repeating it (`gfedcb|abcdefgh|gfedcba`).
///
/// # Example
/// ```
/// use colorbook::filter::blur::reflect_101;
///
/// assert_eq!(reflect_101(-1, 8), 1);
/// assert_eq!(reflect_101(-2, 8), 2);
/// assert_eq!(reflect_101(8, 8), 6);
/// assert_eq!(reflect_101(3, 8), 3);
/// assert_eq!(reflect_101(-5, 1), 0);
/// ```
pub fn reflect_101(p: i64, len: u32) -> u32 {
    let len = len as i64;
    if len <= 1 {
        return 0;
    }
    let mut p = p;
    while p < 0 || p >= len {
        p = if p < 0 { -p } else { 2 * (len - 1) - p };
    }
    p as u32
}

/// Index table for the five taps around every position along one axis.
fn taps(len: u32) -> Vec<[u32; 5]> {
    (0..len as i64)
        .map(|i| std::array::from_fn(|k| reflect_101(i + k as i64 - RADIUS, len)))
        .collect()
}

/// Smooths a grayscale image with a fixed 5x5 Gaussian kernel.
///
/// The kernel is separable; both passes stay in integers so the output is
/// exactly `(sum(k_i * k_j * p) + 128) >> 8`.
pub fn gaussian_blur_5x5(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    trace!("Applying 5x5 gaussian blur to {}x{} image", width, height);

    let column_taps = taps(width);
    let row_taps = taps(height);
    let w = width as usize;

    let mut horizontal = vec![0u32; w * height as usize];
    for y in 0..height {
        let row = &mut horizontal[y as usize * w..(y as usize + 1) * w];
        for (x, idx) in column_taps.iter().enumerate() {
            row[x] = KERNEL
                .iter()
                .zip(idx)
                .map(|(k, &sx)| k * image.get_pixel(sx, y)[0] as u32)
                .sum();
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let sum: u32 = KERNEL
            .iter()
            .zip(&row_taps[y as usize])
            .map(|(k, &sy)| k * horizontal[sy as usize * w + x as usize])
            .sum();
        Luma([((sum + ROUNDING) >> SHIFT) as u8])
    })
}
