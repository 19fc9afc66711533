use super::*;

// Differences between two u8 samples live in -255..=255, so any offset outside
// this range already decides every pixel the same way.
const MAX_OFFSET: i32 = 256;

/// Sums of the `block` samples centred on every position, with replicated
/// edges.
///
/// Out-of-range taps all read the edge sample, so they are counted instead of
/// visited; the cost is linear in `len` whatever the block size.
fn window_sums(
    len: u32,
    block: u32,
    sample: impl Fn(u32) -> u128,
    prefix: &mut Vec<u128>,
) -> Vec<u128> {
    if len == 0 {
        return Vec::new();
    }
    let len = len as u64;
    let radius = (block / 2) as u64;
    prefix.clear();
    prefix.push(0);
    let mut acc = 0u128;
    for p in 0..len {
        acc += sample(p as u32);
        prefix.push(acc);
    }
    let first = prefix[1];
    let last = acc - prefix[len as usize - 1];

    (0..len)
        .map(|i| {
            let lo = i.saturating_sub(radius);
            let hi = (i + radius).min(len - 1);
            let before = radius.saturating_sub(i) as u128;
            let after = (i + radius).saturating_sub(len - 1) as u128;
            before * first + after * last + prefix[hi as usize + 1] - prefix[lo as usize]
        })
        .collect()
}

/// Mean brightness over a `block_size` x `block_size` neighbourhood of every
/// pixel, rounded to the nearest integer. Pixels outside the image take the
/// value of the nearest edge pixel.
pub fn local_mean(image: &GrayImage, block_size: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    let w = width as usize;
    let area = block_size as u128 * block_size as u128;
    let mut prefix = Vec::new();

    let mut horizontal = vec![0u128; w * height as usize];
    for y in 0..height {
        let sums = window_sums(
            width,
            block_size,
            |x| image.get_pixel(x, y)[0] as u128,
            &mut prefix,
        );
        horizontal[y as usize * w..(y as usize + 1) * w].copy_from_slice(&sums);
    }

    let mut mean = GrayImage::new(width, height);
    for x in 0..width {
        let sums = window_sums(
            height,
            block_size,
            |y| horizontal[y as usize * w + x as usize],
            &mut prefix,
        );
        for (y, sum) in sums.into_iter().enumerate() {
            // block_size is odd, so the area is odd and ties cannot occur.
            mean.put_pixel(x, y as u32, Luma([((sum + area / 2) / area) as u8]));
        }
    }
    mean
}

/// Binarizes an image against its local mean.
///
/// A pixel becomes white (255) when it is strictly brighter than
/// `mean - ceil(c_value)`, black (0) otherwise. No global threshold is involved.
///
/// # Example
/// ```
/// use colorbook::filter::threshold::adaptive_mean_threshold;
/// use image::{GrayImage, Luma};
///
/// let flat = GrayImage::from_pixel(20, 20, Luma([128]));
/// let binary = adaptive_mean_threshold(&flat, 11, 2.0);
/// assert!(binary.pixels().all(|p| p[0] == 255));
///
/// // With no offset every pixel equals its threshold and turns black.
/// let binary = adaptive_mean_threshold(&flat, 11, 0.0);
/// assert!(binary.pixels().all(|p| p[0] == 0));
/// ```
pub fn adaptive_mean_threshold(image: &GrayImage, block_size: u32, c_value: f64) -> GrayImage {
    trace!(
        "Adaptive threshold with block_size={}, c_value={}",
        block_size,
        c_value
    );
    let mean = local_mean(image, block_size);
    let offset = (c_value.ceil() as i32).clamp(-MAX_OFFSET, MAX_OFFSET);

    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let value = image.get_pixel(x, y)[0] as i32;
        let local = mean.get_pixel(x, y)[0] as i32;
        if value - local > -offset {
            Luma([WHITE])
        } else {
            Luma([BLACK])
        }
    })
}
