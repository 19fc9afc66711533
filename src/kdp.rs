//! Print and e-book layout constants for Kindle Direct Publishing.
//!
//! All tables are immutable; callers receive them at startup instead of
//! mutating shared globals.

use serde::Serialize;
use tracing::trace;

/// Bleed beyond the trim edge, in inches.
pub const BLEED_SIZE: f64 = 0.125;
/// Resolution for print interiors and converted coloring pages.
pub const PRINT_DPI: u32 = 300;
/// Resolution for Kindle e-books.
pub const DIGITAL_DPI: u32 = 150;
/// Allowed difference between a page and its trim size, in inches.
pub const PAGE_SIZE_TOLERANCE: f64 = 0.1;

const OUTER_MARGIN: f64 = 0.75;

/// Inside (gutter) margin steps: a book with more than `pages` pages needs at least `inches`.
const GUTTER_STEPS: [(u32, f64); 4] = [(24, 0.875), (150, 1.0), (300, 1.125), (500, 1.25)];

/// Physical page size in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrimSize {
    pub width: f64,
    pub height: f64,
}

impl TrimSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Whether a page of the given size, in inches, fits this trim within [`PAGE_SIZE_TOLERANCE`].
    ///
    /// # Example
    /// ```
    /// use colorbook::kdp::trim_size;
    ///
    /// let six_by_nine = trim_size("paperback_6x9").unwrap();
    /// assert!(six_by_nine.matches(6.05, 8.95));
    /// assert!(!six_by_nine.matches(8.5, 11.0));
    /// ```
    pub fn matches(&self, width: f64, height: f64) -> bool {
        (width - self.width).abs() <= PAGE_SIZE_TOLERANCE
            && (height - self.height).abs() <= PAGE_SIZE_TOLERANCE
    }
}

/// Supported trim sizes keyed by their format name.
pub const TRIM_SIZES: [(&str, TrimSize); 7] = [
    ("paperback_6x9", TrimSize::new(6.0, 9.0)),
    ("paperback_5x8", TrimSize::new(5.0, 8.0)),
    ("paperback_5.5x8.5", TrimSize::new(5.5, 8.5)),
    ("paperback_7x10", TrimSize::new(7.0, 10.0)),
    ("paperback_8.5x11", TrimSize::new(8.5, 11.0)),
    ("kindle_6x9", TrimSize::new(6.0, 9.0)),
    ("kindle_5x8", TrimSize::new(5.0, 8.0)),
];

pub fn trim_size(name: &str) -> Option<TrimSize> {
    TRIM_SIZES
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, size)| *size)
}

/// Safe-area margins in inches. `left` is the inside (binding) edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Margins {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

/// Margins required for a book of `page_count` pages; thicker books need a
/// wider gutter so content does not disappear into the binding.
pub fn dynamic_margins(page_count: u32) -> Margins {
    let inside = GUTTER_STEPS
        .iter()
        .filter(|(pages, _)| page_count > *pages)
        .map(|(_, inches)| *inches)
        .last()
        .unwrap_or(OUTER_MARGIN);
    trace!("Gutter for {} pages: {}in", page_count, inside);
    Margins {
        top: OUTER_MARGIN,
        bottom: OUTER_MARGIN,
        left: inside,
        right: OUTER_MARGIN,
    }
}
