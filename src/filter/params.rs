use super::*;

/// Configuration for one line-art conversion.
///
/// # Example
/// ```
/// use colorbook::FilterParams;
///
/// let params = FilterParams::default();
/// assert_eq!(params.threshold, 127);
/// assert_eq!(params.block_size, 11);
/// assert_eq!(params.c_value, 2.0);
/// assert!(!params.invert_colors);
/// assert!(params.enhance_lines);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// Global threshold (default: 127). Accepted for compatibility, never applied.
    pub threshold: i32,
    /// Side of the square neighborhood used for the local mean (default: 11)
    pub block_size: u32,
    /// Constant subtracted from the local mean (default: 2.0)
    pub c_value: f64,
    /// Swap black and white after thresholding (default: false)
    pub invert_colors: bool,
    /// Clean specks and hairlines with a 3x3 closing (default: true)
    pub enhance_lines: bool,
}

impl FilterParams {
    /// Creates a new `FilterParams`. No validation happens here, see [`FilterParams::validate`].
    ///
    /// # Example
    /// ```
    /// use colorbook::FilterParams;
    ///
    /// let params = FilterParams::new(127, 15, 4.0, true, false);
    /// assert_eq!(params.block_size, 15);
    /// assert!(params.invert_colors);
    /// ```
    pub fn new(
        threshold: i32,
        block_size: u32,
        c_value: f64,
        invert_colors: bool,
        enhance_lines: bool,
    ) -> Self {
        Self {
            threshold,
            block_size,
            c_value,
            invert_colors,
            enhance_lines,
        }
    }

    /// Checks that the parameters describe a well-defined thresholding step.
    ///
    /// # Errors
    /// Returns [`FilterError::ConfigurationError`] if `block_size` is even or
    /// smaller than 3, or if `c_value` is not finite.
    ///
    /// # Example
    /// ```
    /// use colorbook::{FilterError, FilterParams};
    ///
    /// let even = FilterParams { block_size: 10, ..FilterParams::default() };
    /// assert!(matches!(even.validate(), Err(FilterError::ConfigurationError(_))));
    ///
    /// let smallest = FilterParams { block_size: 3, ..FilterParams::default() };
    /// assert!(smallest.validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.block_size < MIN_BLOCK_SIZE || self.block_size % 2 == 0 {
            return Err(FilterError::ConfigurationError(format!(
                "block_size must be an odd number >= {MIN_BLOCK_SIZE}, got {}",
                self.block_size
            )));
        }
        if !self.c_value.is_finite() {
            return Err(FilterError::ConfigurationError(format!(
                "c_value must be finite, got {}",
                self.c_value
            )));
        }
        Ok(())
    }
}

impl Default for FilterParams {
    fn default() -> Self {
        FilterParams::new(
            DEFAULT_THRESHOLD,
            DEFAULT_BLOCK_SIZE,
            DEFAULT_C_VALUE,
            false,
            true,
        )
    }
}
