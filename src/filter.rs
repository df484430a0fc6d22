//! Block Threshold Filter
//!
//! Slides a square window over a grayscale image at stride 1. Every window in
//! which enough samples pass the comparison (at least `percentage` percent of
//! the window) is flooded with the fill value.
//!
//! Window counts are always taken from the untouched source image, so fills
//! made for one window never change the decision for an overlapping one.
//!
//! ## Overlap
//!
//! A pixel covered by several matching windows keeps the value written by the
//! last of them in row-major anchor order. All windows of one run share the same
//! fill value, so the final image does not depend on the order in which the
//! matching windows are found, nor on how many threads classify them.

use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use crate::error::{AnnotatorError, Result};
use crate::loader::open_image;

// ============================================================================
// SETTINGS
// ============================================================================

/// Per-sample predicate used to count qualifying samples in a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// `sample >= compare_value`
    #[default]
    AtLeast,
    /// `sample <= compare_value`
    AtMost,
}

impl Comparison {
    #[inline]
    pub fn matches(self, sample: u8, compare_value: u8) -> bool {
        match self {
            Comparison::AtLeast => sample >= compare_value,
            Comparison::AtMost => sample <= compare_value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Window side length in pixels (default: 2)
    pub kernel_size: u32,
    /// Share of qualifying samples, in percent, a window needs to match (default: 75)
    pub percentage: f64,
    /// Value each sample is compared against (default: 150)
    pub compare_value: u8,
    /// Comparison applied to each sample (default: at least)
    pub comparison: Comparison,
    /// Value written over a matching window (default: 255)
    pub fill_value: u8,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            kernel_size: 2,
            percentage: 75.0,
            compare_value: 150,
            comparison: Comparison::AtLeast,
            fill_value: 255,
        }
    }
}

impl FilterSettings {
    /// Checks that do not depend on the image being filtered.
    pub fn check(&self) -> Result<()> {
        if self.kernel_size == 0 {
            return Err(AnnotatorError::InvalidConfiguration(
                "kernel size must be at least 1".to_string(),
            ));
        }
        if !self.percentage.is_finite() || !(0.0..=100.0).contains(&self.percentage) {
            return Err(AnnotatorError::InvalidConfiguration(format!(
                "percentage threshold {} is outside [0, 100]",
                self.percentage
            )));
        }
        Ok(())
    }

    /// Full validation against the dimensions of a concrete image.
    pub fn validate(&self, width: u32, height: u32) -> Result<()> {
        self.check()?;
        if width == 0 || height == 0 {
            return Err(AnnotatorError::InvalidConfiguration(
                "image is empty".to_string(),
            ));
        }
        if self.kernel_size > width || self.kernel_size > height {
            return Err(AnnotatorError::InvalidConfiguration(format!(
                "kernel size {} exceeds image dimensions {}x{}",
                self.kernel_size, width, height
            )));
        }
        Ok(())
    }

    /// Number of qualifying samples a window needs. Not rounded.
    pub fn required_count(&self) -> f64 {
        let area = self.kernel_size as f64 * self.kernel_size as f64;
        area * (self.percentage / 100.0)
    }
}

// ============================================================================
// MATCH COUNTING
// ============================================================================

/// Summed-area table over the predicate mask of the source image.
///
/// `sums[y * (width + 1) + x]` holds the number of qualifying samples in rows
/// `< y` and columns `< x`.
struct MatchTable {
    stride: usize,
    sums: Vec<u32>,
}

impl MatchTable {
    fn new(image: &GrayImage, settings: &FilterSettings) -> Self {
        let (width, height) = image.dimensions();
        let stride = width as usize + 1;
        let mut sums = vec![0u32; stride * (height as usize + 1)];

        for (y, row) in image.as_raw().chunks_exact(width as usize).enumerate() {
            let mut row_sum = 0u32;
            for (x, &sample) in row.iter().enumerate() {
                if settings.comparison.matches(sample, settings.compare_value) {
                    row_sum += 1;
                }
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row_sum;
            }
        }

        Self { stride, sums }
    }

    /// Qualifying samples in the `size`x`size` window anchored at (`row`, `col`).
    #[inline]
    fn window_count(&self, row: usize, col: usize, size: usize) -> u32 {
        let top = row * self.stride;
        let bottom = (row + size) * self.stride;
        self.sums[bottom + col + size] + self.sums[top + col]
            - self.sums[bottom + col]
            - self.sums[top + col + size]
    }
}

// ============================================================================
// FILTER
// ============================================================================

/// Apply the block threshold filter, returning a new image of the same size.
pub fn apply_filter(image: &GrayImage, settings: &FilterSettings) -> Result<GrayImage> {
    let (width, height) = image.dimensions();
    settings.validate(width, height)?;

    let width = width as usize;
    let height = height as usize;
    let k = settings.kernel_size as usize;
    let anchor_rows = height - k + 1;
    let anchor_cols = width - k + 1;
    let required = settings.required_count();

    let table = MatchTable::new(image, settings);

    // Classify every anchor. Reads only the source, so rows are independent.
    let mut matched = vec![false; anchor_rows * anchor_cols];
    matched
        .par_chunks_mut(anchor_cols)
        .enumerate()
        .for_each(|(i, row)| {
            for (j, flag) in row.iter_mut().enumerate() {
                *flag = table.window_count(i, j, k) as f64 >= required;
            }
        });

    // Coverage of matching windows via a 2-D difference array, walked in
    // row-major anchor order.
    let stride = width + 1;
    let mut coverage = vec![0i32; stride * (height + 1)];
    let mut window_count = 0usize;
    for i in 0..anchor_rows {
        for j in 0..anchor_cols {
            if !matched[i * anchor_cols + j] {
                continue;
            }
            window_count += 1;
            coverage[i * stride + j] += 1;
            coverage[i * stride + j + k] -= 1;
            coverage[(i + k) * stride + j] -= 1;
            coverage[(i + k) * stride + j + k] += 1;
        }
    }

    let mut output = image.clone();
    if window_count > 0 {
        let samples: &mut [u8] = &mut output;
        for y in 0..height {
            let mut running = 0i32;
            for x in 0..width {
                running += coverage[y * stride + x];
                if y > 0 {
                    // fold the previous row's prefix sums down
                    coverage[y * stride + x] = running + coverage[(y - 1) * stride + x];
                } else {
                    coverage[y * stride + x] = running;
                }
            }
            let row = &mut samples[y * width..(y + 1) * width];
            for (x, sample) in row.iter_mut().enumerate() {
                if coverage[y * stride + x] > 0 {
                    *sample = settings.fill_value;
                }
            }
        }
    }

    debug!(
        width,
        height,
        kernel_size = k,
        matched_windows = window_count,
        "Block threshold filter applied"
    );

    Ok(output)
}

/// Filter one image file into `output_dir`, keeping its file name.
///
/// The file is decoded as grayscale and written back in the format implied by
/// its extension. Returns the path written.
pub fn filter_file(
    input_path: &Path,
    output_dir: &Path,
    settings: &FilterSettings,
) -> Result<PathBuf> {
    let file_name = input_path.file_name().ok_or_else(|| {
        AnnotatorError::Processing(format!("{} has no file name", input_path.display()))
    })?;

    let image = open_image(input_path)?
        .to_luma8();

    let filtered = apply_filter(&image, settings)?;

    fs::create_dir_all(output_dir).map_err(|e| AnnotatorError::write_io(output_dir, e))?;
    let output_path = output_dir.join(file_name);
    filtered
        .save(&output_path)
        .map_err(|e| AnnotatorError::write(&output_path, e))?;

    info!(output = %output_path.display(), "Processed image saved");
    Ok(output_path)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Direct transcription of the window loop, used as the reference.
    fn brute_force(image: &GrayImage, settings: &FilterSettings) -> GrayImage {
        let (width, height) = image.dimensions();
        let k = settings.kernel_size;
        let mut out = image.clone();
        for i in 0..=(height - k) {
            for j in 0..=(width - k) {
                let mut count = 0u32;
                for y in i..i + k {
                    for x in j..j + k {
                        if settings
                            .comparison
                            .matches(image.get_pixel(x, y)[0], settings.compare_value)
                        {
                            count += 1;
                        }
                    }
                }
                if count as f64 >= settings.required_count() {
                    for y in i..i + k {
                        for x in j..j + k {
                            out.put_pixel(x, y, Luma([settings.fill_value]));
                        }
                    }
                }
            }
        }
        out
    }

    fn noisy_image(width: u32, height: u32, seed: u32) -> GrayImage {
        let mut state = seed;
        GrayImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            Luma([(state >> 16) as u8])
        })
    }

    fn settings(kernel_size: u32, percentage: f64, compare_value: u8) -> FilterSettings {
        FilterSettings {
            kernel_size,
            percentage,
            compare_value,
            ..FilterSettings::default()
        }
    }

    #[test]
    fn test_default_settings() {
        let s = FilterSettings::default();
        assert_eq!(s.kernel_size, 2);
        assert_eq!(s.percentage, 75.0);
        assert_eq!(s.compare_value, 150);
        assert_eq!(s.comparison, Comparison::AtLeast);
        assert_eq!(s.fill_value, 255);
    }

    #[test]
    fn test_uniform_bright_image_fills_everything() {
        let image = GrayImage::from_pixel(3, 3, Luma([200]));
        let out = apply_filter(&image, &settings(2, 50.0, 150)).unwrap();
        assert!(out.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_no_qualifying_pixels_leaves_image_unchanged() {
        let image = GrayImage::from_pixel(3, 3, Luma([200]));
        let out = apply_filter(&image, &settings(2, 50.0, 250)).unwrap();
        assert_eq!(out, image);
    }

    #[test]
    fn test_zero_percentage_with_unit_kernel_fills_whole_image() {
        let image = noisy_image(7, 5, 3);
        let mut s = settings(1, 0.0, 255);
        s.fill_value = 9;
        let out = apply_filter(&image, &s).unwrap();
        assert!(out.pixels().all(|p| p[0] == 9));
    }

    #[test]
    fn test_zero_percentage_larger_kernel_covers_every_pixel() {
        let image = noisy_image(9, 6, 11);
        let mut s = settings(4, 0.0, 255);
        s.fill_value = 1;
        let out = apply_filter(&image, &s).unwrap();
        assert!(out.pixels().all(|p| p[0] == 1));
    }

    #[test]
    fn test_percentage_above_hundred_rejected() {
        let image = GrayImage::from_pixel(4, 4, Luma([0]));
        let err = apply_filter(&image, &settings(2, 100.5, 10)).unwrap_err();
        assert!(matches!(err, AnnotatorError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_negative_and_nan_percentage_rejected() {
        assert!(settings(2, -1.0, 10).check().is_err());
        assert!(settings(2, f64::NAN, 10).check().is_err());
    }

    #[test]
    fn test_kernel_larger_than_image_rejected() {
        let image = GrayImage::from_pixel(5, 3, Luma([0]));
        let err = apply_filter(&image, &settings(4, 50.0, 10)).unwrap_err();
        assert!(matches!(err, AnnotatorError::InvalidConfiguration(_)));
        assert!(settings(0, 50.0, 10).check().is_err());
    }

    #[test]
    fn test_kernel_equal_to_image_is_single_window() {
        let mut image = GrayImage::from_pixel(3, 3, Luma([0]));
        for x in 0..3 {
            image.put_pixel(x, 0, Luma([200]));
        }
        // 3 of 9 qualify: 33.3% passes 33 but not 34
        let out = apply_filter(&image, &settings(3, 33.0, 150)).unwrap();
        assert!(out.pixels().all(|p| p[0] == 255));
        let out = apply_filter(&image, &settings(3, 34.0, 150)).unwrap();
        assert_eq!(out, image);
    }

    #[test]
    fn test_required_count_is_not_rounded() {
        // 2 of 4 qualify; 50% requires exactly 2, 50.1% requires 2.004
        let image = GrayImage::from_raw(2, 2, vec![200, 200, 0, 0]).unwrap();
        let out = apply_filter(&image, &settings(2, 50.0, 150)).unwrap();
        assert!(out.pixels().all(|p| p[0] == 255));
        let out = apply_filter(&image, &settings(2, 50.1, 150)).unwrap();
        assert_eq!(out, image);
    }

    #[test]
    fn test_at_most_comparison() {
        let image = GrayImage::from_raw(3, 1, vec![10, 20, 200]).unwrap();
        let s = FilterSettings {
            kernel_size: 1,
            percentage: 100.0,
            compare_value: 20,
            comparison: Comparison::AtMost,
            fill_value: 0,
        };
        let out = apply_filter(&image, &s).unwrap();
        assert_eq!(out.as_raw(), &vec![0, 0, 200]);
    }

    #[test]
    fn test_counts_read_from_source_not_output() {
        // Only the window at (0,0) qualifies. Filling it with a qualifying value
        // must not let the neighbouring window at (0,1) match.
        let image = GrayImage::from_raw(3, 2, vec![200, 200, 0, 200, 200, 0]).unwrap();
        let s = FilterSettings {
            kernel_size: 2,
            percentage: 100.0,
            compare_value: 150,
            comparison: Comparison::AtLeast,
            fill_value: 250,
        };
        let out = apply_filter(&image, &s).unwrap();
        assert_eq!(out.as_raw(), &vec![250, 250, 0, 250, 250, 0]);
    }

    #[test]
    fn test_matches_brute_force_reference() {
        let cases = [
            (17, 13, 2, 75.0, 150, Comparison::AtLeast),
            (17, 13, 3, 40.0, 90, Comparison::AtMost),
            (20, 9, 5, 60.0, 128, Comparison::AtLeast),
            (8, 8, 1, 100.0, 64, Comparison::AtMost),
            (31, 4, 4, 12.5, 200, Comparison::AtLeast),
        ];
        for (seed, (w, h, k, pct, cmp, op)) in cases.into_iter().enumerate() {
            let image = noisy_image(w, h, seed as u32 + 1);
            let s = FilterSettings {
                kernel_size: k,
                percentage: pct,
                compare_value: cmp,
                comparison: op,
                fill_value: 7,
            };
            let fast = apply_filter(&image, &s).unwrap();
            assert_eq!(fast, brute_force(&image, &s), "case {}", seed);
        }
    }

    #[test]
    fn test_idempotent_when_fill_does_not_qualify() {
        let image = noisy_image(16, 12, 42);
        let s = FilterSettings {
            kernel_size: 3,
            percentage: 50.0,
            compare_value: 128,
            comparison: Comparison::AtLeast,
            fill_value: 0,
        };
        let once = apply_filter(&image, &s).unwrap();
        let twice = apply_filter(&once, &s).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_output_keeps_dimensions() {
        let image = noisy_image(23, 7, 5);
        let out = apply_filter(&image, &settings(3, 75.0, 100)).unwrap();
        assert_eq!(out.dimensions(), (23, 7));
    }

    #[test]
    fn test_settings_deserialize_with_missing_fields() {
        let s: FilterSettings =
            serde_json::from_str(r#"{"kernel_size": 4, "comparison": "at_most"}"#).unwrap();
        assert_eq!(s.kernel_size, 4);
        assert_eq!(s.comparison, Comparison::AtMost);
        assert_eq!(s.percentage, 75.0);
    }
}
