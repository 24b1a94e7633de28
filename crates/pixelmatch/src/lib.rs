//! Perceptual pixel comparison for RGBA8 bitmaps.
//!
//! Two pixels are considered different when the distance between them in the
//! YIQ colour space exceeds a threshold derived from [`Options::threshold`].
//! Differences that look like anti-aliasing in either image (a pixel sitting on
//! an edge between two flat regions) are reported separately and, by default,
//! not counted.

use thiserror::Error;

/// Maximum possible squared YIQ distance between two colours.
const MAX_YIQ_DELTA: f64 = 35215.0;

/// Bytes per RGBA8 pixel.
const CHANNELS: usize = 4;

/// Comparison options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Options {
    /// Matching threshold on a 0..1 scale. Smaller values are more sensitive.
    pub threshold: f64,
    /// Count anti-aliased pixels as mismatches.
    pub include_aa: bool,
    /// Opacity of the faded original image in the diff output.
    pub alpha: f64,
    /// Colour used for anti-aliased pixels in the diff output.
    pub aa_color: [u8; 3],
    /// Colour used for mismatched pixels in the diff output.
    pub diff_color: [u8; 3],
}

impl Default for Options {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            include_aa: false,
            alpha: 0.1,
            aa_color: [255, 255, 0],
            diff_color: [255, 0, 0],
        }
    }
}

impl Options {
    /// Options with the default colours and the given threshold.
    #[must_use]
    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }
}

/// Invalid comparison input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PixelmatchError {
    #[error("{which} buffer holds {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    BufferSize {
        which: &'static str,
        actual: usize,
        expected: usize,
        width: u32,
        height: u32,
    },
}

/// Compares two RGBA8 bitmaps of identical dimensions.
///
/// Returns the number of mismatched pixels. When `diff` is provided it receives
/// a visualisation: mismatches in [`Options::diff_color`], anti-aliasing in
/// [`Options::aa_color`], everything else as a faded grayscale copy of `actual`.
///
/// # Errors
///
/// Returns an error if any buffer does not hold exactly `width * height * 4` bytes.
pub fn pixelmatch(
    actual: &[u8],
    expected: &[u8],
    mut diff: Option<&mut [u8]>,
    width: u32,
    height: u32,
    options: &Options,
) -> Result<usize, PixelmatchError> {
    let len = (width as usize) * (height as usize) * CHANNELS;
    check_len("actual", actual.len(), len, width, height)?;
    check_len("expected", expected.len(), len, width, height)?;
    if let Some(out) = diff.as_deref() {
        check_len("diff", out.len(), len, width, height)?;
    }

    let max_delta = MAX_YIQ_DELTA * options.threshold * options.threshold;
    let grid = Grid {
        width: width as usize,
        height: height as usize,
    };
    let mut mismatched = 0usize;

    for row in 0..grid.height {
        for col in 0..grid.width {
            let pos = grid.offset(col, row);
            let delta = color_delta(actual, expected, pos, pos, false);

            if delta.abs() > max_delta {
                let antialiased = !options.include_aa
                    && (is_antialiased(actual, expected, col, row, grid)
                        || is_antialiased(expected, actual, col, row, grid));
                if antialiased {
                    if let Some(out) = diff.as_deref_mut() {
                        draw_pixel(out, pos, options.aa_color);
                    }
                } else {
                    if let Some(out) = diff.as_deref_mut() {
                        draw_pixel(out, pos, options.diff_color);
                    }
                    mismatched += 1;
                }
            } else if let Some(out) = diff.as_deref_mut() {
                draw_gray_pixel(actual, pos, options.alpha, out);
            }
        }
    }

    Ok(mismatched)
}

fn check_len(
    which: &'static str,
    actual: usize,
    expected: usize,
    width: u32,
    height: u32,
) -> Result<(), PixelmatchError> {
    if actual == expected {
        Ok(())
    } else {
        Err(PixelmatchError::BufferSize {
            which,
            actual,
            expected,
            width,
            height,
        })
    }
}

#[derive(Clone, Copy)]
struct Grid {
    width: usize,
    height: usize,
}

impl Grid {
    const fn offset(self, col: usize, row: usize) -> usize {
        (row * self.width + col) * CHANNELS
    }

    /// Inclusive bounds of the 3x3 neighbourhood around a pixel, and whether
    /// the pixel lies on the image border.
    fn neighbourhood(self, col: usize, row: usize) -> (usize, usize, usize, usize, bool) {
        let col_start = col.saturating_sub(1);
        let row_start = row.saturating_sub(1);
        let col_end = (col + 1).min(self.width - 1);
        let row_end = (row + 1).min(self.height - 1);
        let on_edge = col == col_start || col == col_end || row == row_start || row == row_end;
        (col_start, row_start, col_end, row_end, on_edge)
    }
}

/// Checks whether a pixel is likely part of an anti-aliased edge: it has both
/// a darker and a brighter neighbour, and one of those sits in a flat region
/// in both images.
fn is_antialiased(image: &[u8], other: &[u8], col: usize, row: usize, grid: Grid) -> bool {
    let (col_start, row_start, col_end, row_end, on_edge) = grid.neighbourhood(col, row);
    let pos = grid.offset(col, row);
    let mut zeroes = usize::from(on_edge);
    let mut min = 0.0f64;
    let mut max = 0.0f64;
    let mut min_at = (0, 0);
    let mut max_at = (0, 0);

    for near_col in col_start..=col_end {
        for near_row in row_start..=row_end {
            if near_col == col && near_row == row {
                continue;
            }

            let delta = color_delta(image, image, pos, grid.offset(near_col, near_row), true);
            if delta.abs() <= f64::EPSILON {
                zeroes += 1;
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                min_at = (near_col, near_row);
            } else if delta > max {
                max = delta;
                max_at = (near_col, near_row);
            }
        }
    }

    if min.abs() <= f64::EPSILON || max.abs() <= f64::EPSILON {
        return false;
    }

    (has_many_siblings(image, min_at.0, min_at.1, grid)
        && has_many_siblings(other, min_at.0, min_at.1, grid))
        || (has_many_siblings(image, max_at.0, max_at.1, grid)
            && has_many_siblings(other, max_at.0, max_at.1, grid))
}

/// Checks whether a pixel has at least three identical neighbours.
fn has_many_siblings(image: &[u8], col: usize, row: usize, grid: Grid) -> bool {
    let (col_start, row_start, col_end, row_end, on_edge) = grid.neighbourhood(col, row);
    let pos = grid.offset(col, row);
    let pixel = &image[pos..pos + CHANNELS];
    let mut zeroes = usize::from(on_edge);

    for near_col in col_start..=col_end {
        for near_row in row_start..=row_end {
            if near_col == col && near_row == row {
                continue;
            }
            let near = grid.offset(near_col, near_row);
            if pixel == &image[near..near + CHANNELS] {
                zeroes += 1;
            }
            if zeroes > 2 {
                return true;
            }
        }
    }

    false
}

/// Squared YIQ distance between two pixels, signed by relative brightness.
///
/// With `brightness_only` the signed luma difference is returned instead.
fn color_delta(
    first: &[u8],
    second: &[u8],
    first_pos: usize,
    second_pos: usize,
    brightness_only: bool,
) -> f64 {
    let lhs = &first[first_pos..first_pos + CHANNELS];
    let rhs = &second[second_pos..second_pos + CHANNELS];
    if lhs == rhs {
        return 0.0;
    }

    let (r1, g1, b1) = blend_on_white(lhs);
    let (r2, g2, b2) = blend_on_white(rhs);

    let luma1 = rgb_to_y(r1, g1, b1);
    let luma2 = rgb_to_y(r2, g2, b2);
    let luma = luma1 - luma2;

    if brightness_only {
        return luma;
    }

    let in_phase = rgb_to_i(r1, g1, b1) - rgb_to_i(r2, g2, b2);
    let quadrature = rgb_to_q(r1, g1, b1) - rgb_to_q(r2, g2, b2);
    let delta = (0.5053 * luma).mul_add(
        luma,
        (0.299 * in_phase).mul_add(in_phase, 0.1957 * quadrature * quadrature),
    );

    if luma1 > luma2 { -delta } else { delta }
}

fn blend_on_white(pixel: &[u8]) -> (f64, f64, f64) {
    let red = f64::from(pixel[0]);
    let green = f64::from(pixel[1]);
    let blue = f64::from(pixel[2]);
    let alpha = pixel[3];
    if alpha == 255 {
        return (red, green, blue);
    }
    let opacity = f64::from(alpha) / 255.0;
    (
        blend(red, opacity),
        blend(green, opacity),
        blend(blue, opacity),
    )
}

fn blend(channel: f64, opacity: f64) -> f64 {
    (channel - 255.0).mul_add(opacity, 255.0)
}

fn rgb_to_y(red: f64, green: f64, blue: f64) -> f64 {
    red.mul_add(0.298_895_31, green.mul_add(0.586_622_47, blue * 0.114_482_23))
}

fn rgb_to_i(red: f64, green: f64, blue: f64) -> f64 {
    red.mul_add(0.595_977_99, green.mul_add(-0.274_176_10, blue * -0.321_801_89))
}

fn rgb_to_q(red: f64, green: f64, blue: f64) -> f64 {
    red.mul_add(0.211_470_17, green.mul_add(-0.522_617_11, blue * 0.311_146_94))
}

fn draw_pixel(out: &mut [u8], pos: usize, color: [u8; 3]) {
    out[pos..pos + 3].copy_from_slice(&color);
    out[pos + 3] = 255;
}

fn draw_gray_pixel(image: &[u8], pos: usize, alpha: f64, out: &mut [u8]) {
    let pixel = &image[pos..pos + CHANNELS];
    let luma = rgb_to_y(
        f64::from(pixel[0]),
        f64::from(pixel[1]),
        f64::from(pixel[2]),
    );
    let value = blend(luma, alpha * f64::from(pixel[3]) / 255.0).clamp(0.0, 255.0) as u8;
    draw_pixel(out, pos, [value, value, value]);
}
