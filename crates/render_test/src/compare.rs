//! Scores a rendered frame against the fixture's reference image.

use crate::config::RunnerConfig;
use crate::error::SetupError;
use crate::frontend::Size;
use anyhow::Result;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder as _, RgbaImage};
use log::{debug, info};
use pixelmatch::{Options, pixelmatch};
use std::fs;
use std::io;
use std::path::Path;

/// Per-channel sensitivity handed to the pixel-difference function.
pub const DIFF_THRESHOLD: f64 = 0.1;

/// Reference image next to the fixture's style file.
pub const EXPECTED_FILE: &str = "expected.png";
/// Last rendered frame.
pub const ACTUAL_FILE: &str = "actual.png";
/// Visual diff between actual and expected.
pub const DIFF_FILE: &str = "diff.png";

/// Mismatch count of one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparisonResult {
    pub mismatched_pixels: usize,
    pub total_pixels: u64,
}

impl ComparisonResult {
    /// Fraction of mismatched pixels in `[0, 1]`.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.total_pixels == 0 {
            return 0.0;
        }
        self.mismatched_pixels as f64 / self.total_pixels as f64
    }
}

/// What the scorer did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Compared(ComparisonResult),
    /// The frame was stored as the new reference.
    Updated,
}

impl Score {
    /// Mismatch fraction, zero in update mode.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        match self {
            Self::Compared(result) => result.fraction(),
            Self::Updated => 0.0,
        }
    }
}

/// Pass/fail decision against a fixture's tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed,
    Updated,
}

impl Verdict {
    #[must_use]
    pub fn of(score: &Score, allowed: f64) -> Self {
        match score {
            Score::Updated => Self::Updated,
            Score::Compared(result) if result.fraction() <= allowed => Self::Passed,
            Score::Compared(_) => Self::Failed,
        }
    }
}

/// Compares frames with `expected.png`, or replaces it in update mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageScorer {
    pub update_expected: bool,
    pub read_only: bool,
}

impl ImageScorer {
    #[must_use]
    pub const fn new(update_expected: bool, read_only: bool) -> Self {
        Self {
            update_expected,
            read_only,
        }
    }

    #[must_use]
    pub const fn from_config(config: &RunnerConfig) -> Self {
        Self::new(config.update_expected, config.read_only)
    }

    /// Scores `actual` against `fixture_dir/expected.png`.
    ///
    /// Writes `actual.png` and `diff.png` next to the reference unless
    /// running read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is missing or undecodable, its size
    /// differs from the frame, or an artifact cannot be written.
    pub fn check(&self, fixture_dir: &Path, actual: &RgbaImage) -> Result<Score, SetupError> {
        let expected_path = fixture_dir.join(EXPECTED_FILE);

        if self.update_expected {
            info!("Updating {}", expected_path.display());
            write_artifact(&expected_path, actual)?;
            return Ok(Score::Updated);
        }

        let expected = read_expected(&expected_path)?;

        if !self.read_only {
            write_artifact(&fixture_dir.join(ACTUAL_FILE), actual)?;
        }

        let actual_size = Size::of(actual);
        let expected_size = Size::of(&expected);
        if actual_size != expected_size {
            return Err(SetupError::SizeMismatch {
                expected: expected_size,
                actual: actual_size,
            });
        }

        let mut diff = RgbaImage::new(actual_size.width, actual_size.height);
        let mismatched_pixels = pixelmatch(
            actual.as_raw(),
            expected.as_raw(),
            Some(&mut *diff),
            actual_size.width,
            actual_size.height,
            &Options::with_threshold(DIFF_THRESHOLD),
        )?;

        if !self.read_only {
            write_artifact(&fixture_dir.join(DIFF_FILE), &diff)?;
        }

        let result = ComparisonResult {
            mismatched_pixels,
            total_pixels: actual_size.area(),
        };
        debug!(
            "{}: {mismatched_pixels} of {} pixels differ",
            fixture_dir.display(),
            result.total_pixels
        );
        Ok(Score::Compared(result))
    }
}

fn read_expected(path: &Path) -> Result<RgbaImage, SetupError> {
    let bytes = fs::read(path).map_err(|source| SetupError::MissingExpected {
        path: path.to_path_buf(),
        source,
    })?;
    image::load_from_memory(&bytes)
        .map(|decoded| decoded.to_rgba8())
        .map_err(|source| SetupError::UndecodableExpected {
            path: path.to_path_buf(),
            source,
        })
}

fn write_artifact(path: &Path, image: &RgbaImage) -> Result<(), SetupError> {
    write_png_if_changed(path, image)
        .map(|_written| ())
        .map_err(|source| SetupError::Artifact {
            path: path.to_path_buf(),
            source,
        })
}

/// Writes `bytes` to `path` unless the file already holds them. Returns true if written.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_bytes_if_changed(path: &Path, bytes: &[u8]) -> io::Result<bool> {
    if let Ok(existing) = fs::read(path)
        && existing == bytes
    {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(true)
}

/// Encodes an RGBA image as PNG and writes it only if changed. Returns true if written.
///
/// # Errors
///
/// Returns an error if encoding or writing fails.
pub fn write_png_if_changed(path: &Path, image: &RgbaImage) -> Result<bool> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgba8.into(),
    )?;
    Ok(write_bytes_if_changed(path, &buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn solid(width: u32, height: u32, colour: Rgba<u8>) -> RgbaImage {
        RgbaImage::from_pixel(width, height, colour)
    }

    #[test]
    fn verdict_uses_inclusive_tolerance() {
        let fraction = |mismatched_pixels| {
            Score::Compared(ComparisonResult {
                mismatched_pixels,
                total_pixels: 10_000,
            })
        };
        assert_eq!(Verdict::of(&fraction(2), 0.000_15), Verdict::Failed);
        assert_eq!(Verdict::of(&fraction(1), 0.000_15), Verdict::Passed);
        assert_eq!(Verdict::of(&fraction(0), 0.0), Verdict::Passed);
        assert_eq!(Verdict::of(&Score::Updated, 0.0), Verdict::Updated);
    }

    /// # Errors
    /// Returns an error if the fixture directory cannot be prepared.
    #[test]
    fn identical_images_score_zero() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let frame = solid(8, 8, WHITE);
        frame.save(dir.path().join(EXPECTED_FILE))?;

        let score = ImageScorer::default().check(dir.path(), &frame)?;
        assert_eq!(
            score,
            Score::Compared(ComparisonResult {
                mismatched_pixels: 0,
                total_pixels: 64
            })
        );
        assert!(dir.path().join(ACTUAL_FILE).exists());
        assert!(dir.path().join(DIFF_FILE).exists());
        Ok(())
    }

    /// # Errors
    /// Returns an error if the fixture directory cannot be prepared.
    #[test]
    fn counts_mismatched_pixels() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        solid(4, 4, WHITE).save(dir.path().join(EXPECTED_FILE))?;
        let mut frame = solid(4, 4, WHITE);
        frame.put_pixel(0, 0, RED);

        let score = ImageScorer::default().check(dir.path(), &frame)?;
        assert!((score.fraction() - 1.0 / 16.0).abs() < f64::EPSILON);

        let diff = image::open(dir.path().join(DIFF_FILE))?.to_rgba8();
        assert_eq!(diff.get_pixel(0, 0), &RED);
        Ok(())
    }

    /// # Errors
    /// Returns an error if the fixture directory cannot be prepared.
    #[test]
    fn reference_problems_are_setup_failures() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let scorer = ImageScorer::default();
        let frame = solid(4, 4, WHITE);

        assert!(matches!(
            scorer.check(dir.path(), &frame),
            Err(SetupError::MissingExpected { .. })
        ));

        fs::write(dir.path().join(EXPECTED_FILE), b"not a png")?;
        assert!(matches!(
            scorer.check(dir.path(), &frame),
            Err(SetupError::UndecodableExpected { .. })
        ));

        solid(2, 4, WHITE).save(dir.path().join(EXPECTED_FILE))?;
        let result = scorer.check(dir.path(), &frame);
        assert!(matches!(
            result,
            Err(SetupError::SizeMismatch { expected, actual })
                if expected == Size::new(2, 4) && actual == Size::new(4, 4)
        ));
        Ok(())
    }

    /// # Errors
    /// Returns an error if the fixture directory cannot be prepared.
    #[test]
    fn read_only_writes_nothing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let frame = solid(4, 4, WHITE);
        frame.save(dir.path().join(EXPECTED_FILE))?;

        ImageScorer::new(false, true).check(dir.path(), &frame)?;
        assert!(!dir.path().join(ACTUAL_FILE).exists());
        assert!(!dir.path().join(DIFF_FILE).exists());
        Ok(())
    }

    /// # Errors
    /// Returns an error if the fixture directory cannot be prepared.
    #[test]
    fn update_mode_replaces_reference() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        solid(2, 2, WHITE).save(dir.path().join(EXPECTED_FILE))?;
        let frame = solid(4, 4, RED);

        let score = ImageScorer::new(true, false).check(dir.path(), &frame)?;
        assert_eq!(score, Score::Updated);

        let stored = image::open(dir.path().join(EXPECTED_FILE))?.to_rgba8();
        assert_eq!(stored, frame);
        assert!(!dir.path().join(DIFF_FILE).exists());
        Ok(())
    }

    /// # Errors
    /// Returns an error if the temporary file cannot be written.
    #[test]
    fn skips_unchanged_writes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join(ACTUAL_FILE);
        let frame = solid(3, 3, RED);

        assert!(write_png_if_changed(&path, &frame)?);
        assert!(!write_png_if_changed(&path, &frame)?);
        assert!(write_png_if_changed(&path, &solid(3, 3, WHITE))?);
        Ok(())
    }
}
