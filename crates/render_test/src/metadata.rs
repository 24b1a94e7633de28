//! Per-fixture settings read from the style's `metadata.test` block.

use crate::error::SetupError;
use crate::frontend::{MapMode, MapOptions, ProjectionMode, Size};
use crate::style::StyleDocument;
use log::warn;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Default maximum mismatch fraction.
pub const DEFAULT_ALLOWED: f64 = 0.000_15;

/// Test flags this harness cannot honour; fixtures using them are skipped.
const UNSUPPORTED_FLAGS: [&str; 5] = [
    "debug",
    "collisionDebug",
    "showOverdrawInspector",
    "fadeDuration",
    "addFakeCanvas",
];

/// Scalar settings of one fixture.
#[derive(Debug, Clone, PartialEq)]
pub struct TestMetadata {
    /// Path of the fixture's style file.
    pub path: PathBuf,
    pub size: Size,
    pub pixel_ratio: f32,
    /// Maximum mismatch fraction that still passes.
    pub allowed: f64,
    pub description: String,
    pub map_mode: MapMode,
    pub cross_source_collisions: bool,
    pub axonometric: bool,
    pub x_skew: f64,
    pub y_skew: f64,
    /// Whether `operations` is declared, even if empty.
    pub has_operations: bool,
}

impl TestMetadata {
    /// Defaults for a fixture without a `metadata.test` block.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            size: Size::default(),
            pixel_ratio: 1.0,
            allowed: DEFAULT_ALLOWED,
            description: String::new(),
            map_mode: MapMode::Static,
            cross_source_collisions: false,
            axonometric: false,
            x_skew: 0.0,
            y_skew: 1.0,
            has_operations: false,
        }
    }

    /// Reads the `metadata.test` block of `document`.
    ///
    /// # Errors
    ///
    /// Returns an error if a declared field has the wrong type.
    pub fn parse(path: &Path, document: &StyleDocument) -> Result<Self, SetupError> {
        let mut metadata = Self::new(path);

        let Some(test) = document.test_block() else {
            warn!("Style has no 'metadata.test': {}", path.display());
            return Ok(metadata);
        };

        if let Some(width) = dimension(test, "width")? {
            metadata.size.width = width;
        }
        if let Some(height) = dimension(test, "height")? {
            metadata.size.height = height;
        }
        if let Some(ratio) = number(test, "pixelRatio")? {
            metadata.pixel_ratio = ratio as f32;
        }
        if let Some(allowed) = number(test, "allowed")? {
            metadata.allowed = allowed;
        }
        if let Some(description) = string(test, "description")? {
            description.clone_into(&mut metadata.description);
        }
        if let Some(mode) = string(test, "mapMode")? {
            metadata.map_mode = if mode == "tile" {
                MapMode::Tile
            } else {
                MapMode::Static
            };
        }
        if let Some(operations) = test.get("operations") {
            if !operations.is_array() {
                return Err(invalid("operations", "an array"));
            }
            metadata.has_operations = true;
        }
        if let Some(collisions) = boolean(test, "crossSourceCollisions")? {
            metadata.cross_source_collisions = collisions;
        }
        if let Some(axonometric) = boolean(test, "axonometric")? {
            metadata.axonometric = axonometric;
        }
        if let Some(skew) = test.get("skew") {
            let pair = skew
                .as_array()
                .filter(|pair| pair.len() == 2)
                .and_then(|pair| Some((pair[0].as_f64()?, pair[1].as_f64()?)))
                .ok_or_else(|| invalid("skew", "two numbers"))?;
            (metadata.x_skew, metadata.y_skew) = pair;
        }

        Ok(metadata)
    }

    /// Options the renderer is created with.
    #[must_use]
    pub const fn map_options(&self) -> MapOptions {
        MapOptions {
            mode: self.map_mode,
            size: self.size,
            pixel_ratio: self.pixel_ratio,
            cross_source_collisions: self.cross_source_collisions,
            projection: ProjectionMode {
                axonometric: self.axonometric,
                x_skew: self.x_skew,
                y_skew: self.y_skew,
            },
        }
    }

    /// Directory holding the fixture's style and reference image.
    #[must_use]
    pub fn fixture_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// A parsed fixture ready to run.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub metadata: TestMetadata,
    pub document: StyleDocument,
}

/// Result of loading a fixture from disk.
#[derive(Debug)]
pub enum FixtureLoad {
    Ready(Fixture),
    /// The fixture needs a test flag this harness does not implement.
    Unsupported { path: PathBuf, flag: &'static str },
}

impl Fixture {
    /// Reads a fixture's style file and its metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the style cannot be read or parsed, or its metadata
    /// is malformed.
    pub fn load(path: &Path) -> Result<FixtureLoad, SetupError> {
        let document = StyleDocument::read(path)?;
        if let Some(flag) = unsupported_flag(&document) {
            return Ok(FixtureLoad::Unsupported {
                path: path.to_path_buf(),
                flag,
            });
        }
        let metadata = TestMetadata::parse(path, &document)?;
        Ok(FixtureLoad::Ready(Self { metadata, document }))
    }
}

/// First test flag in `document` that this harness cannot honour.
#[must_use]
pub fn unsupported_flag(document: &StyleDocument) -> Option<&'static str> {
    let test = document.test_block()?;
    UNSUPPORTED_FLAGS
        .into_iter()
        .find(|flag| test.contains_key(*flag))
}

const fn invalid(field: &'static str, expected: &'static str) -> SetupError {
    SetupError::InvalidMetadata { field, expected }
}

fn number(test: &Map<String, Value>, field: &'static str) -> Result<Option<f64>, SetupError> {
    test.get(field)
        .map(|value| value.as_f64().ok_or_else(|| invalid(field, "a number")))
        .transpose()
}

fn dimension(test: &Map<String, Value>, field: &'static str) -> Result<Option<u32>, SetupError> {
    test.get(field)
        .map(|value| {
            value
                .as_u64()
                .and_then(|raw| u32::try_from(raw).ok())
                .ok_or_else(|| invalid(field, "a non-negative integer"))
        })
        .transpose()
}

fn boolean(test: &Map<String, Value>, field: &'static str) -> Result<Option<bool>, SetupError> {
    test.get(field)
        .map(|value| value.as_bool().ok_or_else(|| invalid(field, "a boolean")))
        .transpose()
}

fn string<'doc>(
    test: &'doc Map<String, Value>,
    field: &'static str,
) -> Result<Option<&'doc str>, SetupError> {
    test.get(field)
        .map(|value| value.as_str().ok_or_else(|| invalid(field, "a string")))
        .transpose()
}
