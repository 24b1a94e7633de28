//! Seams to the rendering engine.
//!
//! The harness never rasterizes anything itself. A [`RendererFactory`] creates a
//! [`Renderer`] per fixture from the fixture's [`MapOptions`]; the renderer loads
//! serialized style JSON, accepts runtime images and produces RGBA frames.

use anyhow::Result;
use core::fmt;
use image::RgbaImage;

/// Viewport size in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size of an RGBA bitmap.
    #[must_use]
    pub fn of(image: &RgbaImage) -> Self {
        Self::new(image.width(), image.height())
    }

    /// Number of pixels covered.
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl Default for Size {
    fn default() -> Self {
        Self::new(512, 512)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}x{}", self.width, self.height)
    }
}

/// How the renderer produces frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MapMode {
    /// One still image of the whole viewport.
    #[default]
    Static,
    /// A single tile rendered in isolation.
    Tile,
}

/// Projection tweaks applied on top of the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionMode {
    pub axonometric: bool,
    pub x_skew: f64,
    pub y_skew: f64,
}

impl Default for ProjectionMode {
    fn default() -> Self {
        Self {
            axonometric: false,
            x_skew: 0.0,
            y_skew: 1.0,
        }
    }
}

/// Everything a renderer needs to know before the first frame. Fixed for the
/// lifetime of a test case.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapOptions {
    pub mode: MapMode,
    pub size: Size,
    pub pixel_ratio: f32,
    pub cross_source_collisions: bool,
    pub projection: ProjectionMode,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            mode: MapMode::Static,
            size: Size::default(),
            pixel_ratio: 1.0,
            cross_source_collisions: false,
            projection: ProjectionMode::default(),
        }
    }
}

/// A rendering engine instance driven by one test case at a time.
pub trait Renderer {
    /// Replaces the active style with the given serialized style document.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the style.
    fn load_style(&mut self, style_json: &str) -> Result<()>;

    /// Registers an image under `name`, replacing any image already registered
    /// under that name.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the image.
    fn add_image(&mut self, name: &str, image: RgbaImage, pixel_ratio: f32) -> Result<()>;

    /// Blocks until a frame for the current style is available.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render(&mut self) -> Result<RgbaImage>;
}

/// Creates renderers configured for a fixture.
pub trait RendererFactory {
    /// # Errors
    ///
    /// Returns an error if the engine cannot be initialised with `options`.
    fn create(&mut self, options: &MapOptions) -> Result<Box<dyn Renderer>>;
}

impl<F> RendererFactory for F
where
    F: FnMut(&MapOptions) -> Result<Box<dyn Renderer>>,
{
    fn create(&mut self, options: &MapOptions) -> Result<Box<dyn Renderer>> {
        self(options)
    }
}
