//! A renderer double for exercising the harness without a rendering engine.

use crate::frontend::{MapOptions, Renderer, Size};
use anyhow::{Result, anyhow};
use image::{Rgba, RgbaImage};

/// Records every call and renders a solid colour.
#[derive(Debug, Clone)]
pub struct RecordingRenderer {
    /// Style JSON in load order.
    pub styles: Vec<String>,
    /// Registered images as `(name, size, pixel ratio)`.
    pub images: Vec<(String, Size, f32)>,
    /// Number of frames produced.
    pub renders: usize,
    /// Size of rendered frames.
    pub size: Size,
    /// Colour of rendered frames.
    pub fill: Rgba<u8>,
    /// Make `render` fail.
    pub fail_render: bool,
}

impl RecordingRenderer {
    #[must_use]
    pub const fn new(size: Size, fill: Rgba<u8>) -> Self {
        Self {
            styles: Vec::new(),
            images: Vec::new(),
            renders: 0,
            size,
            fill,
            fail_render: false,
        }
    }

    /// A renderer sized the way the engine would size it for `options`.
    #[must_use]
    pub fn for_options(options: &MapOptions, fill: Rgba<u8>) -> Self {
        let scale = |logical: u32| (f64::from(logical) * f64::from(options.pixel_ratio)).round() as u32;
        Self::new(
            Size::new(scale(options.size.width), scale(options.size.height)),
            fill,
        )
    }

    /// The most recently loaded style.
    #[must_use]
    pub fn last_style(&self) -> Option<&str> {
        self.styles.last().map(String::as_str)
    }
}

impl Renderer for RecordingRenderer {
    fn load_style(&mut self, style_json: &str) -> Result<()> {
        self.styles.push(style_json.to_owned());
        Ok(())
    }

    fn add_image(&mut self, name: &str, image: RgbaImage, pixel_ratio: f32) -> Result<()> {
        self.images
            .push((name.to_owned(), Size::of(&image), pixel_ratio));
        Ok(())
    }

    fn render(&mut self) -> Result<RgbaImage> {
        if self.fail_render {
            return Err(anyhow!("render failed"));
        }
        self.renders += 1;
        Ok(RgbaImage::from_pixel(
            self.size.width,
            self.size.height,
            self.fill,
        ))
    }
}
