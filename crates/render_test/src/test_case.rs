//! One fixture's runtime state, from the first render until it is scored.

use crate::config::FixturePaths;
use crate::engine::{EngineState, Suspension};
use crate::error::SetupError;
use crate::frontend::Renderer;
use crate::localize::UrlLocalizer;
use crate::metadata::{Fixture, TestMetadata};
use crate::operation::Operation;
use crate::style::StyleDocument;
use image::RgbaImage;
use log::debug;
use std::collections::VecDeque;

/// A fixture being executed against a renderer.
///
/// The style document is owned here and only ever replaced wholesale, by
/// `setStyle`. Viewport size and pixel ratio come from the metadata and never
/// change.
pub struct TestCase<'render> {
    pub(crate) metadata: TestMetadata,
    pub(crate) document: StyleDocument,
    pub(crate) operations: VecDeque<Operation>,
    pub(crate) suspension: Option<Suspension>,
    pub(crate) state: EngineState,
    pub(crate) renderer: &'render mut dyn Renderer,
    pub(crate) localizer: UrlLocalizer,
    pub(crate) paths: FixturePaths,
    frame: Option<RgbaImage>,
    renders: usize,
}

impl<'render> TestCase<'render> {
    /// Takes ownership of a fixture: decodes its operations and localizes the
    /// style's resource URLs.
    ///
    /// # Errors
    ///
    /// Returns an error if the `operations` list is malformed.
    pub fn new(
        fixture: Fixture,
        paths: &FixturePaths,
        renderer: &'render mut dyn Renderer,
    ) -> Result<Self, SetupError> {
        let Fixture {
            metadata,
            mut document,
        } = fixture;

        let operations = document
            .take_operations()
            .map(Operation::parse_list)
            .transpose()
            .map_err(|err| SetupError::MalformedOperation(err.to_string()))?
            .unwrap_or_default();

        let localizer = UrlLocalizer::new(paths);
        document.localize(&localizer);

        let state = if metadata.has_operations {
            EngineState::Idle
        } else {
            EngineState::Completed
        };

        Ok(Self {
            metadata,
            document,
            operations,
            suspension: None,
            state,
            renderer,
            localizer,
            paths: paths.clone(),
            frame: None,
            renders: 0,
        })
    }

    /// Sends the current style document to the renderer.
    ///
    /// # Errors
    ///
    /// Returns an error if the renderer rejects the style.
    pub fn load_style(&mut self) -> Result<(), SetupError> {
        let json = self.document.to_json();
        debug!("style:\n{json}");
        self.renderer.load_style(&json).map_err(SetupError::Renderer)
    }

    /// Replaces the active style document and loads it.
    ///
    /// # Errors
    ///
    /// Returns an error if the renderer rejects the style; the previous
    /// document stays active in that case.
    pub fn replace_document(&mut self, document: StyleDocument) -> Result<(), SetupError> {
        let json = document.to_json();
        debug!("style:\n{json}");
        self.renderer.load_style(&json).map_err(SetupError::Renderer)?;
        self.document = document;
        Ok(())
    }

    /// Renders a frame and keeps it as the latest result.
    ///
    /// # Errors
    ///
    /// Returns an error if the renderer fails.
    pub fn render(&mut self) -> Result<(), SetupError> {
        let frame = self.renderer.render().map_err(SetupError::Renderer)?;
        self.renders += 1;
        self.frame = Some(frame);
        Ok(())
    }

    #[must_use]
    pub const fn metadata(&self) -> &TestMetadata {
        &self.metadata
    }

    #[must_use]
    pub const fn document(&self) -> &StyleDocument {
        &self.document
    }

    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// Operations not yet consumed, head first.
    #[must_use]
    pub fn pending_operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    /// Whether a sleep timer is armed and has not yet been consumed.
    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        self.suspension.is_some()
    }

    /// Number of frames rendered so far.
    #[must_use]
    pub const fn render_count(&self) -> usize {
        self.renders
    }

    #[must_use]
    pub const fn frame(&self) -> Option<&RgbaImage> {
        self.frame.as_ref()
    }

    /// Hands the latest frame to the scorer.
    pub fn take_frame(&mut self) -> Option<RgbaImage> {
        self.frame.take()
    }
}
