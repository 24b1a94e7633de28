//! Replays a test case's operation queue.
//!
//! Operations run strictly in fixture order, one [`TestCase::step`] at a time.
//! A step pops the head of the queue only after its effect has been applied;
//! a failed step leaves the head in place.
//!
//! `sleep` is the only suspension point. Its first encounter arms a one-shot
//! timer and leaves the operation at the head of the queue; when the timer
//! fires it pushes a resume event into the engine's single-threaded event
//! queue, the suspension token is marked fired, and the next step consumes the
//! sleep and carries on. A suspended case never re-arms its timer.

use crate::error::{SetupError, TestFailure};
use crate::localize::localize_style_path;
use crate::operation::{ImageOperand, Operation, StyleSource};
use crate::style::StyleDocument;
use crate::test_case::TestCase;
use image::RgbaImage;
use log::{debug, error, info};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::yield_now;
use tokio::time::sleep;

/// Where the engine is in draining the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Operations remain and nothing is pending.
    Idle,
    /// An operation is being applied.
    Running,
    /// A sleep timer is armed.
    Suspended,
    /// The queue is empty.
    Completed,
}

/// Token for an armed sleep, stored on the test case until consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suspension {
    pub duration: Duration,
    /// Set when the timer has fired.
    pub fired: bool,
}

/// Outcome of one engine step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// An operation was consumed and more remain.
    Advanced,
    /// A sleep was encountered; arm a timer for the duration and resume after.
    Suspend(Duration),
    /// The armed timer has not fired yet.
    Pending,
    /// The queue is empty.
    Completed,
}

/// Effect of applying the head operation.
enum Applied {
    /// Pop the operation.
    Consumed,
    /// Keep the operation at the head of the queue.
    Deferred(Step),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Continue,
    Resume,
}

impl TestCase<'_> {
    /// Applies the operation at the head of the queue.
    ///
    /// # Errors
    ///
    /// Returns [`TestFailure::UnsupportedOperation`] for operations this
    /// harness does not implement, and a setup failure if an image asset or
    /// style file cannot be loaded or the renderer fails. The failing
    /// operation stays at the head of the queue.
    pub fn step(&mut self) -> Result<Step, TestFailure> {
        let Some(mut operation) = self.operations.pop_front() else {
            self.state = EngineState::Completed;
            return Ok(Step::Completed);
        };

        self.state = EngineState::Running;
        debug!("Executing operation {}", operation.name());

        match self.apply(&mut operation) {
            Ok(Applied::Consumed) => {}
            Ok(Applied::Deferred(step)) => {
                self.operations.push_front(operation);
                return Ok(step);
            }
            Err(failure) => {
                self.operations.push_front(operation);
                self.state = EngineState::Idle;
                return Err(failure);
            }
        }

        if self.operations.is_empty() {
            self.state = EngineState::Completed;
            Ok(Step::Completed)
        } else {
            self.state = EngineState::Idle;
            Ok(Step::Advanced)
        }
    }

    /// Marks an armed sleep as fired. Returns `false` if nothing was armed.
    pub fn resume(&mut self) -> bool {
        let Some(suspension) = self.suspension.as_mut() else {
            return false;
        };
        suspension.fired = true;
        true
    }

    /// Drains the operation queue, waiting out sleeps on the current runtime.
    ///
    /// Must be polled on a runtime with timers enabled. Sleep timers run as
    /// spawned tasks that report back through the engine's event queue.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error.
    pub async fn run_operations(&mut self) -> Result<(), TestFailure> {
        let (events, mut inbox) = mpsc::unbounded_channel();
        let _ignore_kickoff = events.send(Event::Continue);

        while let Some(event) = inbox.recv().await {
            if event == Event::Resume {
                self.resume();
            }

            // One run-loop tick before touching the renderer.
            yield_now().await;

            match self.step()? {
                Step::Advanced => {
                    let _ignore_continue = events.send(Event::Continue);
                }
                Step::Suspend(duration) => {
                    debug!("Sleeping for {duration:?}");
                    let timer = events.clone();
                    tokio::spawn(async move {
                        sleep(duration).await;
                        let _ignore_resume = timer.send(Event::Resume);
                    });
                }
                Step::Pending => {}
                Step::Completed => return Ok(()),
            }
        }

        Ok(())
    }

    fn apply(&mut self, operation: &mut Operation) -> Result<Applied, TestFailure> {
        match operation {
            Operation::Wait => self.render()?,
            Operation::Sleep { duration } => return Ok(self.arm_sleep(*duration)),
            Operation::AddImage(image) | Operation::UpdateImage(image) => {
                self.add_image(image)?;
                self.render()?;
            }
            Operation::SetStyle(StyleSource::File(url)) => {
                let path = localize_style_path(url, &self.paths);
                let mut document = StyleDocument::read(&path).inspect_err(|err| {
                    error!("Unable to open style file {url}: {err}");
                })?;
                document.localize(&self.localizer);
                self.replace_document(document)?;
                self.render()?;
            }
            Operation::SetStyle(StyleSource::Inline(style)) => {
                self.localizer.localize_style(style);
                self.replace_document(StyleDocument::from_value(style.clone()))?;
                self.render()?;
            }
            Operation::Unsupported { name } => {
                error!("Unsupported operation {name}");
                return Err(TestFailure::UnsupportedOperation(name.clone()));
            }
        }
        Ok(Applied::Consumed)
    }

    fn arm_sleep(&mut self, duration: Duration) -> Applied {
        match self.suspension.take() {
            Some(Suspension { fired: true, .. }) => Applied::Consumed,
            Some(armed) => {
                self.suspension = Some(armed);
                self.state = EngineState::Suspended;
                Applied::Deferred(Step::Pending)
            }
            None => {
                self.suspension = Some(Suspension {
                    duration,
                    fired: false,
                });
                self.state = EngineState::Suspended;
                Applied::Deferred(Step::Suspend(duration))
            }
        }
    }

    fn add_image(&mut self, image: &ImageOperand) -> Result<(), SetupError> {
        let path = self.paths.integration().join(&image.path);
        let bitmap = decode_image(&path).map_err(|reason| {
            error!("Failed to load image {}: {reason}", path.display());
            SetupError::ImageAsset {
                name: image.name.clone(),
                path: path.clone(),
                reason,
            }
        })?;
        info!("{}", path.display());

        let pixel_ratio = image.pixel_ratio.unwrap_or(self.metadata.pixel_ratio);
        self.renderer
            .add_image(&image.name, bitmap, pixel_ratio)
            .map_err(SetupError::Renderer)
    }
}

fn decode_image(path: &Path) -> Result<RgbaImage, String> {
    let bytes = fs::read(path).map_err(|err| err.to_string())?;
    image::load_from_memory(&bytes)
        .map(|decoded| decoded.to_rgba8())
        .map_err(|err| err.to_string())
}
