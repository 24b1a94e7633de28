//! Render-test harness for map renderers.
//!
//! Each fixture is a style document whose `metadata.test` block describes the
//! viewport, a mismatch tolerance and an optional list of scripted operations.
//! The harness rewrites the style's resource URLs to local files, hands it to a
//! [`frontend::Renderer`], replays the operations in order (suspending on
//! `sleep` without blocking the run loop) and scores the last frame against the
//! fixture's `expected.png` with a perceptual pixel diff.

pub mod cli;
pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod frontend;
pub mod localize;
pub mod metadata;
pub mod operation;
pub mod runner;
pub mod style;
pub mod suite;
pub mod test_case;
pub mod test_support;

pub use compare::{ImageScorer, Score, Verdict};
pub use config::{FixturePaths, RunnerConfig};
pub use error::{ParseError, SetupError, TestFailure};
pub use frontend::{MapOptions, Renderer, RendererFactory};
pub use metadata::{Fixture, FixtureLoad, TestMetadata};
pub use operation::Operation;
pub use runner::{TestReport, TestRunner};
pub use test_case::TestCase;
