//! Drives one fixture from first render to score.

use crate::compare::{ImageScorer, Score, Verdict};
use crate::config::{FixturePaths, RunnerConfig};
use crate::error::{SetupError, TestFailure};
use crate::frontend::Renderer;
use crate::metadata::Fixture;
use crate::test_case::TestCase;
use log::info;
use std::path::PathBuf;
use tokio::task::yield_now;

/// Outcome of one scored fixture.
#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    pub path: PathBuf,
    pub description: String,
    /// Tolerance the score is judged against.
    pub allowed: f64,
    pub score: Score,
}

impl TestReport {
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        Verdict::of(&self.score, self.allowed)
    }

    #[must_use]
    pub fn fraction(&self) -> f64 {
        self.score.fraction()
    }
}

/// Runs fixtures one at a time against a caller-supplied renderer.
#[derive(Debug, Clone)]
pub struct TestRunner {
    paths: FixturePaths,
    scorer: ImageScorer,
}

impl TestRunner {
    #[must_use]
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            paths: config.paths.clone(),
            scorer: ImageScorer::from_config(config),
        }
    }

    #[must_use]
    pub const fn paths(&self) -> &FixturePaths {
        &self.paths
    }

    /// Loads the fixture's style, renders it once, replays its operations if
    /// it declares any, and scores the last frame.
    ///
    /// # Errors
    ///
    /// Returns a setup failure if the fixture cannot be run or scored, and
    /// [`TestFailure::UnsupportedOperation`] if it uses an operation this
    /// harness does not implement.
    pub async fn run(
        &self,
        fixture: Fixture,
        renderer: &mut dyn Renderer,
    ) -> Result<TestReport, TestFailure> {
        let mut case = TestCase::new(fixture, &self.paths, renderer)?;

        case.load_style()?;
        yield_now().await;
        case.render()?;

        if case.metadata().has_operations {
            case.run_operations().await?;
        }

        let metadata = case.metadata().clone();
        let frame = case.take_frame().ok_or(SetupError::NothingRendered)?;
        let score = self.scorer.check(metadata.fixture_dir(), &frame)?;

        let report = TestReport {
            path: metadata.path,
            description: metadata.description,
            allowed: metadata.allowed,
            score,
        };
        info!(
            "{} {:?} ({:.6})",
            report.path.display(),
            report.verdict(),
            report.fraction()
        );
        Ok(report)
    }
}
