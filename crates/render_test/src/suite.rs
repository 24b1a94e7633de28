//! Runs every fixture below a tests root and tallies the results.

use crate::compare::Verdict;
use crate::config::{FixturePaths, RunnerConfig};
use crate::error::TestFailure;
use crate::frontend::{MapOptions, Renderer, RendererFactory};
use crate::metadata::{Fixture, FixtureLoad};
use crate::runner::{TestReport, TestRunner};
use log::{error, info, warn};
use rand::SeedableRng as _;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom as _;
use serde_json::Value;
use std::fs::{self, read_dir};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of a fixture's style document.
pub const STYLE_FILE: &str = "style.json";

/// How a suite run selects and orders fixtures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteOptions {
    /// Directory searched recursively for fixtures.
    pub tests_root: PathBuf,
    /// Keep only fixtures whose directory contains one of these fragments.
    pub filters: Vec<String>,
    pub shuffle: bool,
    pub seed: u64,
    /// Reuse the previous renderer when the next fixture's map options match.
    pub recycle_renderer: bool,
}

impl SuiteOptions {
    /// Every fixture below the default render tests directory, in path order.
    #[must_use]
    pub fn new(paths: &FixturePaths) -> Self {
        Self {
            tests_root: paths.render_tests(),
            filters: Vec::new(),
            shuffle: false,
            seed: 1,
            recycle_renderer: false,
        }
    }
}

/// A fixture that did not pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Tally of a suite run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuiteSummary {
    pub passed: usize,
    pub failed: usize,
    /// Fixtures that could not be run or scored.
    pub errored: usize,
    /// Fixtures needing test flags this harness does not implement.
    pub unsupported: usize,
    pub ignored: usize,
    pub updated: usize,
    pub failures: Vec<SuiteFailure>,
}

impl SuiteSummary {
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.passed + self.failed + self.errored + self.unsupported + self.ignored + self.updated
    }

    /// Counts one fixture's outcome. Fatal failures are handed back instead.
    fn record(
        &mut self,
        path: &Path,
        outcome: Result<TestReport, TestFailure>,
    ) -> Result<(), SuiteError> {
        match outcome {
            Ok(report) => match report.verdict() {
                Verdict::Passed => self.passed += 1,
                Verdict::Updated => self.updated += 1,
                Verdict::Failed => {
                    self.failed += 1;
                    self.record_failure(
                        path,
                        format!(
                            "{:.6} of pixels differ, {} allowed",
                            report.fraction(),
                            report.allowed
                        ),
                    );
                }
            },
            Err(failure) if failure.is_fatal() => {
                return Err(SuiteError::Fatal {
                    path: path.to_path_buf(),
                    source: failure,
                });
            }
            Err(failure) => {
                error!("{}: {failure}", path.display());
                self.errored += 1;
                self.record_failure(path, failure.to_string());
            }
        }
        Ok(())
    }

    fn record_failure(&mut self, path: &Path, reason: String) {
        self.failures.push(SuiteFailure {
            path: path.to_path_buf(),
            reason,
        });
    }
}

/// A failure that stops the run.
#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("{}: {source}", .path.display())]
    Fatal {
        path: PathBuf,
        #[source]
        source: TestFailure,
    },
    #[error("failed to read fixture directory {}", .path.display())]
    UnreadableRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Every `style.json` below `root`, sorted by path.
///
/// # Errors
///
/// Returns [`SuiteError::UnreadableRoot`] if `root` or a directory below it
/// cannot be read.
pub fn collect_fixtures(root: &Path) -> Result<Vec<PathBuf>, SuiteError> {
    let mut fixtures = Vec::new();
    collect_recursively(root, &mut fixtures)?;
    fixtures.sort();
    Ok(fixtures)
}

fn collect_recursively(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), SuiteError> {
    let entries = read_dir(dir).map_err(|source| SuiteError::UnreadableRoot {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if path.is_dir() {
            collect_recursively(&path, out)?;
        } else if path.file_name().is_some_and(|name| name == STYLE_FILE) {
            out.push(path);
        }
    }
    Ok(())
}

/// Keeps fixtures whose directory path contains any of `filters`; all of them
/// when `filters` is empty.
#[must_use]
pub fn filter_fixtures(fixtures: Vec<PathBuf>, filters: &[String]) -> Vec<PathBuf> {
    if filters.is_empty() {
        return fixtures;
    }
    fixtures
        .into_iter()
        .filter(|path| {
            let dir = path.parent().unwrap_or(path.as_path()).to_string_lossy();
            filters.iter().any(|filter| dir.contains(filter.as_str()))
        })
        .collect()
}

/// Deterministically reorders fixtures for a given seed.
pub fn shuffle_fixtures(fixtures: &mut [PathBuf], seed: u64) {
    let mut rng = SmallRng::seed_from_u64(seed);
    fixtures.shuffle(&mut rng);
}

/// Fixture directories listed in the ignores file, resolved against the
/// integration root. A missing or malformed file yields an empty list.
#[must_use]
pub fn load_ignores(paths: &FixturePaths) -> Vec<PathBuf> {
    let path = paths.ignores_file();
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) => {
            error!("Unable to open ignores file {}: {err}", path.display());
            return Vec::new();
        }
    };
    let Ok(Value::Object(entries)) = serde_json::from_str::<Value>(&text) else {
        error!("Unable to parse ignores file {}", path.display());
        return Vec::new();
    };
    let integration = paths.integration();
    entries.keys().map(|key| integration.join(key)).collect()
}

fn is_ignored(fixture: &Path, ignores: &[PathBuf]) -> bool {
    let dir = fixture.parent().unwrap_or(fixture);
    ignores.iter().any(|ignore| dir.starts_with(ignore))
}

/// Renderer kept alive between fixtures when recycling is enabled.
struct RendererSlot {
    options: MapOptions,
    renderer: Box<dyn Renderer>,
}

/// Runs the selected fixtures sequentially.
///
/// Setup failures are counted and the run moves on; an unsupported operation
/// stops it.
///
/// # Errors
///
/// Returns [`SuiteError::Fatal`] when a fixture uses an operation this harness
/// does not implement, and [`SuiteError::UnreadableRoot`] when the tests root
/// cannot be read.
pub async fn run_suite(
    config: &RunnerConfig,
    options: &SuiteOptions,
    factory: &mut dyn RendererFactory,
) -> Result<SuiteSummary, SuiteError> {
    let mut fixtures = filter_fixtures(collect_fixtures(&options.tests_root)?, &options.filters);
    if options.shuffle {
        info!("Shuffling fixtures with seed {}", options.seed);
        shuffle_fixtures(&mut fixtures, options.seed);
    }
    let ignores = load_ignores(&config.paths);
    let runner = TestRunner::new(config);

    info!("Running {} fixture(s) from {}", fixtures.len(), options.tests_root.display());

    let mut summary = SuiteSummary::default();
    let mut slot: Option<RendererSlot> = None;

    for path in &fixtures {
        if is_ignored(path, &ignores) {
            info!("Ignoring {}", path.display());
            summary.ignored += 1;
            continue;
        }

        let fixture = match Fixture::load(path) {
            Ok(FixtureLoad::Ready(fixture)) => fixture,
            Ok(FixtureLoad::Unsupported { flag, .. }) => {
                warn!("Skipping {}: unsupported test flag `{flag}`", path.display());
                summary.unsupported += 1;
                continue;
            }
            Err(err) => {
                error!("{}: {err}", path.display());
                summary.errored += 1;
                summary.record_failure(path, err.to_string());
                continue;
            }
        };

        let map_options = fixture.metadata.map_options();
        let reusable = options.recycle_renderer
            && slot.as_ref().is_some_and(|held| held.options == map_options);
        if !reusable {
            slot = None;
            match factory.create(&map_options) {
                Ok(renderer) => {
                    slot = Some(RendererSlot {
                        options: map_options,
                        renderer,
                    });
                }
                Err(err) => {
                    error!("{}: failed to create renderer: {err:#}", path.display());
                    summary.errored += 1;
                    summary.record_failure(path, format!("{err:#}"));
                    continue;
                }
            }
        }
        let Some(held) = slot.as_mut() else {
            continue;
        };

        let outcome = runner.run(fixture, &mut *held.renderer).await;
        summary.record(path, outcome)?;

        if !options.recycle_renderer {
            slot = None;
        }
    }

    print_summary(&summary);
    Ok(summary)
}

/// Logs the tally and lists the fixtures that did not pass.
pub fn print_summary(summary: &SuiteSummary) {
    info!(
        "{} passed, {} failed, {} errored, {} unsupported, {} ignored, {} updated",
        summary.passed,
        summary.failed,
        summary.errored,
        summary.unsupported,
        summary.ignored,
        summary.updated
    );

    if summary.failures.is_empty() {
        return;
    }

    warn!("\n{} fixture(s) failed:", summary.failures.len());
    warn!("────────────────────────────────────────");
    for failure in &summary.failures {
        let name = failure
            .path
            .parent()
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
            .unwrap_or("unknown");
        warn!("  ✗ {name}: {}", failure.reason);
    }
    warn!("────────────────────────────────────────");
}
