//! End-to-end suite runs over on-disk fixture trees.

use anyhow::Result;
use image::{Rgba, RgbaImage};
use render_test::cli::{Arguments, run};
use render_test::compare::{ACTUAL_FILE, DIFF_FILE, EXPECTED_FILE};
use render_test::suite::{SuiteError, SuiteOptions, run_suite};
use render_test::test_support::RecordingRenderer;
use render_test::{MapOptions, Renderer, RunnerConfig, TestFailure};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

fn blue_renderer(options: &MapOptions) -> Result<Box<dyn Renderer>> {
    Ok(Box::new(RecordingRenderer::for_options(options, BLUE)))
}

fn add_fixture(config: &RunnerConfig, name: &str, style: &str) -> Result<PathBuf> {
    let dir = config.paths.render_tests().join(name);
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("style.json"), style)?;
    Ok(dir)
}

fn add_expected(dir: &Path, size: u32, colour: Rgba<u8>) -> Result<()> {
    RgbaImage::from_pixel(size, size, colour).save(dir.join(EXPECTED_FILE))?;
    Ok(())
}

/// # Errors
/// Returns an error if the fixture tree cannot be created or the suite aborts.
#[tokio::test(start_paused = true)]
async fn tallies_passes_failures_and_skips() -> Result<()> {
    let root = tempfile::tempdir()?;
    let config = RunnerConfig::new(root.path(), false, false);

    let passing = add_fixture(
        &config,
        "background/passing",
        r#"{"metadata":{"test":{"width":4,"height":4,"operations":[["wait"],["sleep",50],["wait"]]}}}"#,
    )?;
    add_expected(&passing, 4, BLUE)?;

    let failing = add_fixture(&config, "background/failing", r#"{"metadata":{"test":{"width":4,"height":4}}}"#)?;
    add_expected(&failing, 4, WHITE)?;

    let missing = add_fixture(&config, "background/missing-expected", r#"{"metadata":{"test":{"width":4,"height":4}}}"#)?;
    add_fixture(&config, "debug/collision", r#"{"metadata":{"test":{"collisionDebug":true}}}"#)?;
    add_fixture(&config, "flaky/ignored", r#"{"metadata":{"test":{}}}"#)?;

    let ignores = config.paths.ignores_file();
    if let Some(parent) = ignores.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&ignores, r#"{"render-tests/flaky": "https://example.invalid/issue"}"#)?;

    let mut factory = blue_renderer;
    let summary = run_suite(&config, &SuiteOptions::new(&config.paths), &mut factory).await?;

    assert_eq!(summary.passed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errored, 1);
    assert_eq!(summary.unsupported, 1);
    assert_eq!(summary.ignored, 1);
    assert!(!summary.succeeded());

    let failed: Vec<&Path> = summary.failures.iter().map(|failure| failure.path.as_path()).collect();
    assert_eq!(
        failed,
        [failing.join("style.json").as_path(), missing.join("style.json").as_path()]
    );

    assert!(passing.join(ACTUAL_FILE).exists());
    assert!(passing.join(DIFF_FILE).exists());
    assert!(failing.join(DIFF_FILE).exists());
    Ok(())
}

/// # Errors
/// Returns an error if the fixture tree cannot be created.
#[tokio::test]
async fn unsupported_operation_stops_the_run() -> Result<()> {
    let root = tempfile::tempdir()?;
    let config = RunnerConfig::new(root.path(), false, true);

    let zoom = add_fixture(
        &config,
        "a/zoom",
        r#"{"metadata":{"test":{"width":2,"height":2,"operations":[["setZoom",4]]}}}"#,
    )?;
    let later = add_fixture(&config, "b/later", r#"{"metadata":{"test":{"width":2,"height":2}}}"#)?;
    add_expected(&later, 2, BLUE)?;

    let mut factory = blue_renderer;
    let result = run_suite(&config, &SuiteOptions::new(&config.paths), &mut factory).await;

    let Err(SuiteError::Fatal { path, source }) = result else {
        anyhow::bail!("suite should stop at the unsupported operation");
    };
    assert_eq!(path, zoom.join("style.json"));
    assert!(matches!(source, TestFailure::UnsupportedOperation(ref name) if name == "setZoom"));
    assert!(!later.join(ACTUAL_FILE).exists());
    Ok(())
}

/// # Errors
/// Returns an error if the fixture tree cannot be created or the suite aborts.
#[tokio::test]
async fn update_mode_writes_references() -> Result<()> {
    let root = tempfile::tempdir()?;
    let config = RunnerConfig::new(root.path(), true, false);
    let dir = add_fixture(&config, "fill/new", r#"{"metadata":{"test":{"width":3,"height":3,"pixelRatio":2}}}"#)?;

    let mut factory = blue_renderer;
    let summary = run_suite(&config, &SuiteOptions::new(&config.paths), &mut factory).await?;

    assert_eq!(summary.updated, 1);
    assert!(summary.succeeded());
    let stored = image::open(dir.join(EXPECTED_FILE))?.to_rgba8();
    assert_eq!(stored.dimensions(), (6, 6));
    assert!(!dir.join(ACTUAL_FILE).exists());
    Ok(())
}

/// # Errors
/// Returns an error if the fixture tree cannot be created or the suite aborts.
#[tokio::test]
async fn recycles_renderers_with_matching_options() -> Result<()> {
    let root = tempfile::tempdir()?;
    let config = RunnerConfig::new(root.path(), false, true);
    for name in ["a/first", "b/second"] {
        let dir = add_fixture(&config, name, r#"{"metadata":{"test":{"width":2,"height":2}}}"#)?;
        add_expected(&dir, 2, BLUE)?;
    }
    let dir = add_fixture(&config, "c/third", r#"{"metadata":{"test":{"width":3,"height":3}}}"#)?;
    add_expected(&dir, 3, BLUE)?;

    let mut created = 0_usize;
    let mut factory = |options: &MapOptions| -> Result<Box<dyn Renderer>> {
        created += 1;
        blue_renderer(options)
    };
    let options = SuiteOptions {
        recycle_renderer: true,
        ..SuiteOptions::new(&config.paths)
    };
    let summary = run_suite(&config, &options, &mut factory).await?;

    assert_eq!(summary.passed, 3);
    assert_eq!(created, 2);
    Ok(())
}

/// # Errors
/// Returns an error if the fixture tree cannot be created or the arguments fail to parse.
#[test]
fn exit_status_reflects_the_run() -> Result<()> {
    let root = tempfile::tempdir()?;
    let config = RunnerConfig::new(root.path(), false, true);
    let dir = add_fixture(&config, "circle/basic", r#"{"metadata":{"test":{"width":2,"height":2}}}"#)?;
    add_expected(&dir, 2, BLUE)?;
    add_fixture(&config, "line/zoom", r#"{"metadata":{"test":{"operations":[["setCenter",[0,0]]]}}}"#)?;

    let mut factory = blue_renderer;
    let only_circle = <Arguments as clap::Parser>::try_parse_from(["render-test", "circle"])?;
    assert_eq!(run(&config, &only_circle, &mut factory), ExitCode::SUCCESS);

    let everything = <Arguments as clap::Parser>::try_parse_from(["render-test"])?;
    assert_eq!(run(&config, &everything, &mut factory), ExitCode::FAILURE);
    Ok(())
}

/// # Errors
/// Returns an error if the temporary root cannot be created or the arguments fail to parse.
#[test]
fn missing_tests_root_fails_the_run() -> Result<()> {
    let root = tempfile::tempdir()?;
    let config = RunnerConfig::new(root.path(), false, true);
    let mut factory = blue_renderer;

    let default_root = <Arguments as clap::Parser>::try_parse_from(["render-test"])?;
    assert_eq!(run(&config, &default_root, &mut factory), ExitCode::FAILURE);

    let missing = root.path().join("not-here");
    let mistyped = <Arguments as clap::Parser>::try_parse_from([
        OsString::from("render-test"),
        OsString::from("--rootPath"),
        missing.into_os_string(),
    ])?;
    assert_eq!(run(&config, &mistyped, &mut factory), ExitCode::FAILURE);
    Ok(())
}

/// # Errors
/// Returns an error if the temporary root cannot be created.
#[tokio::test]
async fn missing_tests_root_is_reported() -> Result<()> {
    let root = tempfile::tempdir()?;
    let config = RunnerConfig::new(root.path(), false, true);
    let mut factory = blue_renderer;

    let result = run_suite(&config, &SuiteOptions::new(&config.paths), &mut factory).await;
    let Err(SuiteError::UnreadableRoot { path, .. }) = result else {
        anyhow::bail!("suite should reject a missing tests root");
    };
    assert_eq!(path, config.paths.render_tests());
    Ok(())
}
