//! Command-line entry point for embedding renderers.
//!
//! A renderer crate wires its factory in with a two-line binary:
//!
//! ```no_run
//! # use render_test::frontend::{MapOptions, Renderer};
//! # fn create(_options: &MapOptions) -> anyhow::Result<Box<dyn Renderer>> { anyhow::bail!("no engine") }
//! fn main() -> std::process::ExitCode {
//!     render_test::cli::run_cli(create)
//! }
//! ```

use crate::config::{FixturePaths, RunnerConfig};
use crate::frontend::RendererFactory;
use crate::suite::{SuiteOptions, run_suite};
use clap::Parser;
use env_logger::{Builder as LogBuilder, Env as EnvLoggerEnv};
use log::error;
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Builder;

/// Exit status for invalid command lines.
const USAGE_EXIT: u8 = 2;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(author, version, about = "Replay render-test fixtures against a map renderer")]
pub struct Arguments {
    /// Reuse the map object between fixtures with identical options.
    #[arg(short = 'r', long = "recycle-map")]
    pub recycle_map: bool,
    /// Shuffle the fixture order.
    #[arg(short = 's', long)]
    pub shuffle: bool,
    /// Shuffle seed.
    #[arg(long, default_value_t = 1)]
    pub seed: u64,
    /// Directory searched for fixtures (default: the integration render tests).
    #[arg(short = 'p', long = "rootPath")]
    pub root_path: Option<PathBuf>,
    /// Only run fixtures whose directory contains one of these names.
    pub tests: Vec<String>,
}

impl Arguments {
    #[must_use]
    pub fn suite_options(&self, paths: &FixturePaths) -> SuiteOptions {
        SuiteOptions {
            tests_root: self
                .root_path
                .clone()
                .unwrap_or_else(|| paths.render_tests()),
            filters: self.tests.clone(),
            shuffle: self.shuffle,
            seed: self.seed,
            recycle_renderer: self.recycle_map,
        }
    }
}

/// Initialises `env_logger`, defaulting to `info`. Repeated calls are harmless.
pub fn init_logger() {
    let _ignore_result = LogBuilder::from_env(EnvLoggerEnv::default().filter_or("RUST_LOG", "info"))
        .format_timestamp(None)
        .try_init();
}

/// Parses the process arguments and runs the suite with configuration from
/// the environment.
pub fn run_cli<F: RendererFactory>(factory: F) -> ExitCode {
    run_with_args(env::args_os(), factory)
}

/// Like [`run_cli`] with explicit arguments, the first being the program name.
pub fn run_with_args<I, T, F>(args: I, mut factory: F) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    F: RendererFactory,
{
    let arguments = match Arguments::try_parse_from(args) {
        Ok(arguments) => arguments,
        Err(err) => {
            let _ignore_print = err.print();
            return if err.use_stderr() {
                ExitCode::from(USAGE_EXIT)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logger();
    run(&RunnerConfig::from_env(), &arguments, &mut factory)
}

/// Runs the suite on a current-thread runtime and maps the outcome to an exit
/// status: success when every fixture passed, failure otherwise or when a
/// fixture used an unsupported operation.
pub fn run(
    config: &RunnerConfig,
    arguments: &Arguments,
    factory: &mut dyn RendererFactory,
) -> ExitCode {
    let runtime = match Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    let options = arguments.suite_options(&config.paths);
    match runtime.block_on(run_suite(config, &options, factory)) {
        Ok(summary) if summary.succeeded() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
