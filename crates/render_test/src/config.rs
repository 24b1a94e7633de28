//! Runner configuration and fixture directory layout.
//!
//! Configuration is read from environment variables or constructed
//! programmatically. Every fixture directory the harness reads from is derived
//! from a single root path.

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable holding the harness root path.
pub const ROOT_PATH_VAR: &str = "RENDER_TEST_ROOT";
/// Environment variable switching the scorer into update mode.
pub const UPDATE_VAR: &str = "UPDATE";
/// Environment variable disabling all artifact writes.
pub const READ_ONLY_VAR: &str = "RENDER_TEST_READ_ONLY";

/// Runtime configuration for a test run.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Directory layout of the fixtures.
    pub paths: FixturePaths,
    /// Write the rendered image as the new reference instead of comparing.
    pub update_expected: bool,
    /// Never write `actual.png`, `diff.png` or `expected.png`.
    pub read_only: bool,
}

impl RunnerConfig {
    /// Construct a configuration with explicit values.
    ///
    /// Update mode is ignored when `read_only` is set.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, update_expected: bool, read_only: bool) -> Self {
        Self {
            paths: FixturePaths::new(root),
            update_expected: update_expected && !read_only,
            read_only,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `RENDER_TEST_ROOT`: harness root path (default: current directory)
    /// - `UPDATE`: if set to anything, rewrite reference images
    /// - `RENDER_TEST_READ_ONLY`: set to "1" or "true" to suppress artifact writes
    #[must_use]
    pub fn from_env() -> Self {
        let root = env::var_os(ROOT_PATH_VAR)
            .map(PathBuf::from)
            .or_else(|| env::current_dir().ok())
            .unwrap_or_default();
        let update_expected = env::var_os(UPDATE_VAR).is_some();
        let read_only = env::var(READ_ONLY_VAR)
            .map(|val| val == "1" || val.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self::new(root, update_expected, read_only)
    }

    /// Replace the root path, keeping the mode flags.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.paths = FixturePaths::new(root);
        self
    }
}

/// Fixture directories, all relative to one harness root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixturePaths {
    root: PathBuf,
}

impl FixturePaths {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root of the integration fixtures; target of `local://` URLs.
    #[must_use]
    pub fn integration(&self) -> PathBuf {
        self.root
            .join("mapbox-gl-js")
            .join("test")
            .join("integration")
    }

    /// Default directory searched for `style.json` fixtures.
    #[must_use]
    pub fn render_tests(&self) -> PathBuf {
        self.integration().join("render-tests")
    }

    /// Vector tile fixtures, first candidate for `setStyle` file references.
    #[must_use]
    pub fn mvt_fixtures(&self) -> PathBuf {
        self.root.join("vendor").join("mvt-fixtures")
    }

    /// Vendored styles, second candidate for `setStyle` file references.
    #[must_use]
    pub fn vendor_styles(&self) -> PathBuf {
        self.root.join("vendor")
    }

    /// JSON object whose keys name fixtures to skip.
    #[must_use]
    pub fn ignores_file(&self) -> PathBuf {
        self.root
            .join("platform")
            .join("node")
            .join("test")
            .join("ignores.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_fixture_directories() {
        let paths = FixturePaths::new("/srv/gl");
        assert_eq!(
            paths.integration(),
            PathBuf::from("/srv/gl/mapbox-gl-js/test/integration")
        );
        assert_eq!(
            paths.render_tests(),
            PathBuf::from("/srv/gl/mapbox-gl-js/test/integration/render-tests")
        );
        assert_eq!(paths.mvt_fixtures(), PathBuf::from("/srv/gl/vendor/mvt-fixtures"));
        assert_eq!(paths.vendor_styles(), PathBuf::from("/srv/gl/vendor"));
        assert_eq!(
            paths.ignores_file(),
            PathBuf::from("/srv/gl/platform/node/test/ignores.json")
        );
    }

    #[test]
    fn read_only_disables_update() {
        let config = RunnerConfig::new("/srv/gl", true, true);
        assert!(config.read_only);
        assert!(!config.update_expected);

        let updating = RunnerConfig::new("/srv/gl", true, false).with_root("/other");
        assert!(updating.update_expected);
        assert_eq!(updating.paths.root(), Path::new("/other"));
    }
}
