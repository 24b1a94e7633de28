//! Failure taxonomy for a single test case.
//!
//! Setup failures end one test case and are reported; an unsupported operation
//! is fatal for the whole run.

use crate::frontend::Size;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed JSON, with the position reported by the parser.
#[derive(Debug, Error)]
#[error("{}{message} at line {line}, column {column}", display_prefix(.path.as_ref()))]
pub struct ParseError {
    pub path: Option<PathBuf>,
    pub message: String,
    pub line: usize,
    pub column: usize,
}

fn display_prefix(path: Option<&PathBuf>) -> String {
    path.map(|path| format!("{}: ", path.display()))
        .unwrap_or_default()
}

impl ParseError {
    pub(crate) fn from_json(err: &serde_json::Error) -> Self {
        let text = err.to_string();
        // serde_json appends " at line L column C"; strip it so we format our own.
        let message = text
            .rfind(" at line ")
            .map_or_else(|| text.clone(), |idx| text[..idx].to_owned());
        Self {
            path: None,
            message,
            line: err.line(),
            column: err.column(),
        }
    }

    #[must_use]
    pub(crate) fn in_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// A fixture that cannot be run or scored.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("unable to open style file {}", .path.display())]
    StyleUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("invalid `metadata.test.{field}`: expected {expected}")]
    InvalidMetadata {
        field: &'static str,
        expected: &'static str,
    },
    #[error("malformed operation: {0}")]
    MalformedOperation(String),
    #[error("failed to load image {} for `{name}`: {reason}", .path.display())]
    ImageAsset {
        name: String,
        path: PathBuf,
        reason: String,
    },
    #[error("failed to load expected image {}", .path.display())]
    MissingExpected {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode expected image {}", .path.display())]
    UndecodableExpected {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("expected and actual image sizes differ: expected {expected}, actual {actual}")]
    SizeMismatch { expected: Size, actual: Size },
    #[error(transparent)]
    Comparison(#[from] pixelmatch::PixelmatchError),
    #[error("no frame was rendered")]
    NothingRendered,
    #[error("renderer failed")]
    Renderer(#[source] anyhow::Error),
    #[error("failed to write {}", .path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// Why a test case produced no score.
#[derive(Debug, Error)]
pub enum TestFailure {
    #[error(transparent)]
    Setup(#[from] SetupError),
    /// The fixture uses an operation this harness does not implement. Fatal.
    #[error("unsupported operation `{0}`")]
    UnsupportedOperation(String),
}

impl TestFailure {
    /// Whether the run must stop instead of moving on to the next fixture.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::UnsupportedOperation(_))
    }
}

impl From<ParseError> for TestFailure {
    fn from(err: ParseError) -> Self {
        Self::Setup(SetupError::Parse(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parse errors keep the parser position and an optional file path.
    ///
    /// # Errors
    /// Returns an error if the invalid document parses.
    #[test]
    fn parse_error_reports_position() -> anyhow::Result<()> {
        let err = serde_json::from_str::<serde_json::Value>("{\n  \"a\": ]")
            .err()
            .ok_or_else(|| anyhow::anyhow!("invalid JSON parsed"))?;
        let parsed = ParseError::from_json(&err);
        assert_eq!(parsed.line, 2);
        assert!(parsed.column > 0);
        assert!(!parsed.message.contains("at line"));

        let suffix = format!("at line 2, column {}", parsed.column);
        let shown = parsed.in_file("/tmp/style.json").to_string();
        assert!(shown.starts_with("/tmp/style.json: "), "{shown}");
        assert!(shown.ends_with(&suffix), "{shown}");
        Ok(())
    }

    #[test]
    fn only_unsupported_operations_are_fatal() {
        assert!(TestFailure::UnsupportedOperation("setCenter".to_owned()).is_fatal());
        assert!(!TestFailure::Setup(SetupError::NothingRendered).is_fatal());
    }
}
