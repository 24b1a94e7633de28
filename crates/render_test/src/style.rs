//! The style document a test case renders.

use crate::error::{ParseError, SetupError};
use crate::localize::UrlLocalizer;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// An insertion-ordered JSON style tree, exclusively owned by one test case.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleDocument {
    root: Value,
}

impl StyleDocument {
    /// Parses style JSON.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] with the failing line and column.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        serde_json::from_str(text)
            .map(Self::from_value)
            .map_err(|err| ParseError::from_json(&err))
    }

    /// Reads and parses a style file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn read(path: &Path) -> Result<Self, SetupError> {
        let text = fs::read_to_string(path).map_err(|source| SetupError::StyleUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|err| SetupError::Parse(err.in_file(path)))
    }

    #[must_use]
    pub const fn from_value(root: Value) -> Self {
        Self { root }
    }

    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.root
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.root
    }

    /// Compact serialization handed to the renderer.
    #[must_use]
    pub fn to_json(&self) -> String {
        self.root.to_string()
    }

    /// The `metadata.test` block, if present.
    #[must_use]
    pub fn test_block(&self) -> Option<&Map<String, Value>> {
        self.root
            .get("metadata")?
            .get("test")?
            .as_object()
    }

    /// Removes and returns `metadata.test.operations`.
    ///
    /// The operations are decoded once and then owned by the execution engine,
    /// so they are no longer part of the document sent to the renderer.
    pub fn take_operations(&mut self) -> Option<Value> {
        self.root
            .get_mut("metadata")?
            .get_mut("test")?
            .as_object_mut()?
            .remove("operations")
    }

    /// Rewrites the document's resource URLs in place.
    pub fn localize(&mut self, localizer: &UrlLocalizer) {
        localizer.localize_style(&mut self.root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// # Errors
    /// Returns an error if the fixture document fails to parse.
    #[test]
    fn keeps_key_order() -> anyhow::Result<()> {
        let text = r#"{"version":8,"zoom":2,"center":[0,0],"layers":[]}"#;
        let document = StyleDocument::parse(text)?;
        assert_eq!(document.to_json(), text);
        Ok(())
    }

    #[test]
    fn parse_failure_is_reported() {
        let result = StyleDocument::parse("{\"version\": 8,");
        assert!(matches!(result, Err(ParseError { line: 1, .. })));
    }

    #[test]
    fn operations_move_out_of_the_document() {
        let mut document = StyleDocument::from_value(json!({
            "metadata": { "test": { "width": 64, "operations": [["wait"]] } },
            "layers": []
        }));

        assert_eq!(document.take_operations(), Some(json!([["wait"]])));
        assert_eq!(document.take_operations(), None);
        assert_eq!(
            document.test_block().and_then(|test| test.get("width")),
            Some(&json!(64))
        );
    }

    #[test]
    fn missing_test_block() {
        let mut document = StyleDocument::from_value(json!({ "metadata": {} }));
        assert!(document.test_block().is_none());
        assert!(document.take_operations().is_none());
    }

    /// # Errors
    /// Returns an error if the temporary directory cannot be created.
    #[test]
    fn read_reports_missing_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let result = StyleDocument::read(&dir.path().join("style.json"));
        assert!(matches!(result, Err(SetupError::StyleUnreadable { .. })));
        Ok(())
    }
}
