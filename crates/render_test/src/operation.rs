//! Scripted test operations, decoded once from the fixture's `operations` array.
//!
//! Each entry is a JSON array whose first element names the operation:
//!
//! ```json
//! [["wait"], ["sleep", "500"], ["addImage", "marker", "./image/marker.png", {"pixelRatio": 2}],
//!  ["setStyle", "local://styles/bright.json"]]
//! ```

use serde_json::Value;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Delay used by `["sleep"]` without an explicit duration.
pub const DEFAULT_SLEEP: Duration = Duration::from_secs(20);

/// One scripted step.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Render once without touching the style.
    Wait,
    /// Defer the rest of the queue.
    Sleep { duration: Duration },
    AddImage(ImageOperand),
    UpdateImage(ImageOperand),
    SetStyle(StyleSource),
    /// An operation name this harness does not implement. Executing it is fatal.
    Unsupported { name: String },
}

/// Image registered by `addImage` / `updateImage`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOperand {
    pub name: String,
    /// Path relative to the integration fixture root.
    pub path: PathBuf,
    /// Overrides the fixture pixel ratio when present.
    pub pixel_ratio: Option<f32>,
}

/// Replacement style for `setStyle`.
#[derive(Debug, Clone, PartialEq)]
pub enum StyleSource {
    /// A `local://` style file reference.
    File(String),
    /// An embedded style document.
    Inline(Value),
}

/// A structurally malformed operation entry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OperationError {
    #[error("operations must be an array")]
    NotAList,
    #[error("operation #{index} is not a non-empty array with a name")]
    Shape { index: usize },
    #[error("operation #{index} `{name}`: {problem}")]
    Operand {
        index: usize,
        name: String,
        problem: &'static str,
    },
}

impl Operation {
    /// Decodes the whole `operations` array, preserving order.
    ///
    /// # Errors
    ///
    /// Returns an error if the list or any entry is malformed. Unknown
    /// operation names are not an error here; they decode to
    /// [`Operation::Unsupported`].
    pub fn parse_list(list: Value) -> Result<VecDeque<Self>, OperationError> {
        let Value::Array(entries) = list else {
            return Err(OperationError::NotAList);
        };
        entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| Self::parse(index, entry))
            .collect()
    }

    /// Decodes one entry; `index` is only used for error reporting.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is not an array starting with a name, or
    /// a known operation lacks its operands.
    pub fn parse(index: usize, entry: Value) -> Result<Self, OperationError> {
        let Value::Array(items) = entry else {
            return Err(OperationError::Shape { index });
        };
        let mut items = items.into_iter();
        let Some(Value::String(name)) = items.next() else {
            return Err(OperationError::Shape { index });
        };
        let operand = |problem| OperationError::Operand {
            index,
            name: name.clone(),
            problem,
        };

        let operation = match name.as_str() {
            "wait" => Self::Wait,
            "sleep" => {
                let duration = match items.next() {
                    None => DEFAULT_SLEEP,
                    Some(value) => {
                        parse_millis(&value).ok_or_else(|| operand("duration is not milliseconds"))?
                    }
                };
                Self::Sleep { duration }
            }
            "addImage" | "updateImage" => {
                let image_name = items
                    .next()
                    .and_then(into_string)
                    .ok_or_else(|| operand("missing image name"))?;
                let path = items
                    .next()
                    .and_then(into_string)
                    .ok_or_else(|| operand("missing image path"))?;
                let pixel_ratio = items
                    .next()
                    .and_then(|options| options.get("pixelRatio").and_then(Value::as_f64))
                    .map(|ratio| ratio as f32);
                let image = ImageOperand {
                    name: image_name,
                    path: PathBuf::from(path),
                    pixel_ratio,
                };
                if name == "addImage" {
                    Self::AddImage(image)
                } else {
                    Self::UpdateImage(image)
                }
            }
            "setStyle" => match items.next() {
                Some(Value::String(url)) => Self::SetStyle(StyleSource::File(url)),
                Some(style @ Value::Object(_)) => Self::SetStyle(StyleSource::Inline(style)),
                _ => return Err(operand("expected a style object or file reference")),
            },
            _ => Self::Unsupported { name },
        };
        Ok(operation)
    }

    /// The operation name as written in fixtures.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Wait => "wait",
            Self::Sleep { .. } => "sleep",
            Self::AddImage(_) => "addImage",
            Self::UpdateImage(_) => "updateImage",
            Self::SetStyle(_) => "setStyle",
            Self::Unsupported { name } => name,
        }
    }
}

fn into_string(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        _ => None,
    }
}

/// Sleep durations are written either as a number or as a numeric string.
fn parse_millis(value: &Value) -> Option<Duration> {
    let millis = match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }?;
    Some(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_known_operations_in_order() -> Result<(), OperationError> {
        let list = json!([
            ["wait"],
            ["sleep", "500"],
            ["sleep", 250],
            ["sleep"],
            ["addImage", "marker", "./image/marker.png"],
            ["updateImage", "marker", "./image/marker-2x.png", { "pixelRatio": 2 }],
            ["setStyle", "local://styles/bright.json"],
            ["setStyle", { "version": 8, "layers": [] }]
        ]);

        let operations = Operation::parse_list(list)?;
        let expected = vec![
            Operation::Wait,
            Operation::Sleep {
                duration: Duration::from_millis(500),
            },
            Operation::Sleep {
                duration: Duration::from_millis(250),
            },
            Operation::Sleep {
                duration: DEFAULT_SLEEP,
            },
            Operation::AddImage(ImageOperand {
                name: "marker".to_owned(),
                path: PathBuf::from("./image/marker.png"),
                pixel_ratio: None,
            }),
            Operation::UpdateImage(ImageOperand {
                name: "marker".to_owned(),
                path: PathBuf::from("./image/marker-2x.png"),
                pixel_ratio: Some(2.0),
            }),
            Operation::SetStyle(StyleSource::File("local://styles/bright.json".to_owned())),
            Operation::SetStyle(StyleSource::Inline(json!({ "version": 8, "layers": [] }))),
        ];
        assert_eq!(operations, expected);
        Ok(())
    }

    #[test]
    fn unknown_names_decode_as_unsupported() -> Result<(), OperationError> {
        let operation = Operation::parse(0, json!(["setCenter", [10, 20]]))?;
        assert_eq!(
            operation,
            Operation::Unsupported {
                name: "setCenter".to_owned()
            }
        );
        assert_eq!(operation.name(), "setCenter");
        Ok(())
    }

    #[test]
    fn rejects_malformed_entries() {
        assert_eq!(
            Operation::parse_list(json!({ "wait": true })),
            Err(OperationError::NotAList)
        );
        assert_eq!(
            Operation::parse(3, json!("wait")),
            Err(OperationError::Shape { index: 3 })
        );
        assert_eq!(
            Operation::parse(0, json!([])),
            Err(OperationError::Shape { index: 0 })
        );
        assert_eq!(
            Operation::parse(0, json!([42])),
            Err(OperationError::Shape { index: 0 })
        );
        assert!(matches!(
            Operation::parse(1, json!(["sleep", "soon"])),
            Err(OperationError::Operand { index: 1, .. })
        ));
        assert!(matches!(
            Operation::parse(2, json!(["addImage", "marker"])),
            Err(OperationError::Operand { index: 2, .. })
        ));
        assert!(matches!(
            Operation::parse(0, json!(["setStyle", 8])),
            Err(OperationError::Operand { .. })
        ));
    }
}
