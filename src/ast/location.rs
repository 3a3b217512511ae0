//! Source locations attached to model nodes
//!
//! A location is an opaque handle back to the script or JSON fragment a node
//! was built from. It only feeds diagnostics: two locations always compare
//! equal, so the derived equality of every node is structural.

use serde::Serialize;
use std::fmt;

/// Where a node came from
#[derive(Debug, Clone, Default, Serialize)]
#[serde(untagged)]
pub enum SourceLocation {
    /// Built programmatically, no source
    #[default]
    Unknown,

    /// Position in script text (1-based)
    Script {
        /// Line number
        line: usize,
        /// Column number
        column: usize,
    },

    /// JSON pointer into the source document
    Json {
        /// Pointer such as `/pipeline/stages/0`
        pointer: String,
    },
}

impl SourceLocation {
    /// Creates a script location
    #[must_use]
    pub fn script(line: usize, column: usize) -> Self {
        Self::Script { line, column }
    }

    /// Creates a JSON pointer location
    #[must_use]
    pub fn json(pointer: impl Into<String>) -> Self {
        Self::Json {
            pointer: pointer.into(),
        }
    }

    /// Returns true if the location carries no position
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Renders the location for structured error output
    #[must_use]
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Self::Unknown => None,
            Self::Script { line, column } => Some(serde_json::json!({
                "line": line,
                "column": column,
            })),
            Self::Json { pointer } => Some(serde_json::Value::String(pointer.clone())),
        }
    }
}

impl PartialEq for SourceLocation {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for SourceLocation {}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown location"),
            Self::Script { line, column } => write!(f, "line {line}, column {column}"),
            Self::Json { pointer } if pointer.is_empty() => write!(f, "/"),
            Self::Json { pointer } => write!(f, "{pointer}"),
        }
    }
}
