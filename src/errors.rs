//! Diagnostics and error types
//!
//! Parse, schema and validation problems are not Rust errors: they are
//! collected as [`Diagnostic`]s in an [`ErrorCollector`] so a single pass can
//! report all of them. Typed errors exist only for failures that stop an
//! operation outright (lexing, endpoint boundary problems, configuration).

use crate::ast::{Element, SourceLocation};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Error class of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Malformed script or unrecognised structure
    Syntax,
    /// JSON document does not conform to the schema
    Schema,
    /// Semantic rule violated
    Validation,
    /// Model could not be lowered
    Lowering,
    /// Bad endpoint input
    Boundary,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Syntax => "syntax",
            Self::Schema => "schema",
            Self::Validation => "validation",
            Self::Lowering => "lowering",
            Self::Boundary => "boundary",
        };
        write!(f, "{name}")
    }
}

/// One reported problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Error class
    pub kind: ErrorKind,
    /// Human readable message
    pub message: String,
    /// Where the problem was found
    #[serde(skip_serializing_if = "SourceLocation::is_unknown")]
    pub location: SourceLocation,
}

impl Diagnostic {
    /// Creates a diagnostic
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            kind,
            message: message.into(),
            location,
        }
    }

    /// Renders as `{"error": ..., "location": ...}`
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("error".to_string(), serde_json::Value::String(self.message.clone()));
        if let Some(location) = self.location.to_json() {
            obj.insert("location".to_string(), location);
        }
        serde_json::Value::Object(obj)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.is_unknown() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} @ {}", self.message, self.location)
        }
    }
}

/// Accumulates diagnostics during one parse, validation or lowering
#[derive(Debug, Default, Clone)]
pub struct ErrorCollector {
    diagnostics: Vec<Diagnostic>,
}

impl ErrorCollector {
    /// Creates an empty collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a diagnostic
    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::trace!(kind = %diagnostic.kind, "{diagnostic}");
        self.diagnostics.push(diagnostic);
    }

    /// Records a diagnostic at a location
    pub fn report(&mut self, kind: ErrorKind, location: &SourceLocation, message: impl Into<String>) {
        self.push(Diagnostic::new(kind, message, location.clone()));
    }

    /// Records a syntax error
    pub fn syntax(&mut self, location: &SourceLocation, message: impl Into<String>) {
        self.report(ErrorKind::Syntax, location, message);
    }

    /// Records a schema error
    pub fn schema(&mut self, location: &SourceLocation, message: impl Into<String>) {
        self.report(ErrorKind::Schema, location, message);
    }

    /// Records a validation error against a node
    pub fn validation(&mut self, element: &dyn Element, message: impl Into<String>) {
        self.report(ErrorKind::Validation, element.location(), message);
    }

    /// Records a lowering error
    pub fn lowering(&mut self, location: &SourceLocation, message: impl Into<String>) {
        self.report(ErrorKind::Lowering, location, message);
    }

    /// Number of diagnostics collected
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.diagnostics.len()
    }

    /// Returns true if nothing was reported
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Collected diagnostics in report order
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Consumes the collector
    #[must_use]
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Messages with their locations as plain strings
    #[must_use]
    pub fn errors_as_strings(&self) -> Vec<String> {
        self.diagnostics.iter().map(ToString::to_string).collect()
    }

    /// Diagnostics as a JSON array of `{"error", "location"?}`
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        diagnostics_to_json(&self.diagnostics)
    }
}

/// Renders diagnostics as a JSON array of `{"error", "location"?}`
#[must_use]
pub fn diagnostics_to_json(diagnostics: &[Diagnostic]) -> serde_json::Value {
    serde_json::Value::Array(diagnostics.iter().map(Diagnostic::to_json).collect())
}

/// Lexer failure; stops parsing of the script
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    /// String literal not closed before end of input
    #[error("Unterminated string literal")]
    UnterminatedString {
        /// Line of the opening quote
        line: usize,
        /// Column of the opening quote
        column: usize,
    },

    /// Block comment not closed before end of input
    #[error("Unterminated comment")]
    UnterminatedComment {
        /// Line of the comment start
        line: usize,
        /// Column of the comment start
        column: usize,
    },

    /// Character outside the accepted syntax
    #[error("Unexpected character '{ch}'")]
    UnexpectedCharacter {
        /// The offending character
        ch: char,
        /// Line of the character
        line: usize,
        /// Column of the character
        column: usize,
    },
}

impl LexError {
    /// Location of the failure
    #[must_use]
    pub fn location(&self) -> SourceLocation {
        match self {
            Self::UnterminatedString { line, column }
            | Self::UnterminatedComment { line, column }
            | Self::UnexpectedCharacter { line, column, .. } => {
                SourceLocation::script(*line, *column)
            }
        }
    }
}

/// Bad input at a conversion endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoundaryError {
    /// Required request parameter absent
    #[error("No content found for parameter '{0}'")]
    MissingParameter(String),

    /// Parameter is not well-formed JSON
    #[error("Unable to parse JSON: {0}")]
    InvalidJson(String),
}

impl BoundaryError {
    /// Converts into a location-less diagnostic
    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(ErrorKind::Boundary, self.to_string(), SourceLocation::Unknown)
    }
}
