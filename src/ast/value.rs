//! Values and argument lists
//!
//! A [`Value`] is either a constant literal or an expression kept as its
//! verbatim source fragment. Only literals take part in concrete value checks.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::location::SourceLocation;
use super::text::{TextWriter, quote};
use super::Element;
use crate::validator::ModelValidator;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::json;
use std::fmt;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_$][a-zA-Z0-9_$]*$").expect("valid identifier regex"));

/// Returns true if `name` can be written unquoted as a map key
pub fn is_plain_key(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Constant value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// String constant
    String(String),
    /// Integer or decimal constant
    Number(serde_json::Number),
    /// Boolean constant
    Boolean(bool),
}

impl Literal {
    /// Name of the literal's type, as used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "String",
            Self::Number(n) if n.is_f64() => "BigDecimal",
            Self::Number(_) => "int",
            Self::Boolean(_) => "boolean",
        }
    }

    /// Returns the string content of a string literal
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// JSON rendering of the bare literal
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Number(n) => serde_json::Value::Number(n.clone()),
            Self::Boolean(b) => serde_json::Value::Bool(*b),
        }
    }

    /// Script rendering of the literal
    pub fn to_text(&self) -> String {
        match self {
            Self::String(s) => quote(s),
            Self::Number(n) => n.to_string(),
            Self::Boolean(b) => b.to_string(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

/// Literal or expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Constant value
    Literal {
        /// The constant
        value: Literal,
        /// Source location
        location: SourceLocation,
    },

    /// Non-constant source fragment, kept verbatim
    Expression {
        /// Source text of the expression
        text: String,
        /// Source location
        location: SourceLocation,
    },
}

impl Value {
    /// Creates a literal value
    pub fn literal(value: impl Into<Literal>) -> Self {
        Self::Literal {
            value: value.into(),
            location: SourceLocation::Unknown,
        }
    }

    /// Creates an expression value
    pub fn expression(text: impl Into<String>) -> Self {
        Self::Expression {
            text: text.into(),
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, loc: SourceLocation) -> Self {
        match &mut self {
            Self::Literal { location, .. } | Self::Expression { location, .. } => *location = loc,
        }
        self
    }

    /// Returns true for constant values
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal { .. })
    }

    /// Returns the literal, if constant
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal { value, .. } => Some(value),
            Self::Expression { .. } => None,
        }
    }

    /// Returns the content of a string literal
    pub fn as_str(&self) -> Option<&str> {
        self.as_literal().and_then(Literal::as_str)
    }

    /// Returns the value of a boolean literal
    pub fn as_bool(&self) -> Option<bool> {
        match self.as_literal() {
            Some(Literal::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    /// Script rendering of the value
    pub fn to_text(&self) -> String {
        match self {
            Self::Literal { value, .. } => value.to_text(),
            Self::Expression { text, .. } => text.clone(),
        }
    }

    /// Plain rendering: literal content or expression text
    pub fn raw(&self) -> String {
        match self {
            Self::Literal { value, .. } => value.to_string(),
            Self::Expression { text, .. } => text.clone(),
        }
    }
}

impl Element for Value {
    fn location(&self) -> &SourceLocation {
        match self {
            Self::Literal { location, .. } | Self::Expression { location, .. } => location,
        }
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        validator.validate_value(self)
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Literal { value, .. } => json!({"isLiteral": true, "value": value.to_json()}),
            Self::Expression { text, .. } => json!({"isLiteral": false, "value": text}),
        }
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.line(self.to_text());
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// One `key: value` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedArgument {
    /// Parameter name
    pub key: String,
    /// Argument value
    pub value: Value,
    /// Source location
    pub location: SourceLocation,
}

impl NamedArgument {
    /// Creates a named argument
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

/// Argument list of a method call
#[derive(Debug, Clone)]
pub enum Arguments {
    /// One unnamed value
    Single(Value),
    /// Unnamed values in order
    Positional(Vec<Value>),
    /// `key: value` pairs in order
    Named(Vec<NamedArgument>),
}

impl Default for Arguments {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl PartialEq for Arguments {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Single(a), Self::Single(b)) => a == b,
            (Self::Positional(a), Self::Positional(b)) => a == b,
            (Self::Named(a), Self::Named(b)) => a == b,
            (Self::Named(a), Self::Positional(b)) | (Self::Positional(b), Self::Named(a)) => {
                a.is_empty() && b.is_empty()
            }
            _ => false,
        }
    }
}

impl Eq for Arguments {}

impl Arguments {
    /// No arguments
    pub fn none() -> Self {
        Self::default()
    }

    /// One unnamed value
    pub fn single(value: Value) -> Self {
        Self::Single(value)
    }

    /// Unnamed values; exactly one value is stored as [`Arguments::Single`]
    pub fn positional(mut values: Vec<Value>) -> Self {
        if values.len() == 1
            && let Some(only) = values.pop()
        {
            return Self::Single(only);
        }
        Self::Positional(values)
    }

    /// Named arguments from `(key, value)` pairs
    pub fn named<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Named(
            pairs
                .into_iter()
                .map(|(k, v)| NamedArgument::new(k, v))
                .collect(),
        )
    }

    /// Returns true if there are no arguments
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Single(_) => false,
            Self::Positional(values) => values.is_empty(),
            Self::Named(args) => args.is_empty(),
        }
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Positional(values) => values.len(),
            Self::Named(args) => args.len(),
        }
    }

    /// Looks up a named argument
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Named(args) => args.iter().find(|a| a.key == key).map(|a| &a.value),
            _ => None,
        }
    }

    /// Iterates all argument values in order
    pub fn values(&self) -> Box<dyn Iterator<Item = &Value> + '_> {
        match self {
            Self::Single(v) => Box::new(std::iter::once(v)),
            Self::Positional(values) => Box::new(values.iter()),
            Self::Named(args) => Box::new(args.iter().map(|a| &a.value)),
        }
    }

    /// Visits every argument value
    pub fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = true;
        for value in self.values() {
            valid &= value.validate(validator);
        }
        valid
    }

    /// JSON rendering: value object, array of values or array of pairs
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Single(v) => v.to_json(),
            Self::Positional(values) => values.iter().map(Element::to_json).collect(),
            Self::Named(args) => args
                .iter()
                .map(|a| json!({"key": a.key, "value": a.value.to_json()}))
                .collect(),
        }
    }

    /// Script rendering without the surrounding parentheses
    pub fn to_text(&self) -> String {
        match self {
            Self::Single(v) => v.to_text(),
            Self::Positional(values) => values
                .iter()
                .map(Value::to_text)
                .collect::<Vec<_>>()
                .join(", "),
            Self::Named(args) => args
                .iter()
                .map(|a| format!("{}: {}", render_key(&a.key), a.value.to_text()))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Renders a map key, quoting it unless it is a plain identifier
pub fn render_key(key: &str) -> String {
    if is_plain_key(key) {
        key.to_string()
    } else {
        quote(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_named_equals_empty_positional() {
        assert_eq!(Arguments::Named(vec![]), Arguments::Positional(vec![]));
        assert_ne!(
            Arguments::Named(vec![]),
            Arguments::Positional(vec![Value::literal("x")])
        );
    }

    #[test]
    fn test_positional_normalises_one_value() {
        assert_eq!(
            Arguments::positional(vec![Value::literal("x")]),
            Arguments::single(Value::literal("x"))
        );
        assert!(matches!(
            Arguments::positional(vec![Value::literal("a"), Value::literal("b")]),
            Arguments::Positional(values) if values.len() == 2
        ));
        assert_eq!(Arguments::positional(Vec::new()), Arguments::none());
    }

    #[test]
    fn test_value_json_shape() {
        assert_eq!(
            Value::literal("hi").to_json(),
            json!({"isLiteral": true, "value": "hi"})
        );
        assert_eq!(
            Value::expression("env.FOO").to_json(),
            json!({"isLiteral": false, "value": "env.FOO"})
        );
    }

    #[test]
    fn test_arguments_text() {
        let args = Arguments::named([
            ("time", Value::literal(5_i64)),
            ("unit", Value::literal("MINUTES")),
        ]);
        assert_eq!(args.to_text(), "time: 5, unit: 'MINUTES'");
        assert_eq!(
            Arguments::Positional(vec![Value::literal("a"), Value::expression("b")]).to_text(),
            "'a', b"
        );
    }

    #[test]
    fn test_render_key_quotes_non_identifiers() {
        assert_eq!(render_key("linux"), "linux");
        assert_eq!(render_key("build linux"), "'build linux'");
    }

    #[test]
    fn test_literal_type_names() {
        assert_eq!(Literal::from("x").type_name(), "String");
        assert_eq!(Literal::from(3_i64).type_name(), "int");
        assert_eq!(Literal::from(true).type_name(), "boolean");
    }

    proptest! {
        #[test]
        fn test_literal_json_preserves_content(s in ".*") {
            let json = Value::literal(s.clone()).to_json();
            prop_assert_eq!(json["value"].as_str(), Some(s.as_str()));
        }
    }
}
