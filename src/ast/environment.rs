//! Environment and tools sections

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::location::SourceLocation;
use super::text::TextWriter;
use super::value::Value;
use super::Element;
use crate::validator::ModelValidator;
use serde_json::json;

/// Call to a built-in function inside `environment`, e.g. `credentials('id')`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalFunctionCall {
    /// Function name
    pub name: String,
    /// Argument values
    pub args: Vec<Value>,
    /// Source location
    pub location: SourceLocation,
}

impl InternalFunctionCall {
    /// Creates a function call
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    fn to_text(&self) -> String {
        let args: Vec<String> = self.args.iter().map(Value::to_text).collect();
        format!("{}({})", self.name, args.join(", "))
    }
}

impl Element for InternalFunctionCall {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_internal_function(self);
        for arg in &self.args {
            valid &= arg.validate(validator);
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "internalFunction": self.name,
            "arguments": self.args.iter().map(Element::to_json).collect::<Vec<_>>(),
        })
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.line(self.to_text());
    }
}

/// Right-hand side of an environment entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentValue {
    /// Literal or expression
    Value(Value),
    /// Built-in function call
    Function(InternalFunctionCall),
}

impl EnvironmentValue {
    /// Script rendering of the right-hand side
    pub fn to_text(&self) -> String {
        match self {
            Self::Value(v) => v.to_text(),
            Self::Function(f) => f.to_text(),
        }
    }

    /// JSON rendering of the right-hand side
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Value(v) => v.to_json(),
            Self::Function(f) => f.to_json(),
        }
    }
}

/// One `KEY = value` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentEntry {
    /// Variable name
    pub key: String,
    /// Unevaluated value
    pub value: EnvironmentValue,
    /// Source location
    pub location: SourceLocation,
}

impl EnvironmentEntry {
    /// Creates an entry holding a value
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value: EnvironmentValue::Value(value),
            location: SourceLocation::Unknown,
        }
    }

    /// Creates an entry holding a function call
    pub fn function(key: impl Into<String>, call: InternalFunctionCall) -> Self {
        Self {
            key: key.into(),
            value: EnvironmentValue::Function(call),
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

/// `environment { ... }` section; duplicate keys are kept and reported
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Environment {
    /// Entries in declaration order
    pub entries: Vec<EnvironmentEntry>,
    /// Source location
    pub location: SourceLocation,
}

impl Environment {
    /// Creates an environment section
    pub fn new(entries: Vec<EnvironmentEntry>) -> Self {
        Self {
            entries,
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    /// Looks up the first entry with the given key
    pub fn get(&self, key: &str) -> Option<&EnvironmentValue> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }
}

impl Element for Environment {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_environment(self);
        for entry in &self.entries {
            valid &= match &entry.value {
                EnvironmentValue::Value(v) => v.validate(validator),
                EnvironmentValue::Function(f) => f.validate(validator),
            };
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        self.entries
            .iter()
            .map(|e| json!({"key": e.key, "value": e.value.to_json()}))
            .collect()
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block("environment", |out| {
            for entry in &self.entries {
                out.line(format!("{} = {}", entry.key, entry.value.to_text()));
            }
        });
    }
}

/// One `toolType 'version'` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolEntry {
    /// Tool type
    pub key: String,
    /// Installation name
    pub value: Value,
    /// Source location
    pub location: SourceLocation,
}

impl ToolEntry {
    /// Creates a tool entry
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

/// `tools { ... }` section
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tools {
    /// Tool entries in order
    pub tools: Vec<ToolEntry>,
    /// Source location
    pub location: SourceLocation,
}

impl Tools {
    /// Creates a tools section
    pub fn new(tools: Vec<ToolEntry>) -> Self {
        Self {
            tools,
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

impl Element for Tools {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_tools(self);
        for tool in &self.tools {
            valid &= tool.value.validate(validator);
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        self.tools
            .iter()
            .map(|t| json!({"key": t.key, "value": t.value.to_json()}))
            .collect()
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block("tools", |out| {
            for tool in &self.tools {
                out.line(format!("{}({})", tool.key, tool.value.to_text()));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Environment {
        Environment::new(vec![
            EnvironmentEntry::new("FOO", Value::literal("bar")),
            EnvironmentEntry::new("BAZ", Value::expression("\"${FOO}-x\"")),
            EnvironmentEntry::function(
                "CREDS",
                InternalFunctionCall::new("credentials", vec![Value::literal("my-id")]),
            ),
        ])
    }

    #[test]
    fn test_environment_text() {
        insta::assert_snapshot!(sample().to_canonical_text(), @r#"
        environment {
            FOO = 'bar'
            BAZ = "${FOO}-x"
            CREDS = credentials('my-id')
        }
        "#);
    }

    #[test]
    fn test_environment_json() {
        let json = sample().to_json();
        assert_eq!(json[0], json!({"key": "FOO", "value": {"isLiteral": true, "value": "bar"}}));
        assert_eq!(json[2]["value"]["internalFunction"], "credentials");
        assert_eq!(json[2]["value"]["arguments"][0]["value"], "my-id");
    }

    #[test]
    fn test_duplicate_keys_are_kept() {
        let env = Environment::new(vec![
            EnvironmentEntry::new("A", Value::literal("1")),
            EnvironmentEntry::new("A", Value::literal("2")),
        ]);
        assert_eq!(env.entries.len(), 2);
        assert_eq!(
            env.get("A"),
            Some(&EnvironmentValue::Value(Value::literal("1")))
        );
    }

    #[test]
    fn test_tools_text() {
        let tools = Tools::new(vec![ToolEntry::new("maven", Value::literal("3.9"))]);
        assert_eq!(tools.to_canonical_text(), "tools {\n    maven('3.9')\n}\n");
    }
}
