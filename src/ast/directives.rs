//! Options, triggers, parameters and libraries
//!
//! All four sections are ordered lists; the first three hold method calls
//! resolved against the descriptor catalog of their kind.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::location::SourceLocation;
use super::text::TextWriter;
use super::value::{Arguments, Value};
use super::Element;
use crate::descriptor::DescriptorKind;
use crate::validator::ModelValidator;
use serde_json::json;

/// Call inside `options`, `triggers` or `parameters`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    /// Catalog the name resolves against
    pub kind: DescriptorKind,
    /// Capability name
    pub name: String,
    /// Arguments
    pub arguments: Arguments,
    /// Source location
    pub location: SourceLocation,
}

impl MethodCall {
    /// Creates a call of the given kind
    pub fn new(kind: DescriptorKind, name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            kind,
            name: name.into(),
            arguments,
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

impl Element for MethodCall {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = match self.kind {
            DescriptorKind::Trigger => validator.validate_trigger(self),
            DescriptorKind::Parameter => validator.validate_build_parameter(self),
            _ => validator.validate_option(self),
        };
        valid &= self.arguments.validate(validator);
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        json!({"name": self.name, "arguments": self.arguments.to_json()})
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.line(format!("{}({})", self.name, self.arguments.to_text()));
    }
}

fn calls_json(key: &str, calls: &[MethodCall]) -> serde_json::Value {
    let mut obj = serde_json::Map::new();
    obj.insert(key.to_string(), calls.iter().map(Element::to_json).collect());
    serde_json::Value::Object(obj)
}

/// `options { ... }`, at pipeline or stage scope
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Options {
    /// Option calls in order
    pub options: Vec<MethodCall>,
    /// Declared inside a stage
    pub in_stage: bool,
    /// Source location
    pub location: SourceLocation,
}

impl Options {
    /// Creates a pipeline-level options section
    pub fn new(options: Vec<MethodCall>) -> Self {
        Self {
            options,
            in_stage: false,
            location: SourceLocation::Unknown,
        }
    }

    /// Marks the section as stage-scoped
    pub fn in_stage(mut self) -> Self {
        self.in_stage = true;
        self
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    /// Returns true if an option with this name is present
    pub fn contains(&self, name: &str) -> bool {
        self.options.iter().any(|o| o.name == name)
    }

    /// Looks up an option by name
    pub fn get(&self, name: &str) -> Option<&MethodCall> {
        self.options.iter().find(|o| o.name == name)
    }
}

impl Element for Options {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_options(self);
        for option in &self.options {
            valid &= option.validate(validator);
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        calls_json("options", &self.options)
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block("options", |out| {
            for option in &self.options {
                option.write_text(out);
            }
        });
    }
}

/// `triggers { ... }`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Triggers {
    /// Trigger calls in order
    pub triggers: Vec<MethodCall>,
    /// Source location
    pub location: SourceLocation,
}

impl Triggers {
    /// Creates a triggers section
    pub fn new(triggers: Vec<MethodCall>) -> Self {
        Self {
            triggers,
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

impl Element for Triggers {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_triggers(self);
        for trigger in &self.triggers {
            valid &= trigger.validate(validator);
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        calls_json("triggers", &self.triggers)
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block("triggers", |out| {
            for trigger in &self.triggers {
                trigger.write_text(out);
            }
        });
    }
}

/// `parameters { ... }`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildParameters {
    /// Parameter declarations in order
    pub parameters: Vec<MethodCall>,
    /// Source location
    pub location: SourceLocation,
}

impl BuildParameters {
    /// Creates a parameters section
    pub fn new(parameters: Vec<MethodCall>) -> Self {
        Self {
            parameters,
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

impl Element for BuildParameters {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_build_parameters(self);
        for parameter in &self.parameters {
            valid &= parameter.validate(validator);
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        calls_json("parameters", &self.parameters)
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block("parameters", |out| {
            for parameter in &self.parameters {
                parameter.write_text(out);
            }
        });
    }
}

/// `libraries { lib('name@version') }`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Libraries {
    /// Library references
    pub libraries: Vec<Value>,
    /// Source location
    pub location: SourceLocation,
}

impl Libraries {
    /// Creates a libraries section
    pub fn new(libraries: Vec<Value>) -> Self {
        Self {
            libraries,
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

impl Element for Libraries {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_libraries(self);
        for library in &self.libraries {
            valid &= library.validate(validator);
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        json!({"libraries": self.libraries.iter().map(Element::to_json).collect::<Vec<_>>()})
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block("libraries", |out| {
            for library in &self.libraries {
                out.line(format!("lib({})", library.to_text()));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_json_is_wrapped() {
        let options = Options::new(vec![MethodCall::new(
            DescriptorKind::Option,
            "skipDefaultCheckout",
            Arguments::none(),
        )]);
        assert_eq!(
            options.to_json(),
            json!({"options": [{"name": "skipDefaultCheckout", "arguments": []}]})
        );
        assert!(options.contains("skipDefaultCheckout"));
    }

    #[test]
    fn test_triggers_text() {
        let triggers = Triggers::new(vec![MethodCall::new(
            DescriptorKind::Trigger,
            "cron",
            Arguments::single(Value::literal("H 4 * * 1-5")),
        )]);
        assert_eq!(
            triggers.to_canonical_text(),
            "triggers {\n    cron('H 4 * * 1-5')\n}\n"
        );
    }

    #[test]
    fn test_libraries_text() {
        let libs = Libraries::new(vec![Value::literal("shared@1.0")]);
        assert_eq!(libs.to_canonical_text(), "libraries {\n    lib('shared@1.0')\n}\n");
        assert_eq!(libs.to_json()["libraries"][0]["value"], "shared@1.0");
    }
}
