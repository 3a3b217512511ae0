//! Stage `when` conditions

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::location::SourceLocation;
use super::steps::SCRIPT_BLOCK_KEY;
use super::text::TextWriter;
use super::value::Arguments;
use super::Element;
use crate::validator::ModelValidator;
use serde_json::json;

/// Name of the opaque expression condition
pub const EXPRESSION_CONDITION: &str = "expression";

/// Composite conditions and their child arity
pub const COMPOSITE_CONDITIONS: &[&str] = &["allOf", "anyOf", "not"];

/// Single condition of a `when` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhenCondition {
    /// Catalog condition with arguments, e.g. `branch 'main'`
    Leaf {
        /// Condition name
        name: String,
        /// Arguments
        arguments: Arguments,
        /// Source location
        location: SourceLocation,
    },

    /// `expression { ... }` with opaque block text
    Expression {
        /// Dedented block text
        text: String,
        /// Source location
        location: SourceLocation,
    },

    /// `allOf`, `anyOf` or `not` over nested conditions
    Composite {
        /// Combinator name
        name: String,
        /// Nested conditions
        children: Vec<WhenCondition>,
        /// Source location
        location: SourceLocation,
    },
}

impl WhenCondition {
    /// Creates a leaf condition
    pub fn leaf(name: impl Into<String>, arguments: Arguments) -> Self {
        Self::Leaf {
            name: name.into(),
            arguments,
            location: SourceLocation::Unknown,
        }
    }

    /// Creates an expression condition
    pub fn expression(text: impl Into<String>) -> Self {
        Self::Expression {
            text: text.into(),
            location: SourceLocation::Unknown,
        }
    }

    /// Creates a composite condition
    pub fn composite(name: impl Into<String>, children: Vec<WhenCondition>) -> Self {
        Self::Composite {
            name: name.into(),
            children,
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, loc: SourceLocation) -> Self {
        match &mut self {
            Self::Leaf { location, .. }
            | Self::Expression { location, .. }
            | Self::Composite { location, .. } => *location = loc,
        }
        self
    }

    /// Condition name
    pub fn name(&self) -> &str {
        match self {
            Self::Leaf { name, .. } | Self::Composite { name, .. } => name,
            Self::Expression { .. } => EXPRESSION_CONDITION,
        }
    }
}

impl Element for WhenCondition {
    fn location(&self) -> &SourceLocation {
        match self {
            Self::Leaf { location, .. }
            | Self::Expression { location, .. }
            | Self::Composite { location, .. } => location,
        }
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_when_condition(self);
        match self {
            Self::Leaf { arguments, .. } => valid &= arguments.validate(validator),
            Self::Composite { children, .. } => {
                for child in children {
                    valid &= child.validate(validator);
                }
            }
            Self::Expression { .. } => {}
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Leaf { name, arguments, .. } => {
                json!({"name": name, "arguments": arguments.to_json()})
            }
            Self::Expression { text, .. } => json!({
                "name": EXPRESSION_CONDITION,
                "arguments": [{
                    "key": SCRIPT_BLOCK_KEY,
                    "value": {"isLiteral": true, "value": text},
                }],
            }),
            Self::Composite { name, children, .. } => json!({
                "name": name,
                "children": children.iter().map(Element::to_json).collect::<Vec<_>>(),
            }),
        }
    }

    fn write_text(&self, out: &mut TextWriter) {
        match self {
            Self::Leaf { name, arguments, .. } => {
                out.line(format!("{name}({})", arguments.to_text()));
            }
            Self::Expression { text, .. } => {
                out.block(EXPRESSION_CONDITION, |out| out.verbatim(text));
            }
            Self::Composite { name, children, .. } => out.block(name, |out| {
                for child in children {
                    child.write_text(out);
                }
            }),
        }
    }
}

/// `when { ... }` section of a stage
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct When {
    /// Conditions, all of which must hold
    pub conditions: Vec<WhenCondition>,
    /// Evaluate before entering the stage agent
    pub before_agent: bool,
    /// Evaluate before the stage input
    pub before_input: bool,
    /// Evaluate before stage options apply
    pub before_options: bool,
    /// Source location
    pub location: SourceLocation,
}

impl When {
    /// Creates a when section
    pub fn new(conditions: Vec<WhenCondition>) -> Self {
        Self {
            conditions,
            ..Self::default()
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

impl Element for When {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_when(self);
        for condition in &self.conditions {
            valid &= condition.validate(validator);
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert(
            "conditions".to_string(),
            self.conditions.iter().map(Element::to_json).collect(),
        );
        for (key, flag) in [
            ("beforeAgent", self.before_agent),
            ("beforeInput", self.before_input),
            ("beforeOptions", self.before_options),
        ] {
            if flag {
                obj.insert(key.to_string(), serde_json::Value::Bool(true));
            }
        }
        serde_json::Value::Object(obj)
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block("when", |out| {
            for (key, flag) in [
                ("beforeAgent", self.before_agent),
                ("beforeInput", self.before_input),
                ("beforeOptions", self.before_options),
            ] {
                if flag {
                    out.line(format!("{key} true"));
                }
            }
            for condition in &self.conditions {
                condition.write_text(out);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::value::Value;

    #[test]
    fn test_when_text() {
        let mut when = When::new(vec![
            WhenCondition::leaf("branch", Arguments::single(Value::literal("main"))),
            WhenCondition::composite(
                "not",
                vec![WhenCondition::expression("return params.SKIP")],
            ),
        ]);
        when.before_agent = true;
        insta::assert_snapshot!(when.to_canonical_text(), @r"
        when {
            beforeAgent true
            branch('main')
            not {
                expression {
                    return params.SKIP
                }
            }
        }
        ");
    }

    #[test]
    fn test_when_json_omits_unset_flags() {
        let when = When::new(vec![WhenCondition::expression("true")]);
        let json = when.to_json();
        assert!(json.get("beforeAgent").is_none());
        assert_eq!(json["conditions"][0]["name"], "expression");
        assert_eq!(json["conditions"][0]["arguments"][0]["key"], "scriptBlock");
    }
}
