//! Post-build and post-stage conditions

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::location::SourceLocation;
use super::steps::{Branch, Step};
use super::text::TextWriter;
use super::Element;
use crate::validator::ModelValidator;
use serde_json::json;

/// Whether a post section belongs to the pipeline or to a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostScope {
    /// Pipeline-level `post`
    #[default]
    Build,
    /// Stage-level `post`
    Stage,
}

/// `condition { steps }` entry of a post section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCondition {
    /// Condition name, e.g. `always` or `failure`
    pub condition: String,
    /// Steps to run when the condition holds
    pub branch: Branch,
    /// Source location
    pub location: SourceLocation,
}

impl BuildCondition {
    /// Creates a build condition
    pub fn new(condition: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            condition: condition.into(),
            branch: Branch::default_with(steps),
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

impl Element for BuildCondition {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_build_condition(self);
        valid &= self.branch.validate(validator);
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        json!({"condition": self.condition, "branch": self.branch.to_json()})
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block(&self.condition, |out| self.branch.write_steps(out));
    }
}

/// `post { ... }` section
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Post {
    /// Pipeline or stage scope
    pub scope: PostScope,
    /// Conditions in declaration order
    pub conditions: Vec<BuildCondition>,
    /// Source location
    pub location: SourceLocation,
}

impl Post {
    /// Creates a pipeline-level post section
    pub fn build(conditions: Vec<BuildCondition>) -> Self {
        Self {
            scope: PostScope::Build,
            conditions,
            location: SourceLocation::Unknown,
        }
    }

    /// Creates a stage-level post section
    pub fn stage(conditions: Vec<BuildCondition>) -> Self {
        Self {
            scope: PostScope::Stage,
            conditions,
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

impl Element for Post {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = match self.scope {
            PostScope::Build => validator.validate_post_build(self),
            PostScope::Stage => validator.validate_post_stage(self),
        };
        for condition in &self.conditions {
            valid &= condition.validate(validator);
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        json!({"conditions": self.conditions.iter().map(Element::to_json).collect::<Vec<_>>()})
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block("post", |out| {
            for condition in &self.conditions {
                condition.write_text(out);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::value::{Arguments, Value};

    #[test]
    fn test_post_text_and_json() {
        let post = Post::build(vec![BuildCondition::new(
            "always",
            vec![Step::call("echo", Arguments::single(Value::literal("done")))],
        )]);
        assert_eq!(
            post.to_canonical_text(),
            "post {\n    always {\n        echo('done')\n    }\n}\n"
        );
        let json = post.to_json();
        assert_eq!(json["conditions"][0]["condition"], "always");
        assert_eq!(json["conditions"][0]["branch"]["name"], "default");
    }
}
