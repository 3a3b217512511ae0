//! Agent configuration
//!
//! The agent names where a pipeline or stage runs: `any`, `none`, a label,
//! a node, a container image, or any agent type registered in the catalog.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::location::SourceLocation;
use super::text::TextWriter;
use super::value::Arguments;
use super::Element;
use crate::validator::ModelValidator;
use serde_json::json;

/// Agent that accepts any executor
pub const AGENT_ANY: &str = "any";

/// Agent that allocates nothing
pub const AGENT_NONE: &str = "none";

/// Agent types that run inside a container
pub const CONTAINER_AGENTS: &[&str] = &["docker", "dockerfile", "kubernetes"];

/// Agent declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    /// Agent type name
    pub agent_type: String,
    /// Agent arguments
    pub arguments: Arguments,
    /// Source location
    pub location: SourceLocation,
}

impl Agent {
    /// Creates an agent of the given type with arguments
    pub fn new(agent_type: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            agent_type: agent_type.into(),
            arguments,
            location: SourceLocation::Unknown,
        }
    }

    /// `agent any`
    pub fn any() -> Self {
        Self::new(AGENT_ANY, Arguments::none())
    }

    /// `agent none`
    pub fn none() -> Self {
        Self::new(AGENT_NONE, Arguments::none())
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    /// Returns true for `agent none`
    pub fn is_none(&self) -> bool {
        self.agent_type == AGENT_NONE
    }

    /// Returns true if the agent runs inside a container
    pub fn is_container(&self) -> bool {
        CONTAINER_AGENTS.contains(&self.agent_type.as_str())
    }
}

impl Element for Agent {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_agent(self);
        valid &= self.arguments.validate(validator);
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        if self.arguments.is_empty() {
            json!({"type": self.agent_type})
        } else {
            json!({"type": self.agent_type, "arguments": self.arguments.to_json()})
        }
    }

    fn write_text(&self, out: &mut TextWriter) {
        let bare = self.agent_type == AGENT_ANY || self.agent_type == AGENT_NONE;
        if bare && self.arguments.is_empty() {
            out.line(format!("agent {}", self.agent_type));
        } else {
            out.block("agent", |out| {
                out.line(format!("{}({})", self.agent_type, self.arguments.to_text()));
            });
        }
    }
}
