//! Steps and branches
//!
//! A step is a call to a step capability, a call that owns nested child
//! steps, or an opaque `script { ... }` block that is kept verbatim.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::location::SourceLocation;
use super::text::TextWriter;
use super::value::{Arguments, render_key};
use super::Element;
use crate::validator::ModelValidator;
use serde_json::json;

/// Name of the opaque script block step
pub const SCRIPT_STEP: &str = "script";

/// Argument key carrying a script block's text in JSON
pub const SCRIPT_BLOCK_KEY: &str = "scriptBlock";

/// Name of the branch holding a stage's flat step list
pub const DEFAULT_BRANCH: &str = "default";

/// Call to a step capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodStep {
    /// Capability name
    pub name: String,
    /// Arguments
    pub arguments: Arguments,
    /// Source location
    pub location: SourceLocation,
}

/// Call to a block-taking capability with nested steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeStep {
    /// Capability name
    pub name: String,
    /// Arguments
    pub arguments: Arguments,
    /// Nested steps
    pub children: Vec<Step>,
    /// Source location
    pub location: SourceLocation,
}

/// Verbatim host-language block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBlock {
    /// Dedented block text
    pub text: String,
    /// Source location
    pub location: SourceLocation,
}

/// One step of a branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Plain call
    Plain(MethodStep),
    /// Call with nested steps
    Tree(TreeStep),
    /// Opaque script block
    Script(ScriptBlock),
}

impl Step {
    /// Creates a plain step
    pub fn call(name: impl Into<String>, arguments: Arguments) -> Self {
        Self::Plain(MethodStep {
            name: name.into(),
            arguments,
            location: SourceLocation::Unknown,
        })
    }

    /// Creates a tree step
    pub fn tree(name: impl Into<String>, arguments: Arguments, children: Vec<Step>) -> Self {
        Self::Tree(TreeStep {
            name: name.into(),
            arguments,
            children,
            location: SourceLocation::Unknown,
        })
    }

    /// Creates a script block
    pub fn script(text: impl Into<String>) -> Self {
        Self::Script(ScriptBlock {
            text: text.into(),
            location: SourceLocation::Unknown,
        })
    }

    /// Sets the source location
    pub fn at(mut self, loc: SourceLocation) -> Self {
        match &mut self {
            Self::Plain(s) => s.location = loc,
            Self::Tree(s) => s.location = loc,
            Self::Script(s) => s.location = loc,
        }
        self
    }

    /// Capability name
    pub fn name(&self) -> &str {
        match self {
            Self::Plain(s) => &s.name,
            Self::Tree(s) => &s.name,
            Self::Script(_) => SCRIPT_STEP,
        }
    }

    /// Arguments, absent for script blocks
    pub fn arguments(&self) -> Option<&Arguments> {
        match self {
            Self::Plain(s) => Some(&s.arguments),
            Self::Tree(s) => Some(&s.arguments),
            Self::Script(_) => None,
        }
    }

    /// Nested steps of a tree step
    pub fn children(&self) -> &[Step] {
        match self {
            Self::Tree(s) => &s.children,
            _ => &[],
        }
    }

    /// Returns true for opaque script blocks
    pub fn is_script(&self) -> bool {
        matches!(self, Self::Script(_))
    }
}

impl Element for Step {
    fn location(&self) -> &SourceLocation {
        match self {
            Self::Plain(s) => &s.location,
            Self::Tree(s) => &s.location,
            Self::Script(s) => &s.location,
        }
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_step(self);
        match self {
            Self::Plain(s) => valid &= s.arguments.validate(validator),
            Self::Tree(s) => {
                valid &= s.arguments.validate(validator);
                for child in &s.children {
                    valid &= child.validate(validator);
                }
            }
            Self::Script(_) => {}
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Plain(s) => json!({"name": s.name, "arguments": s.arguments.to_json()}),
            Self::Tree(s) => json!({
                "name": s.name,
                "arguments": s.arguments.to_json(),
                "children": s.children.iter().map(Element::to_json).collect::<Vec<_>>(),
            }),
            Self::Script(s) => json!({
                "name": SCRIPT_STEP,
                "arguments": [{
                    "key": SCRIPT_BLOCK_KEY,
                    "value": {"isLiteral": true, "value": s.text},
                }],
            }),
        }
    }

    fn write_text(&self, out: &mut TextWriter) {
        match self {
            Self::Plain(s) => out.line(format!("{}({})", s.name, s.arguments.to_text())),
            Self::Tree(s) => {
                let header = if s.arguments.is_empty() {
                    s.name.clone()
                } else {
                    format!("{}({})", s.name, s.arguments.to_text())
                };
                out.block(header, |out| {
                    for child in &s.children {
                        child.write_text(out);
                    }
                });
            }
            Self::Script(s) => out.block(SCRIPT_STEP, |out| out.verbatim(&s.text)),
        }
    }
}

/// Named ordered step list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    /// Branch name
    pub name: String,
    /// Steps in order
    pub steps: Vec<Step>,
    /// Source location
    pub location: SourceLocation,
}

impl Branch {
    /// Creates a branch
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
            location: SourceLocation::Unknown,
        }
    }

    /// Creates the `default` branch of a flat step list
    pub fn default_with(steps: Vec<Step>) -> Self {
        Self::new(DEFAULT_BRANCH, steps)
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    /// Writes the steps without a surrounding block
    pub fn write_steps(&self, out: &mut TextWriter) {
        for step in &self.steps {
            step.write_text(out);
        }
    }
}

impl Element for Branch {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_branch(self);
        for step in &self.steps {
            valid &= step.validate(validator);
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "steps": self.steps.iter().map(Element::to_json).collect::<Vec<_>>(),
        })
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block(format!("{}:", render_key(&self.name)), |out| self.write_steps(out));
    }
}

/// Writes the `steps { ... }` block of a stage body
pub(crate) fn write_branches(branches: &[Branch], out: &mut TextWriter) {
    match branches {
        [only] if only.name == DEFAULT_BRANCH => {
            out.block("steps", |out| only.write_steps(out));
        }
        _ => out.block("steps", |out| {
            out.line("parallel(");
            out.indent();
            let last = branches.len().saturating_sub(1);
            for (i, branch) in branches.iter().enumerate() {
                out.open(format!("{}:", render_key(&branch.name)));
                branch.write_steps(out);
                out.close_with(if i == last { "" } else { "," });
            }
            out.outdent();
            out.line(")");
        }),
    }
}

/// Renders a single step list as standalone script text
pub fn steps_to_text(steps: &[Step]) -> String {
    let mut out = TextWriter::new();
    for step in steps {
        step.write_text(&mut out);
    }
    out.finish()
}

/// Renders a single step list as a JSON array
pub fn steps_to_json(steps: &[Step]) -> serde_json::Value {
    serde_json::Value::Array(steps.iter().map(Element::to_json).collect())
}
