//! Stages and stage inputs
//!
//! A stage carries optional directives (agent, when, environment, tools,
//! options, input, post) and a body. The body is exactly one of: a flat step
//! list, legacy parallel branches, parallel stages, nested sequential stages,
//! or a matrix. The model keeps every body kind that was written so the
//! validator can report conflicts.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::agent::Agent;
use super::directives::{BuildParameters, Options};
use super::environment::{Environment, Tools};
use super::location::SourceLocation;
use super::matrix::Matrix;
use super::post::Post;
use super::steps::{Branch, DEFAULT_BRANCH, Step, write_branches};
use super::text::TextWriter;
use super::value::Value;
use super::when::When;
use super::Element;
use crate::validator::ModelValidator;
use serde_json::json;

/// Body kinds a stage may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// `steps { ... }`, flat or with legacy parallel branches
    Steps,
    /// `parallel { stage ... }`
    Parallel,
    /// `stages { ... }`
    Stages,
    /// `matrix { ... }`
    Matrix,
}

/// `input { ... }` of a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInput {
    /// Prompt message
    pub message: Value,
    /// Input id
    pub id: Option<Value>,
    /// Label of the proceed button
    pub ok: Option<Value>,
    /// Users or groups allowed to submit
    pub submitter: Option<Value>,
    /// Variable receiving the submitter name
    pub submitter_parameter: Option<Value>,
    /// Parameters requested from the submitter
    pub parameters: Option<BuildParameters>,
    /// Source location
    pub location: SourceLocation,
}

impl StageInput {
    /// Creates an input with a message
    pub fn new(message: Value) -> Self {
        Self {
            message,
            id: None,
            ok: None,
            submitter: None,
            submitter_parameter: None,
            parameters: None,
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    fn optional_fields(&self) -> [(&'static str, Option<&Value>); 4] {
        [
            ("id", self.id.as_ref()),
            ("ok", self.ok.as_ref()),
            ("submitter", self.submitter.as_ref()),
            ("submitterParameter", self.submitter_parameter.as_ref()),
        ]
    }
}

impl Element for StageInput {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_input(self);
        valid &= self.message.validate(validator);
        for (_, value) in self.optional_fields() {
            if let Some(value) = value {
                valid &= value.validate(validator);
            }
        }
        if let Some(parameters) = &self.parameters {
            valid &= parameters.validate(validator);
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("message".to_string(), self.message.to_json());
        for (key, value) in self.optional_fields() {
            if let Some(value) = value {
                obj.insert(key.to_string(), value.to_json());
            }
        }
        if let Some(parameters) = &self.parameters {
            obj.insert("parameters".to_string(), parameters.to_json());
        }
        serde_json::Value::Object(obj)
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block("input", |out| {
            out.line(format!("message({})", self.message.to_text()));
            for (key, value) in self.optional_fields() {
                if let Some(value) = value {
                    out.line(format!("{key}({})", value.to_text()));
                }
            }
            if let Some(parameters) = &self.parameters {
                parameters.write_text(out);
            }
        });
    }
}

/// Single stage
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Stage {
    /// Stage name
    pub name: String,
    /// Stage agent
    pub agent: Option<Agent>,
    /// Execution condition
    pub when: Option<When>,
    /// Stage environment
    pub environment: Option<Environment>,
    /// Stage tools
    pub tools: Option<Tools>,
    /// Stage-scoped options
    pub options: Option<Options>,
    /// Manual input before the body runs
    pub input: Option<StageInput>,
    /// Stage post conditions
    pub post: Option<Post>,
    /// Abort sibling parallel work on first failure
    pub fail_fast: bool,
    /// Flat steps (one `default` branch) or legacy parallel branches
    pub branches: Vec<Branch>,
    /// Parallel stages
    pub parallel: Option<Stages>,
    /// Nested sequential stages
    pub stages: Option<Stages>,
    /// Matrix body
    pub matrix: Option<Matrix>,
    /// Source location
    pub location: SourceLocation,
}

impl Stage {
    /// Creates an empty stage
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets a flat step body
    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.branches = vec![Branch::default_with(steps)];
        self
    }

    /// Sets legacy parallel branches
    pub fn with_branches(mut self, branches: Vec<Branch>) -> Self {
        self.branches = branches;
        self
    }

    /// Sets parallel stages
    pub fn with_parallel(mut self, stages: Stages) -> Self {
        self.parallel = Some(stages);
        self
    }

    /// Sets nested sequential stages
    pub fn with_stages(mut self, stages: Stages) -> Self {
        self.stages = Some(stages);
        self
    }

    /// Sets a matrix body
    pub fn with_matrix(mut self, matrix: Matrix) -> Self {
        self.matrix = Some(matrix);
        self
    }

    /// Sets the agent
    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Sets the environment
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    /// Body kinds present on this stage
    pub fn body_kinds(&self) -> Vec<BodyKind> {
        let mut kinds = Vec::new();
        if !self.branches.is_empty() {
            kinds.push(BodyKind::Steps);
        }
        if self.parallel.is_some() {
            kinds.push(BodyKind::Parallel);
        }
        if self.stages.is_some() {
            kinds.push(BodyKind::Stages);
        }
        if self.matrix.is_some() {
            kinds.push(BodyKind::Matrix);
        }
        kinds
    }

    /// Returns true if the body is a set of legacy parallel branches
    pub fn has_legacy_branches(&self) -> bool {
        match self.branches.as_slice() {
            [] => false,
            [only] => only.name != DEFAULT_BRANCH,
            _ => true,
        }
    }
}

impl Element for Stage {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_stage(self);
        if let Some(agent) = &self.agent {
            valid &= agent.validate(validator);
        }
        if let Some(when) = &self.when {
            valid &= when.validate(validator);
        }
        if let Some(environment) = &self.environment {
            valid &= environment.validate(validator);
        }
        if let Some(tools) = &self.tools {
            valid &= tools.validate(validator);
        }
        if let Some(options) = &self.options {
            valid &= options.validate(validator);
        }
        if let Some(input) = &self.input {
            valid &= input.validate(validator);
        }
        for branch in &self.branches {
            valid &= branch.validate(validator);
        }
        if let Some(parallel) = &self.parallel {
            valid &= parallel.validate(validator);
        }
        if let Some(stages) = &self.stages {
            valid &= stages.validate(validator);
        }
        if let Some(matrix) = &self.matrix {
            valid &= matrix.validate(validator);
        }
        if let Some(post) = &self.post {
            valid &= post.validate(validator);
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("name".to_string(), json!(self.name));
        if let Some(agent) = &self.agent {
            obj.insert("agent".to_string(), agent.to_json());
        }
        if let Some(when) = &self.when {
            obj.insert("when".to_string(), when.to_json());
        }
        if let Some(environment) = &self.environment {
            obj.insert("environment".to_string(), environment.to_json());
        }
        if let Some(tools) = &self.tools {
            obj.insert("tools".to_string(), tools.to_json());
        }
        if let Some(options) = &self.options {
            obj.insert("options".to_string(), options.to_json());
        }
        if let Some(input) = &self.input {
            obj.insert("input".to_string(), input.to_json());
        }
        if let Some(post) = &self.post {
            obj.insert("post".to_string(), post.to_json());
        }
        if self.fail_fast {
            obj.insert("failFast".to_string(), json!(true));
        }
        if !self.branches.is_empty() {
            obj.insert(
                "branches".to_string(),
                self.branches.iter().map(Element::to_json).collect(),
            );
        }
        if let Some(parallel) = &self.parallel {
            obj.insert("parallel".to_string(), parallel.to_json());
        }
        if let Some(stages) = &self.stages {
            obj.insert("stages".to_string(), stages.to_json());
        }
        if let Some(matrix) = &self.matrix {
            obj.insert("matrix".to_string(), matrix.to_json());
        }
        serde_json::Value::Object(obj)
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block(format!("stage({})", super::text::quote(&self.name)), |out| {
            if let Some(agent) = &self.agent {
                agent.write_text(out);
            }
            if let Some(when) = &self.when {
                when.write_text(out);
            }
            if let Some(environment) = &self.environment {
                environment.write_text(out);
            }
            if let Some(tools) = &self.tools {
                tools.write_text(out);
            }
            if let Some(options) = &self.options {
                options.write_text(out);
            }
            if let Some(input) = &self.input {
                input.write_text(out);
            }
            if self.fail_fast {
                out.line("failFast true");
            }
            if !self.branches.is_empty() {
                write_branches(&self.branches, out);
            }
            if let Some(parallel) = &self.parallel {
                out.block("parallel", |out| parallel.write_stage_list(out));
            }
            if let Some(stages) = &self.stages {
                stages.write_text(out);
            }
            if let Some(matrix) = &self.matrix {
                matrix.write_text(out);
            }
            if let Some(post) = &self.post {
                post.write_text(out);
            }
        });
    }
}

/// Ordered stage list
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Stages {
    /// Stages in order
    pub stages: Vec<Stage>,
    /// Source location
    pub location: SourceLocation,
}

impl Stages {
    /// Creates a stage list
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    /// Returns true if there are no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Writes the stages without a surrounding block
    pub fn write_stage_list(&self, out: &mut TextWriter) {
        for stage in &self.stages {
            stage.write_text(out);
        }
    }
}

impl Element for Stages {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_stages(self);
        for stage in &self.stages {
            valid &= stage.validate(validator);
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        self.stages.iter().map(Element::to_json).collect()
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block("stages", |out| self.write_stage_list(out));
    }
}
