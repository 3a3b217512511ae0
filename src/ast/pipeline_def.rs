//! Pipeline root node and builder

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::agent::Agent;
use super::directives::{BuildParameters, Libraries, Options, Triggers};
use super::environment::{Environment, Tools};
use super::location::SourceLocation;
use super::post::Post;
use super::stage::{Stage, Stages};
use super::text::TextWriter;
use super::Element;
use crate::validator::ModelValidator;
use std::fmt;

/// Root of a parsed `pipeline { ... }`
///
/// Every section is optional in the model so that missing required sections
/// (`agent`, `stages`) can be reported by the validator instead of the parser.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineDef {
    /// Top-level stages
    pub stages: Option<Stages>,
    /// Pipeline agent
    pub agent: Option<Agent>,
    /// Pipeline environment
    pub environment: Option<Environment>,
    /// Pipeline tools
    pub tools: Option<Tools>,
    /// Pipeline options
    pub options: Option<Options>,
    /// Build triggers
    pub triggers: Option<Triggers>,
    /// Build parameters
    pub parameters: Option<BuildParameters>,
    /// Shared libraries
    pub libraries: Option<Libraries>,
    /// Post-build conditions
    pub post: Option<Post>,
    /// Source location
    pub location: SourceLocation,
}

impl PipelineDef {
    /// Creates a new pipeline builder
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Returns the number of top-level stages
    pub fn stage_count(&self) -> usize {
        self.stages.as_ref().map_or(0, |s| s.stages.len())
    }

    /// Iterates the top-level stages
    pub fn stage_list(&self) -> &[Stage] {
        self.stages.as_ref().map_or(&[], |s| &s.stages)
    }
}

impl fmt::Display for PipelineDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pipeline({}): {} stages",
            self.agent.as_ref().map_or("no agent", |a| a.agent_type.as_str()),
            self.stage_count()
        )
    }
}

impl Element for PipelineDef {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_pipeline_def(self);
        if let Some(agent) = &self.agent {
            valid &= agent.validate(validator);
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
        if let Some(triggers) = &self.triggers {
            valid &= triggers.validate(validator);
        }
        if let Some(parameters) = &self.parameters {
            valid &= parameters.validate(validator);
        }
        if let Some(libraries) = &self.libraries {
            valid &= libraries.validate(validator);
        }
        if let Some(stages) = &self.stages {
            valid &= stages.validate(validator);
        }
        if let Some(post) = &self.post {
            valid &= post.validate(validator);
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        if let Some(stages) = &self.stages {
            obj.insert("stages".to_string(), stages.to_json());
        }
        if let Some(agent) = &self.agent {
            obj.insert("agent".to_string(), agent.to_json());
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
        if let Some(triggers) = &self.triggers {
            obj.insert("triggers".to_string(), triggers.to_json());
        }
        if let Some(parameters) = &self.parameters {
            obj.insert("parameters".to_string(), parameters.to_json());
        }
        if let Some(libraries) = &self.libraries {
            obj.insert("libraries".to_string(), libraries.to_json());
        }
        if let Some(post) = &self.post {
            obj.insert("post".to_string(), post.to_json());
        }
        serde_json::json!({"pipeline": serde_json::Value::Object(obj)})
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block("pipeline", |out| {
            if let Some(libraries) = &self.libraries {
                libraries.write_text(out);
            }
            if let Some(agent) = &self.agent {
                agent.write_text(out);
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
            if let Some(parameters) = &self.parameters {
                parameters.write_text(out);
            }
            if let Some(triggers) = &self.triggers {
                triggers.write_text(out);
            }
            if let Some(stages) = &self.stages {
                stages.write_text(out);
            }
            if let Some(post) = &self.post {
                post.write_text(out);
            }
        });
    }
}

/// Builder for programmatically assembled pipelines
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    pipeline: PipelineDef,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the agent
    pub fn agent(mut self, agent: Agent) -> Self {
        self.pipeline.agent = Some(agent);
        self
    }

    /// Appends a stage
    pub fn stage(mut self, stage: Stage) -> Self {
        self.pipeline
            .stages
            .get_or_insert_with(Stages::default)
            .stages
            .push(stage);
        self
    }

    /// Sets the environment
    pub fn environment(mut self, environment: Environment) -> Self {
        self.pipeline.environment = Some(environment);
        self
    }

    /// Sets the tools
    pub fn tools(mut self, tools: Tools) -> Self {
        self.pipeline.tools = Some(tools);
        self
    }

    /// Sets the options
    pub fn options(mut self, options: Options) -> Self {
        self.pipeline.options = Some(options);
        self
    }

    /// Sets the triggers
    pub fn triggers(mut self, triggers: Triggers) -> Self {
        self.pipeline.triggers = Some(triggers);
        self
    }

    /// Sets the build parameters
    pub fn parameters(mut self, parameters: BuildParameters) -> Self {
        self.pipeline.parameters = Some(parameters);
        self
    }

    /// Sets the libraries
    pub fn libraries(mut self, libraries: Libraries) -> Self {
        self.pipeline.libraries = Some(libraries);
        self
    }

    /// Sets the post section
    pub fn post(mut self, post: Post) -> Self {
        self.pipeline.post = Some(post);
        self
    }

    /// Returns the assembled pipeline
    pub fn build(self) -> PipelineDef {
        self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::steps::Step;
    use crate::ast::value::{Arguments, Value};

    fn minimal() -> PipelineDef {
        PipelineDef::builder()
            .agent(Agent::any())
            .stage(
                Stage::new("a")
                    .with_steps(vec![Step::call("echo", Arguments::single(Value::literal("hi")))]),
            )
            .build()
    }

    #[test]
    fn test_minimal_text() {
        insta::assert_snapshot!(minimal().to_canonical_text(), @r"
        pipeline {
            agent any
            stages {
                stage('a') {
                    steps {
                        echo('hi')
                    }
                }
            }
        }
        ");
    }

    #[test]
    fn test_minimal_json() {
        let json = minimal().to_json();
        assert_eq!(json["pipeline"]["agent"]["type"], "any");
        assert_eq!(json["pipeline"]["stages"][0]["name"], "a");
        assert_eq!(
            json["pipeline"]["stages"][0]["branches"][0]["steps"][0]["name"],
            "echo"
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(minimal().to_string(), "Pipeline(any): 1 stages");
        assert_eq!(PipelineDef::default().stage_count(), 0);
    }
}
