//! Canonical pipeline model
//!
//! Both front-ends build this tree. Every node implements [`Element`]: it
//! keeps the location it was parsed from, dispatches itself and its children
//! to a [`ModelValidator`], and renders as JSON and as canonical script text.
//!
//! Node equality ignores source locations, so a model parsed from script text
//! compares equal to the same model parsed from JSON.

pub mod agent;
pub mod builders;
pub mod directives;
pub mod environment;
pub mod location;
pub mod matrix;
pub mod pipeline_def;
pub mod post;
pub mod stage;
pub mod steps;
pub mod text;
pub mod value;
pub mod when;

pub use agent::Agent;
pub use directives::{BuildParameters, Libraries, MethodCall, Options, Triggers};
pub use environment::{
    Environment, EnvironmentEntry, EnvironmentValue, InternalFunctionCall, ToolEntry, Tools,
};
pub use location::SourceLocation;
pub use matrix::{Axis, AxisContainer, Exclude, ExcludeAxis, Excludes, Matrix, MatrixCell};
pub use pipeline_def::{PipelineBuilder, PipelineDef};
pub use post::{BuildCondition, Post, PostScope};
pub use stage::{BodyKind, Stage, StageInput, Stages};
pub use steps::{Branch, MethodStep, ScriptBlock, Step, TreeStep};
pub use text::TextWriter;
pub use value::{Arguments, Literal, NamedArgument, Value};
pub use when::{When, WhenCondition};

use crate::validator::ModelValidator;

/// Common behaviour of all model nodes
pub trait Element {
    /// Where the node came from
    fn location(&self) -> &SourceLocation;

    /// Dispatches this node and all its children to the validator.
    ///
    /// Children are visited even when the node itself is invalid so that all
    /// problems surface in one pass.
    fn validate(&self, validator: &mut dyn ModelValidator) -> bool;

    /// Schema-conformant JSON rendering
    fn to_json(&self) -> serde_json::Value;

    /// Writes canonical script text
    fn write_text(&self, out: &mut TextWriter);

    /// Canonical script text with 4-space indentation
    fn to_canonical_text(&self) -> String {
        let mut out = TextWriter::new();
        self.write_text(&mut out);
        out.finish()
    }
}
