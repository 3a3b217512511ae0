//! Model validation
//!
//! Two seams: [`ModelValidator`] is the closed visitor the model dispatches
//! into, and [`ValidatorContributor`] is the open extension point third
//! parties implement. [`ModelValidatorImpl`] applies the core rules and
//! merges every contributor's findings into the error collector.

pub mod arguments;
pub mod rules;

pub use rules::ModelValidatorImpl;

use crate::ast::{
    Agent, Axis, AxisContainer, Branch, BuildCondition, BuildParameters, Environment, Exclude,
    ExcludeAxis, Excludes, InternalFunctionCall, Libraries, Matrix, MethodCall, Options,
    PipelineDef, Post, Stage, StageInput, Stages, Step, Tools, Triggers, Value, When,
    WhenCondition,
};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

/// Visitor over every model node kind
///
/// Each method returns whether the node is valid. All methods default to
/// valid so new node kinds never break implementers.
#[allow(unused_variables)]
pub trait ModelValidator {
    /// Root node
    fn validate_pipeline_def(&mut self, node: &PipelineDef) -> bool {
        true
    }
    /// Agent section
    fn validate_agent(&mut self, node: &Agent) -> bool {
        true
    }
    /// A stage list
    fn validate_stages(&mut self, node: &Stages) -> bool {
        true
    }
    /// A single stage
    fn validate_stage(&mut self, node: &Stage) -> bool {
        true
    }
    /// A step list
    fn validate_branch(&mut self, node: &Branch) -> bool {
        true
    }
    /// A step
    fn validate_step(&mut self, node: &Step) -> bool {
        true
    }
    /// Any argument or field value
    fn validate_value(&mut self, node: &Value) -> bool {
        true
    }
    /// Environment section
    fn validate_environment(&mut self, node: &Environment) -> bool {
        true
    }
    /// `credentials(...)` and other internal functions
    fn validate_internal_function(&mut self, node: &InternalFunctionCall) -> bool {
        true
    }
    /// Tools section
    fn validate_tools(&mut self, node: &Tools) -> bool {
        true
    }
    /// Options section
    fn validate_options(&mut self, node: &Options) -> bool {
        true
    }
    /// One option
    fn validate_option(&mut self, node: &MethodCall) -> bool {
        true
    }
    /// Triggers section
    fn validate_triggers(&mut self, node: &Triggers) -> bool {
        true
    }
    /// One trigger
    fn validate_trigger(&mut self, node: &MethodCall) -> bool {
        true
    }
    /// Parameters section
    fn validate_build_parameters(&mut self, node: &BuildParameters) -> bool {
        true
    }
    /// One parameter definition
    fn validate_build_parameter(&mut self, node: &MethodCall) -> bool {
        true
    }
    /// Libraries section
    fn validate_libraries(&mut self, node: &Libraries) -> bool {
        true
    }
    /// Pipeline-level post section
    fn validate_post_build(&mut self, node: &Post) -> bool {
        true
    }
    /// Stage-level post section
    fn validate_post_stage(&mut self, node: &Post) -> bool {
        true
    }
    /// One post condition
    fn validate_build_condition(&mut self, node: &BuildCondition) -> bool {
        true
    }
    /// When section
    fn validate_when(&mut self, node: &When) -> bool {
        true
    }
    /// One when condition
    fn validate_when_condition(&mut self, node: &WhenCondition) -> bool {
        true
    }
    /// Stage input
    fn validate_input(&mut self, node: &StageInput) -> bool {
        true
    }
    /// Matrix
    fn validate_matrix(&mut self, node: &Matrix) -> bool {
        true
    }
    /// Matrix axes
    fn validate_axis_container(&mut self, node: &AxisContainer) -> bool {
        true
    }
    /// One axis
    fn validate_axis(&mut self, node: &Axis) -> bool {
        true
    }
    /// Matrix excludes
    fn validate_excludes(&mut self, node: &Excludes) -> bool {
        true
    }
    /// One exclude
    fn validate_exclude(&mut self, node: &Exclude) -> bool {
        true
    }
    /// One axis reference inside an exclude
    fn validate_exclude_axis(&mut self, node: &ExcludeAxis) -> bool {
        true
    }
}

/// Resolves credential ids during validation
pub trait CredentialsLookup: Send + Sync {
    /// Whether a credential with this id is known
    fn exists(&self, id: &str) -> bool;
}

/// Fixed set of known credential ids
#[derive(Debug, Clone, Default)]
pub struct KnownCredentials {
    ids: Vec<String>,
}

impl KnownCredentials {
    /// Creates a lookup over `ids`
    pub fn new(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

impl CredentialsLookup for KnownCredentials {
    fn exists(&self, id: &str) -> bool {
        self.ids.iter().any(|known| known == id)
    }
}

/// Extra information available to contributors
#[derive(Clone, Default)]
pub struct ValidationContext {
    /// Credential resolution, absent outside a live environment
    pub credentials: Option<Arc<dyn CredentialsLookup>>,
}

impl ValidationContext {
    /// Context with a credentials lookup
    pub fn with_credentials(credentials: Arc<dyn CredentialsLookup>) -> Self {
        Self {
            credentials: Some(credentials),
        }
    }
}

impl std::fmt::Debug for ValidationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationContext")
            .field("credentials", &self.credentials.is_some())
            .finish()
    }
}

/// Extension point adding validation rules
///
/// Every method returns an error message for the node, or `None`.
#[allow(unused_variables)]
pub trait ValidatorContributor: Send + Sync {
    /// Root node
    fn validate_pipeline_def(&self, node: &PipelineDef, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// Agent section
    fn validate_agent(&self, node: &Agent, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// A stage list
    fn validate_stages(&self, node: &Stages, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// A single stage
    fn validate_stage(&self, node: &Stage, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// A step list
    fn validate_branch(&self, node: &Branch, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// A step
    fn validate_step(&self, node: &Step, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// Any value
    fn validate_value(&self, node: &Value, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// Environment section
    fn validate_environment(&self, node: &Environment, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// Internal function call
    fn validate_internal_function(
        &self,
        node: &InternalFunctionCall,
        ctx: &ValidationContext,
    ) -> Option<String> {
        None
    }
    /// Tools section
    fn validate_tools(&self, node: &Tools, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// Options section
    fn validate_options(&self, node: &Options, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// One option
    fn validate_option(&self, node: &MethodCall, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// Triggers section
    fn validate_triggers(&self, node: &Triggers, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// One trigger
    fn validate_trigger(&self, node: &MethodCall, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// Parameters section
    fn validate_build_parameters(
        &self,
        node: &BuildParameters,
        ctx: &ValidationContext,
    ) -> Option<String> {
        None
    }
    /// One parameter definition
    fn validate_build_parameter(&self, node: &MethodCall, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// Libraries section
    fn validate_libraries(&self, node: &Libraries, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// Pipeline-level post
    fn validate_post_build(&self, node: &Post, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// Stage-level post
    fn validate_post_stage(&self, node: &Post, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// One post condition
    fn validate_build_condition(&self, node: &BuildCondition, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// When section
    fn validate_when(&self, node: &When, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// One when condition
    fn validate_when_condition(&self, node: &WhenCondition, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// Stage input
    fn validate_input(&self, node: &StageInput, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// Matrix
    fn validate_matrix(&self, node: &Matrix, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// Matrix axes
    fn validate_axis_container(&self, node: &AxisContainer, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// One axis
    fn validate_axis(&self, node: &Axis, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// Matrix excludes
    fn validate_excludes(&self, node: &Excludes, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// One exclude
    fn validate_exclude(&self, node: &Exclude, ctx: &ValidationContext) -> Option<String> {
        None
    }
    /// One exclude axis
    fn validate_exclude_axis(&self, node: &ExcludeAxis, ctx: &ValidationContext) -> Option<String> {
        None
    }
}

static CONTRIBUTORS: Lazy<RwLock<Vec<Arc<dyn ValidatorContributor>>>> =
    Lazy::new(|| RwLock::new(Vec::new()));

/// Registers a contributor for every validator created afterwards
pub fn register_contributor(contributor: Arc<dyn ValidatorContributor>) {
    let mut contributors = CONTRIBUTORS.write();
    contributors.push(contributor);
    tracing::debug!(count = contributors.len(), "registered validator contributor");
}

/// Snapshot of the process-wide contributors, in registration order
pub fn registered_contributors() -> Vec<Arc<dyn ValidatorContributor>> {
    CONTRIBUTORS.read().clone()
}
