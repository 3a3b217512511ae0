//! Conversions between script text, JSON and the model
//!
//! [`Converter`] bundles everything a conversion needs: the descriptor
//! lookup, validator contributors, step rewriters and an optional credentials
//! lookup. Every conversion parses, then validates, and reports problems as
//! [`Conversion::Failure`]; nothing here panics on bad input.

pub mod endpoints;
pub mod lowering;

pub use lowering::{ExecutionNode, ExecutionPlan, Lowering, StepRewriter};

use crate::ast::steps::{steps_to_json, steps_to_text};
use crate::ast::{Element, PipelineDef, Step};
use crate::descriptor::{DescriptorCache, DescriptorLookup};
use crate::errors::{Diagnostic, ErrorCollector};
use crate::validator::{
    CredentialsLookup, ModelValidatorImpl, ValidationContext, ValidatorContributor,
};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Outcome of a conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversion<T> {
    /// Converted value
    Success(T),
    /// Every problem found, in discovery order
    Failure(Vec<Diagnostic>),
}

impl<T> Conversion<T> {
    /// Success when nothing was collected
    pub fn from_collector(value: Option<T>, errors: ErrorCollector) -> Self {
        match value {
            Some(value) if errors.is_empty() => Self::Success(value),
            _ => Self::Failure(errors.into_diagnostics()),
        }
    }

    /// Returns true on success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Converted value, if any
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// Reported problems; empty on success
    pub fn errors(&self) -> &[Diagnostic] {
        match self {
            Self::Success(_) => &[],
            Self::Failure(errors) => errors,
        }
    }

    /// Maps the converted value
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Conversion<U> {
        match self {
            Self::Success(value) => Conversion::Success(f(value)),
            Self::Failure(errors) => Conversion::Failure(errors),
        }
    }

    /// Chains a fallible step on success
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Conversion<U>) -> Conversion<U> {
        match self {
            Self::Success(value) => f(value),
            Self::Failure(errors) => Conversion::Failure(errors),
        }
    }
}

/// Entry point for every conversion
#[derive(Clone)]
pub struct Converter {
    lookup: Arc<dyn DescriptorLookup>,
    contributors: Vec<Arc<dyn ValidatorContributor>>,
    rewriters: Vec<Arc<dyn StepRewriter>>,
    credentials: Option<Arc<dyn CredentialsLookup>>,
}

impl Default for Converter {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("contributors", &self.contributors.len())
            .field("rewriters", &self.rewriters.len())
            .field("credentials", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}

impl Converter {
    /// Starts a builder over the built-in catalog
    pub fn builder() -> ConverterBuilder {
        ConverterBuilder::default()
    }

    /// Descriptor lookup used for validation and lowering
    pub fn lookup(&self) -> &dyn DescriptorLookup {
        self.lookup.as_ref()
    }

    fn context(&self) -> ValidationContext {
        ValidationContext {
            credentials: self.credentials.clone(),
        }
    }

    fn validate_into(&self, element: &dyn Element, errors: &mut ErrorCollector) {
        let mut validator = ModelValidatorImpl::new(errors, self.lookup.as_ref())
            .with_context(self.context())
            .with_contributors(self.contributors.iter().cloned());
        element.validate(&mut validator);
    }

    /// Parses and validates script text
    pub fn script_to_model(&self, text: &str) -> Conversion<PipelineDef> {
        let mut errors = ErrorCollector::new();
        let def = crate::script::parse(text, &mut errors);
        self.checked(def, errors)
    }

    /// Canonical script text of a model
    pub fn model_to_script(&self, def: &PipelineDef) -> String {
        def.to_canonical_text()
    }

    /// Parses and validates JSON text
    pub fn json_to_model(&self, text: &str) -> Conversion<PipelineDef> {
        let mut errors = ErrorCollector::new();
        let def = crate::json::parse(text, &mut errors);
        self.checked(def, errors)
    }

    /// Checks and validates an already decoded JSON document
    pub fn json_value_to_model(&self, value: &serde_json::Value) -> Conversion<PipelineDef> {
        let mut errors = ErrorCollector::new();
        let def = crate::json::parse_value(value, &mut errors);
        self.checked(def, errors)
    }

    /// Schema-conformant JSON of a model
    pub fn model_to_json(&self, def: &PipelineDef) -> serde_json::Value {
        def.to_json()
    }

    /// Validates a model, returning every problem found
    pub fn validate_model(&self, def: &PipelineDef) -> Vec<Diagnostic> {
        let mut errors = ErrorCollector::new();
        self.validate_into(def, &mut errors);
        debug!(errors = errors.error_count(), "validated pipeline model");
        errors.into_diagnostics()
    }

    fn checked(&self, def: Option<PipelineDef>, mut errors: ErrorCollector) -> Conversion<PipelineDef> {
        if let Some(def) = &def
            && errors.is_empty()
        {
            self.validate_into(def, &mut errors);
        }
        debug!(
            stages = def.as_ref().map_or(0, PipelineDef::stage_count),
            errors = errors.error_count(),
            "converted pipeline"
        );
        Conversion::from_collector(def, errors)
    }

    fn checked_steps(&self, steps: Option<Vec<Step>>, mut errors: ErrorCollector) -> Conversion<Vec<Step>> {
        if let Some(steps) = &steps
            && errors.is_empty()
        {
            for step in steps {
                self.validate_into(step, &mut errors);
            }
        }
        debug!(errors = errors.error_count(), "converted step list");
        Conversion::from_collector(steps, errors)
    }

    /// Parses and validates a bare step list in script form
    pub fn script_to_steps(&self, text: &str) -> Conversion<Vec<Step>> {
        let mut errors = ErrorCollector::new();
        let steps = crate::script::parse_steps(text, &mut errors);
        self.checked_steps(steps, errors)
    }

    /// Canonical script text of a step list
    pub fn steps_to_script(&self, steps: &[Step]) -> String {
        steps_to_text(steps)
    }

    /// Parses and validates a bare step array in JSON form
    pub fn json_to_steps(&self, text: &str) -> Conversion<Vec<Step>> {
        let mut errors = ErrorCollector::new();
        let steps = crate::json::parse_steps(text, &mut errors);
        self.checked_steps(steps, errors)
    }

    /// JSON array of a step list
    pub fn steps_to_json(&self, steps: &[Step]) -> serde_json::Value {
        steps_to_json(steps)
    }

    /// Validates and lowers a model into an execution plan
    pub fn lower(&self, def: &PipelineDef) -> Conversion<ExecutionPlan> {
        let mut errors = ErrorCollector::new();
        self.validate_into(def, &mut errors);
        if !errors.is_empty() {
            return Conversion::Failure(errors.into_diagnostics());
        }
        let plan = Lowering::new(self.lookup.as_ref(), &self.rewriters, &mut errors).lower(def);
        debug!(
            stages = plan.as_ref().map_or(0, |p| p.stages.len()),
            errors = errors.error_count(),
            "lowered pipeline"
        );
        Conversion::from_collector(plan, errors)
    }

    /// Parses script text straight into an execution plan
    pub fn script_to_plan(&self, text: &str) -> Conversion<ExecutionPlan> {
        self.script_to_model(text).and_then(|def| self.lower(&def))
    }
}

/// Builder for [`Converter`]
#[derive(Default)]
pub struct ConverterBuilder {
    lookup: Option<Arc<dyn DescriptorLookup>>,
    contributors: Vec<Arc<dyn ValidatorContributor>>,
    rewriters: Vec<Arc<dyn StepRewriter>>,
    credentials: Option<Arc<dyn CredentialsLookup>>,
}

impl ConverterBuilder {
    /// Uses `lookup` instead of the built-in catalog
    #[must_use]
    pub fn lookup(mut self, lookup: Arc<dyn DescriptorLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Adds a validator contributor
    #[must_use]
    pub fn contributor(mut self, contributor: Arc<dyn ValidatorContributor>) -> Self {
        self.contributors.push(contributor);
        self
    }

    /// Adds a step rewriter
    #[must_use]
    pub fn rewriter(mut self, rewriter: Arc<dyn StepRewriter>) -> Self {
        self.rewriters.push(rewriter);
        self
    }

    /// Resolves credential references against `credentials`
    #[must_use]
    pub fn credentials(mut self, credentials: Arc<dyn CredentialsLookup>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Appends the process-wide contributors and rewriters
    #[must_use]
    pub fn with_registered(mut self) -> Self {
        self.contributors.extend(crate::validator::registered_contributors());
        self.rewriters.extend(lowering::registered_rewriters());
        self
    }

    /// Builds the converter
    #[must_use]
    pub fn build(self) -> Converter {
        Converter {
            lookup: self
                .lookup
                .unwrap_or_else(|| Arc::new(DescriptorCache::builtin())),
            contributors: self.contributors,
            rewriters: self.rewriters,
            credentials: self.credentials,
        }
    }
}

#[cfg(test)]
#[path = "roundtrip_tests.rs"]
mod roundtrip_tests;
