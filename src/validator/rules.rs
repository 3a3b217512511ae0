//! Core validation rules

use super::{ModelValidator, ValidationContext, ValidatorContributor, arguments};
use crate::ast::builders::INTERNAL_FUNCTIONS;
use crate::ast::{
    Agent, Arguments, Axis, AxisContainer, Branch, BuildCondition, BuildParameters, Element,
    Environment, EnvironmentValue, Exclude, ExcludeAxis, Excludes, InternalFunctionCall, Libraries,
    Matrix, MethodCall, Options, PipelineDef, Post, SourceLocation, Stage, StageInput, Stages, Step,
    Tools, Triggers, Value, When, WhenCondition,
};
use crate::converter::lowering::SYNTHETIC_STAGES;
use crate::descriptor::{DescriptorKind, DescriptorLookup};
use crate::errors::{ErrorCollector, ErrorKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

/// Steps that may not appear in a declarative steps block, with the reason
pub const BLOCKED_STEPS: &[(&str, &str)] = &[
    ("node", "The node step cannot be used in steps blocks, use agent instead"),
    ("stage", "The stage step cannot be used in Declarative Pipelines"),
    (
        "parallel",
        "The parallel step can only be used as the only top-level step in a steps block",
    ),
    (
        "properties",
        "The properties step cannot be used in Declarative Pipelines, use options instead",
    ),
];

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Reason a step is blocked, if it is
pub fn blocked_reason(name: &str) -> Option<&'static str> {
    BLOCKED_STEPS
        .iter()
        .find(|(blocked, _)| *blocked == name)
        .map(|(_, reason)| *reason)
}

/// Whether `name` can be used as an environment variable
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

fn listing(names: &[String]) -> String {
    format!("[{}]", names.join(", "))
}

/// Names occurring more than once, each reported at its second occurrence
fn duplicates<'n, T>(items: &'n [T], name: impl Fn(&'n T) -> &'n str) -> Vec<&'n T> {
    let mut seen = HashSet::new();
    items.iter().filter(|item| !seen.insert(name(*item))).collect()
}

/// Dispatches a node to every contributor, reporting each message
///
/// Expands to `true` when no contributor objected.
macro_rules! contribute {
    ($validator:ident, $method:ident, $node:expr) => {{
        let mut valid = true;
        for contributor in &$validator.contributors {
            if let Some(message) = contributor.$method($node, &$validator.context) {
                $validator.errors.validation($node, message);
                valid = false;
            }
        }
        valid
    }};
}

/// Validator applying the core rules plus every contributor
pub struct ModelValidatorImpl<'a> {
    errors: &'a mut ErrorCollector,
    lookup: &'a dyn DescriptorLookup,
    contributors: Vec<Arc<dyn ValidatorContributor>>,
    context: ValidationContext,
}

impl<'a> ModelValidatorImpl<'a> {
    /// Creates a validator without contributors or context
    pub fn new(errors: &'a mut ErrorCollector, lookup: &'a dyn DescriptorLookup) -> Self {
        Self {
            errors,
            lookup,
            contributors: Vec::new(),
            context: ValidationContext::default(),
        }
    }

    /// Adds contributors, invoked in the given order
    pub fn with_contributors(
        mut self,
        contributors: impl IntoIterator<Item = Arc<dyn ValidatorContributor>>,
    ) -> Self {
        self.contributors.extend(contributors);
        self
    }

    /// Sets the context passed to contributors and credential checks
    pub fn with_context(mut self, context: ValidationContext) -> Self {
        self.context = context;
        self
    }

    fn fail(&mut self, node: &dyn Element, message: impl Into<String>) -> bool {
        self.errors.validation(node, message);
        false
    }

    fn fail_at(&mut self, location: &SourceLocation, message: impl Into<String>) -> bool {
        self.errors.report(ErrorKind::Validation, location, message);
        false
    }

    fn unknown_message(&self, kind: DescriptorKind, name: &str) -> String {
        let names = listing(&self.lookup.names(kind));
        match kind {
            DescriptorKind::Agent => format!("Invalid agent type \"{name}\" specified. Must be one of {names}"),
            DescriptorKind::WhenCondition => {
                format!("Unknown conditional \"{name}\". Valid conditionals are: {names}")
            }
            DescriptorKind::BuildCondition => {
                format!("Invalid condition \"{name}\". Valid conditions are: {names}")
            }
            DescriptorKind::Parameter => {
                format!("Invalid build parameter type \"{name}\". Valid build parameter types: {names}")
            }
            other => format!("Invalid {other} \"{name}\". Valid {other}s: {names}"),
        }
    }

    /// Resolves a capability and checks its arguments
    fn check_capability(
        &mut self,
        node: &dyn Element,
        kind: DescriptorKind,
        name: &str,
        arguments: &Arguments,
    ) -> bool {
        let Some(descriptor) = self.lookup.lookup(kind, name) else {
            let message = self.unknown_message(kind, name);
            return self.fail(node, message);
        };
        let mut valid = true;
        for problem in arguments::check(&descriptor, arguments) {
            valid = self.fail(node, problem);
        }
        valid
    }

    /// Reports duplicate stage names within one nesting level
    ///
    /// Legacy parallel branch names declared by stages of the level share the
    /// namespace; repeats inside one stage's own branches are left to
    /// [`ModelValidator::validate_stage`].
    fn unique_stage_names(&mut self, stages: &Stages, parallel: bool) -> bool {
        let mut valid = true;
        let mut seen = HashSet::new();
        for stage in &stages.stages {
            if !seen.insert(stage.name.as_str()) {
                let message = if parallel {
                    format!("Duplicate parallel name: \"{}\"", stage.name)
                } else {
                    format!("Duplicate stage name: \"{}\"", stage.name)
                };
                valid = self.fail(stage, message);
            }
        }
        for stage in stages.stages.iter().filter(|s| s.has_legacy_branches()) {
            let mut own = HashSet::new();
            for branch in &stage.branches {
                if own.insert(branch.name.as_str()) && !seen.insert(branch.name.as_str()) {
                    let message = format!("Duplicate stage name: \"{}\"", branch.name);
                    valid = self.fail(branch, message);
                }
            }
        }
        valid
    }

    fn check_credentials_argument(&mut self, node: &InternalFunctionCall) -> bool {
        let Some(Value::Literal { value, .. }) = node.args.first() else {
            return true;
        };
        let id = match value.as_str() {
            Some(id) if !id.trim().is_empty() => id,
            _ => return self.fail(node, "Credentials id must be a non-empty string"),
        };
        if let Some(credentials) = &self.context.credentials
            && !credentials.exists(id)
        {
            let message = format!("Credentials \"{id}\" could not be found");
            return self.fail(node, message);
        }
        true
    }
}

impl ModelValidator for ModelValidatorImpl<'_> {
    fn validate_pipeline_def(&mut self, node: &PipelineDef) -> bool {
        let mut valid = true;
        if node.stages.is_none() {
            valid = self.fail(node, "Missing required section \"stages\"");
        }
        if node.agent.is_none() {
            valid = self.fail(node, "Missing required section \"agent\"");
        }
        if let Some(stages) = &node.stages {
            valid &= self.unique_stage_names(stages, false);
        }
        valid &= contribute!(self, validate_pipeline_def, node);
        valid
    }

    fn validate_agent(&mut self, node: &Agent) -> bool {
        let mut valid = self.check_capability(node, DescriptorKind::Agent, &node.agent_type, &node.arguments);
        valid &= contribute!(self, validate_agent, node);
        valid
    }

    fn validate_stages(&mut self, node: &Stages) -> bool {
        let mut valid = true;
        if node.is_empty() {
            valid = self.fail(node, "No stages specified");
        }
        valid &= contribute!(self, validate_stages, node);
        valid
    }

    fn validate_stage(&mut self, node: &Stage) -> bool {
        let mut valid = true;
        if node.name.trim().is_empty() {
            valid = self.fail(node, "Stage name cannot be empty");
        } else if SYNTHETIC_STAGES.contains(&node.name.as_str()) {
            let message = format!("Stage name \"{}\" is reserved for internal use", node.name);
            valid = self.fail(node, message);
        }

        let kinds = node.body_kinds();
        if kinds.len() > 1 {
            let message = format!(
                "Only one of \"matrix\", \"parallel\", \"stages\", or \"steps\" allowed for stage \"{}\"",
                node.name
            );
            valid = self.fail(node, message);
        } else if kinds.is_empty() {
            let message = format!("Nothing to execute within stage \"{}\"", node.name);
            valid = self.fail(node, message);
        }

        for branch in duplicates(&node.branches, |b| b.name.as_str()) {
            let message = format!("Duplicate parallel name: \"{}\"", branch.name);
            valid = self.fail(branch, message);
        }
        if let Some(parallel) = &node.parallel {
            valid &= self.unique_stage_names(parallel, true);
        }
        if let Some(stages) = &node.stages {
            valid &= self.unique_stage_names(stages, false);
        }

        if node.fail_fast
            && node.parallel.is_none()
            && node.matrix.is_none()
            && !node.has_legacy_branches()
        {
            let message = format!(
                "failFast can only be used with parallel stages or a matrix, stage \"{}\"",
                node.name
            );
            valid = self.fail(node, message);
        }
        valid &= contribute!(self, validate_stage, node);
        valid
    }

    fn validate_branch(&mut self, node: &Branch) -> bool {
        let mut valid = true;
        if node.steps.is_empty() {
            valid = self.fail(node, "No steps specified for branch");
        }
        if SYNTHETIC_STAGES.contains(&node.name.as_str()) {
            let message = format!("Branch name \"{}\" is reserved for internal use", node.name);
            valid = self.fail(node, message);
        }
        valid &= contribute!(self, validate_branch, node);
        valid
    }

    fn validate_step(&mut self, node: &Step) -> bool {
        let mut valid = true;
        if !node.is_script() {
            let name = node.name();
            if let Some(reason) = blocked_reason(name) {
                let message =
                    format!("Invalid step \"{name}\" used - not allowed in this context - {reason}");
                valid = self.fail(node, message);
            } else if let Some(descriptor) = self.lookup.lookup(DescriptorKind::Step, name) {
                if matches!(node, Step::Tree(_)) && !descriptor.takes_block {
                    valid = self.fail(node, format!("Step \"{name}\" does not take a block"));
                }
                if let Some(args) = node.arguments() {
                    for problem in arguments::check(&descriptor, args) {
                        valid = self.fail(node, problem);
                    }
                }
            }
        }
        valid &= contribute!(self, validate_step, node);
        valid
    }

    fn validate_value(&mut self, node: &Value) -> bool {
        contribute!(self, validate_value, node)
    }

    fn validate_environment(&mut self, node: &Environment) -> bool {
        let mut valid = true;
        let mut seen = HashSet::new();
        for entry in &node.entries {
            if !is_valid_identifier(&entry.key) {
                let message = format!("\"{}\" is not a valid environment variable name", entry.key);
                valid = self.fail_at(&entry.location, message);
            }
            if !seen.insert(entry.key.as_str()) {
                let message = format!("Duplicate environment variable name: \"{}\"", entry.key);
                valid = self.fail_at(&entry.location, message);
            }
            if let EnvironmentValue::Value(Value::Expression { text, .. }) = &entry.value
                && text.trim().is_empty()
            {
                let message = format!("No value for environment variable \"{}\"", entry.key);
                valid = self.fail_at(&entry.location, message);
            }
        }
        valid &= contribute!(self, validate_environment, node);
        valid
    }

    fn validate_internal_function(&mut self, node: &InternalFunctionCall) -> bool {
        let mut valid = if !INTERNAL_FUNCTIONS.contains(&node.name.as_str()) {
            let message = format!(
                "Unknown internal function \"{}\". Valid functions: {}",
                node.name,
                INTERNAL_FUNCTIONS.join(", ")
            );
            self.fail(node, message)
        } else if node.args.len() != 1 {
            let message = format!(
                "{}() takes exactly 1 argument but got {}",
                node.name,
                node.args.len()
            );
            self.fail(node, message)
        } else {
            self.check_credentials_argument(node)
        };
        valid &= contribute!(self, validate_internal_function, node);
        valid
    }

    fn validate_tools(&mut self, node: &Tools) -> bool {
        let mut valid = true;
        let mut seen = HashSet::new();
        for tool in &node.tools {
            if self.lookup.lookup(DescriptorKind::Tool, &tool.key).is_none() {
                let message = self.unknown_message(DescriptorKind::Tool, &tool.key);
                valid = self.fail_at(&tool.location, message);
            }
            if !seen.insert(tool.key.as_str()) {
                let message = format!("Duplicate tool type: \"{}\"", tool.key);
                valid = self.fail_at(&tool.location, message);
            }
        }
        valid &= contribute!(self, validate_tools, node);
        valid
    }

    fn validate_options(&mut self, node: &Options) -> bool {
        let mut valid = true;
        for option in duplicates(&node.options, |o| o.name.as_str()) {
            let message = format!("Duplicate option name: \"{}\"", option.name);
            valid = self.fail(option, message);
        }
        if node.in_stage {
            let allowed: Vec<String> = self
                .lookup
                .names(DescriptorKind::Option)
                .into_iter()
                .filter(|name| {
                    self.lookup
                        .lookup(DescriptorKind::Option, name)
                        .is_some_and(|d| d.stage_allowed)
                })
                .collect();
            for option in &node.options {
                let known = self.lookup.lookup(DescriptorKind::Option, &option.name).is_some();
                if known && !allowed.contains(&option.name) {
                    let message = format!(
                        "Invalid option type \"{}\" in a stage. Valid stage option types: {}",
                        option.name,
                        listing(&allowed)
                    );
                    valid = self.fail(option, message);
                }
            }
        }
        valid &= contribute!(self, validate_options, node);
        valid
    }

    fn validate_option(&mut self, node: &MethodCall) -> bool {
        let mut valid = self.check_capability(node, DescriptorKind::Option, &node.name, &node.arguments);
        valid &= contribute!(self, validate_option, node);
        valid
    }

    fn validate_triggers(&mut self, node: &Triggers) -> bool {
        let mut valid = true;
        for trigger in duplicates(&node.triggers, |t| t.name.as_str()) {
            let message = format!("Duplicate trigger name: \"{}\"", trigger.name);
            valid = self.fail(trigger, message);
        }
        valid &= contribute!(self, validate_triggers, node);
        valid
    }

    fn validate_trigger(&mut self, node: &MethodCall) -> bool {
        let mut valid = self.check_capability(node, DescriptorKind::Trigger, &node.name, &node.arguments);
        valid &= contribute!(self, validate_trigger, node);
        valid
    }

    fn validate_build_parameters(&mut self, node: &BuildParameters) -> bool {
        let mut valid = true;
        let mut seen = HashSet::new();
        for parameter in &node.parameters {
            if let Some(name) = parameter.arguments.get("name").and_then(Value::as_str)
                && !seen.insert(name)
            {
                let message = format!("Duplicate build parameter name: \"{name}\"");
                valid = self.fail(parameter, message);
            }
        }
        valid &= contribute!(self, validate_build_parameters, node);
        valid
    }

    fn validate_build_parameter(&mut self, node: &MethodCall) -> bool {
        let mut valid = self.check_capability(node, DescriptorKind::Parameter, &node.name, &node.arguments);
        valid &= contribute!(self, validate_build_parameter, node);
        valid
    }

    fn validate_libraries(&mut self, node: &Libraries) -> bool {
        let mut valid = true;
        if node.libraries.is_empty() {
            valid = self.fail(node, "Empty libraries section");
        }
        valid &= contribute!(self, validate_libraries, node);
        valid
    }

    fn validate_post_build(&mut self, node: &Post) -> bool {
        let mut valid = check_post(self, node);
        valid &= contribute!(self, validate_post_build, node);
        valid
    }

    fn validate_post_stage(&mut self, node: &Post) -> bool {
        let mut valid = check_post(self, node);
        valid &= contribute!(self, validate_post_stage, node);
        valid
    }

    fn validate_build_condition(&mut self, node: &BuildCondition) -> bool {
        let names = self.lookup.names(DescriptorKind::BuildCondition);
        let matches = names
            .iter()
            .filter(|name| name.eq_ignore_ascii_case(&node.condition))
            .count();
        let mut valid = true;
        if matches != 1 {
            let message = self.unknown_message(DescriptorKind::BuildCondition, &node.condition);
            valid = self.fail(node, message);
        }
        valid &= contribute!(self, validate_build_condition, node);
        valid
    }

    fn validate_when(&mut self, node: &When) -> bool {
        let mut valid = true;
        if node.conditions.is_empty() {
            valid = self.fail(node, "Empty when section. Remove the section or add a condition");
        }
        valid &= contribute!(self, validate_when, node);
        valid
    }

    fn validate_when_condition(&mut self, node: &WhenCondition) -> bool {
        let mut valid = match node {
            WhenCondition::Leaf { name, arguments, .. } => {
                self.check_capability(node, DescriptorKind::WhenCondition, name, arguments)
            }
            WhenCondition::Expression { .. } => true,
            WhenCondition::Composite { name, children, .. } => match name.as_str() {
                "not" if children.len() != 1 => {
                    self.fail(node, "Nested when condition \"not\" requires exactly one child condition")
                }
                "allOf" | "anyOf" if children.is_empty() => {
                    let message =
                        format!("Nested when condition \"{name}\" requires at least one child condition");
                    self.fail(node, message)
                }
                "not" | "allOf" | "anyOf" => true,
                other => {
                    let message = self.unknown_message(DescriptorKind::WhenCondition, other);
                    self.fail(node, message)
                }
            },
        };
        valid &= contribute!(self, validate_when_condition, node);
        valid
    }

    fn validate_input(&mut self, node: &StageInput) -> bool {
        let mut valid = true;
        if node.message.as_str().is_some_and(|m| m.trim().is_empty()) {
            valid = self.fail(node, "Input message cannot be empty");
        }
        valid &= contribute!(self, validate_input, node);
        valid
    }

    fn validate_matrix(&mut self, node: &Matrix) -> bool {
        let mut valid = self.unique_stage_names(&node.stages, false);
        if let Some(excludes) = &node.excludes {
            for exclude in &excludes.excludes {
                for reference in &exclude.axes {
                    let Some(axis) = node.axes.get(&reference.name) else {
                        let message = format!(
                            "Exclude axis name \"{}\" is not one of the declared axes",
                            reference.name
                        );
                        valid = self.fail(reference, message);
                        continue;
                    };
                    let declared: Vec<String> = axis.values.iter().map(Value::raw).collect();
                    for value in &reference.values {
                        let raw = value.raw();
                        if !declared.contains(&raw) {
                            let message = format!(
                                "Exclude axis \"{}\" value \"{raw}\" is not one of the declared values",
                                reference.name
                            );
                            valid = self.fail(value, message);
                        }
                    }
                }
            }
        }
        valid &= contribute!(self, validate_matrix, node);
        valid
    }

    fn validate_axis_container(&mut self, node: &AxisContainer) -> bool {
        let mut valid = true;
        if node.axes.is_empty() {
            valid = self.fail(node, "Matrix must declare at least one axis");
        }
        for axis in duplicates(&node.axes, |a| a.name.as_str()) {
            let message = format!("Duplicate matrix axis name: \"{}\"", axis.name);
            valid = self.fail(axis, message);
        }
        valid &= contribute!(self, validate_axis_container, node);
        valid
    }

    fn validate_axis(&mut self, node: &Axis) -> bool {
        let mut valid = true;
        if !is_valid_identifier(&node.name) {
            let message = format!("Axis name \"{}\" is not a valid environment variable name", node.name);
            valid = self.fail(node, message);
        }
        if node.values.is_empty() {
            let message = format!("Axis \"{}\" must declare at least one value", node.name);
            valid = self.fail(node, message);
        }
        let mut seen = HashSet::new();
        for value in &node.values {
            let Some(text) = value.as_str() else {
                let message = format!("Axis \"{}\" values must be literal strings", node.name);
                valid = self.fail(value, message);
                continue;
            };
            if !seen.insert(text) {
                let message = format!("Duplicate value \"{text}\" for axis \"{}\"", node.name);
                valid = self.fail(value, message);
            }
        }
        valid &= contribute!(self, validate_axis, node);
        valid
    }

    fn validate_excludes(&mut self, node: &Excludes) -> bool {
        let mut valid = true;
        if node.excludes.is_empty() {
            valid = self.fail(node, "Excludes must contain at least one exclude");
        }
        valid &= contribute!(self, validate_excludes, node);
        valid
    }

    fn validate_exclude(&mut self, node: &Exclude) -> bool {
        let mut valid = true;
        if node.axes.is_empty() {
            valid = self.fail(node, "Exclude must reference at least one axis");
        }
        valid &= contribute!(self, validate_exclude, node);
        valid
    }

    fn validate_exclude_axis(&mut self, node: &ExcludeAxis) -> bool {
        let mut valid = true;
        if node.values.is_empty() {
            let message = format!("Exclude axis \"{}\" must list at least one value", node.name);
            valid = self.fail(node, message);
        }
        valid &= contribute!(self, validate_exclude_axis, node);
        valid
    }
}

fn check_post(validator: &mut ModelValidatorImpl<'_>, node: &Post) -> bool {
    let mut valid = true;
    if node.conditions.is_empty() {
        valid = validator.fail(node, "post can not be empty");
    }
    let mut seen = HashSet::new();
    for condition in &node.conditions {
        if !seen.insert(condition.condition.to_ascii_lowercase()) {
            let message = format!("Duplicate build condition name: \"{}\"", condition.condition);
            valid = validator.fail(condition, message);
        }
    }
    valid
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;
