//! Node builders shared by the script and JSON front-ends
//!
//! Both front-ends funnel the pieces they recognise through these functions,
//! so equivalent inputs produce structurally identical models.

use super::environment::{EnvironmentEntry, InternalFunctionCall};
use super::location::SourceLocation;
use super::stage::StageInput;
use super::steps::{SCRIPT_BLOCK_KEY, SCRIPT_STEP, Step};
use super::text::dedent;
use super::value::{Arguments, Value};
use super::when::{COMPOSITE_CONDITIONS, EXPRESSION_CONDITION, WhenCondition};

/// Functions callable on the right-hand side of an environment entry
pub const INTERNAL_FUNCTIONS: &[&str] = &["credentials"];

/// Keys accepted inside `input { ... }`
pub const INPUT_FIELDS: &[&str] = &["message", "id", "ok", "submitter", "submitterParameter"];

/// Builds an opaque script block from raw block text
pub fn script_block(raw: &str, location: SourceLocation) -> Step {
    Step::script(dedent(raw)).at(location)
}

/// Extracts the block text from `scriptBlock: '...'` arguments
fn script_block_argument(arguments: &Arguments) -> Option<&str> {
    match arguments {
        Arguments::Named(args) if args.len() == 1 && args[0].key == SCRIPT_BLOCK_KEY => {
            args[0].value.as_str()
        }
        _ => None,
    }
}

/// Builds a step from a call
///
/// `script` with a `scriptBlock` argument becomes an opaque block, a call with
/// children becomes a tree step, anything else a plain step.
pub fn step(
    name: &str,
    arguments: Arguments,
    children: Option<Vec<Step>>,
    location: SourceLocation,
) -> Step {
    if name == SCRIPT_STEP
        && children.is_none()
        && let Some(text) = script_block_argument(&arguments)
    {
        return script_block(text, location);
    }
    match children {
        Some(children) => Step::tree(name, arguments, children).at(location),
        None => Step::call(name, arguments).at(location),
    }
}

/// Builds a when condition from its name, arguments and nested conditions
pub fn when_condition(
    name: &str,
    arguments: Arguments,
    children: Option<Vec<WhenCondition>>,
    location: SourceLocation,
) -> WhenCondition {
    if name == EXPRESSION_CONDITION
        && let Some(text) = script_block_argument(&arguments)
    {
        return expression_condition(text, location);
    }
    if COMPOSITE_CONDITIONS.contains(&name) || children.is_some() {
        return WhenCondition::composite(name, children.unwrap_or_default()).at(location);
    }
    WhenCondition::leaf(name, arguments).at(location)
}

/// Builds an `expression { ... }` condition from raw block text
pub fn expression_condition(raw: &str, location: SourceLocation) -> WhenCondition {
    WhenCondition::expression(dedent(raw)).at(location)
}

/// Builds an environment entry holding a value
pub fn environment_value(key: &str, value: Value, location: SourceLocation) -> EnvironmentEntry {
    EnvironmentEntry::new(key, value).at(location)
}

/// Builds an environment entry holding an internal function call
pub fn environment_function(
    key: &str,
    function: &str,
    args: Vec<Value>,
    location: SourceLocation,
) -> EnvironmentEntry {
    let call = InternalFunctionCall::new(function, args).at(location.clone());
    EnvironmentEntry::function(key, call).at(location)
}

/// Applies one `key value` field to a stage input
///
/// # Errors
///
/// Returns a diagnostic message if the key is not an input field.
pub fn input_field(input: &mut StageInput, key: &str, value: Value) -> Result<(), String> {
    match key {
        "message" => input.message = value,
        "id" => input.id = Some(value),
        "ok" => input.ok = Some(value),
        "submitter" => input.submitter = Some(value),
        "submitterParameter" => input.submitter_parameter = Some(value),
        other => {
            return Err(format!(
                "Invalid option \"{other}\" for input. Valid options are {}",
                INPUT_FIELDS.join(", ")
            ));
        }
    }
    Ok(())
}
