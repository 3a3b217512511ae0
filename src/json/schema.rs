//! Embedded JSON Schema for the pipeline document

use crate::ast::SourceLocation;
use crate::errors::ErrorCollector;
use jsonschema::{Draft, JSONSchema};
use once_cell::sync::Lazy;

/// Schema text shipped with the crate
pub const SCHEMA: &str = include_str!("../../resources/pipeline.schema.json");

/// Packaged path of [`SCHEMA`]
pub const SCHEMA_RESOURCE: &str = "resources/pipeline.schema.json";

static DOCUMENT: Lazy<Result<serde_json::Value, String>> = Lazy::new(|| {
    serde_json::from_str(SCHEMA).map_err(|e| format!("embedded schema json parse failed: {e}"))
});

/// Step-list document sharing the pipeline definitions
static STEPS_DOCUMENT: Lazy<Result<serde_json::Value, String>> = Lazy::new(|| {
    let document = DOCUMENT.as_ref().map_err(Clone::clone)?;
    Ok(serde_json::json!({
        "$schema": document["$schema"],
        "definitions": document["definitions"],
        "type": "array",
        "items": {"$ref": "#/definitions/step"},
    }))
});

static COMPILED: Lazy<Result<JSONSchema, String>> = Lazy::new(|| compile(&DOCUMENT));

static STEPS_COMPILED: Lazy<Result<JSONSchema, String>> = Lazy::new(|| compile(&STEPS_DOCUMENT));

fn compile(document: &'static Result<serde_json::Value, String>) -> Result<JSONSchema, String> {
    let document = document.as_ref().map_err(Clone::clone)?;
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(document)
        .map_err(|e| format!("schema compile failed: {e}"))
}

/// Parsed schema document
///
/// # Errors
///
/// Returns a message if the embedded schema is not valid JSON.
pub fn document() -> Result<&'static serde_json::Value, String> {
    DOCUMENT.as_ref().map_err(Clone::clone)
}

/// Checks `instance` against the schema, reporting each violation
///
/// Returns `true` when the instance conforms.
pub fn check(instance: &serde_json::Value, errors: &mut ErrorCollector) -> bool {
    check_with(&COMPILED, instance, errors)
}

/// Checks a bare step array against the step definitions
pub fn check_steps(instance: &serde_json::Value, errors: &mut ErrorCollector) -> bool {
    check_with(&STEPS_COMPILED, instance, errors)
}

fn check_with(
    schema: &'static Result<JSONSchema, String>,
    instance: &serde_json::Value,
    errors: &mut ErrorCollector,
) -> bool {
    let compiled = match schema.as_ref() {
        Ok(compiled) => compiled,
        Err(message) => {
            errors.schema(&SourceLocation::Unknown, message.clone());
            return false;
        }
    };
    let Err(violations) = compiled.validate(instance) else {
        return true;
    };
    let before = errors.error_count();
    for violation in violations {
        let pointer = violation.instance_path.to_string();
        errors.schema(&SourceLocation::json(pointer), violation.to_string());
    }
    tracing::debug!(violations = errors.error_count() - before, "schema check failed");
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_parses_and_compiles() {
        assert!(document().is_ok());
        assert!(COMPILED.is_ok());
        assert!(STEPS_COMPILED.is_ok());
    }

    #[test]
    fn test_step_array_checked() {
        let mut errors = ErrorCollector::new();
        let steps = json!([{"name": "sh", "arguments": {"isLiteral": true, "value": "make"}}]);
        assert!(check_steps(&steps, &mut errors));
        assert!(!check_steps(&json!([{"arguments": []}]), &mut errors));
        assert_eq!(errors.error_count(), 1);
    }

    #[test]
    fn test_minimal_document_conforms() {
        let doc = json!({"pipeline": {
            "agent": {"type": "any"},
            "stages": [{
                "name": "Build",
                "branches": [{"name": "default", "steps": [
                    {"name": "echo", "arguments": {"isLiteral": true, "value": "hi"}}
                ]}]
            }]
        }});
        let mut errors = ErrorCollector::new();
        assert!(check(&doc, &mut errors));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_missing_stages_reported_with_pointer() {
        let doc = json!({"pipeline": {"agent": {"type": "any"}}});
        let mut errors = ErrorCollector::new();
        assert!(!check(&doc, &mut errors));
        let diagnostic = &errors.diagnostics()[0];
        assert_eq!(diagnostic.location.to_string(), "/pipeline");
        assert!(diagnostic.message.contains("stages"));
    }

    #[test]
    fn test_unknown_stage_key_rejected() {
        let doc = json!({"pipeline": {
            "agent": {"type": "any"},
            "stages": [{"name": "A", "colour": "red"}]
        }});
        let mut errors = ErrorCollector::new();
        assert!(!check(&doc, &mut errors));
    }
}
