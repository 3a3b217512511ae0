//! JSON front-end
//!
//! Checks the document against the embedded schema, then walks it into the
//! same model the script front-end produces.

pub mod parser;
pub mod schema;

use crate::ast::{PipelineDef, Step};
use crate::errors::{BoundaryError, ErrorCollector};
use parser::JsonParser;

fn document(text: &str, errors: &mut ErrorCollector) -> Option<serde_json::Value> {
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(err) => {
            errors.push(BoundaryError::InvalidJson(err.to_string()).to_diagnostic());
            None
        }
    }
}

/// Parses JSON pipeline text
pub fn parse(text: &str, errors: &mut ErrorCollector) -> Option<PipelineDef> {
    let value = document(text, errors)?;
    parse_value(&value, errors)
}

/// Parses an already-decoded JSON pipeline document
///
/// Schema violations stop the conversion before the walk.
pub fn parse_value(value: &serde_json::Value, errors: &mut ErrorCollector) -> Option<PipelineDef> {
    if !schema::check(value, errors) {
        return None;
    }
    JsonParser::new(errors).parse_document(value)
}

/// Parses JSON text holding a bare step array
pub fn parse_steps(text: &str, errors: &mut ErrorCollector) -> Option<Vec<Step>> {
    let value = document(text, errors)?;
    parse_steps_value(&value, errors)
}

/// Parses a decoded step array
pub fn parse_steps_value(value: &serde_json::Value, errors: &mut ErrorCollector) -> Option<Vec<Step>> {
    if !schema::check_steps(value, errors) {
        return None;
    }
    Some(JsonParser::new(errors).parse_step_list(value, ""))
}
