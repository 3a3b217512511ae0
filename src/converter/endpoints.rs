//! Conversion endpoints over a request parameter map
//!
//! Every endpoint answers `{"result": "success", ...}` or
//! `{"result": "failure", "errors": [...]}`.

use super::{Conversion, Converter};
use crate::errors::{BoundaryError, Diagnostic, diagnostics_to_json};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Request parameters by name
pub type Params = BTreeMap<String, String>;

/// Script text parameter
pub const JENKINSFILE_PARAM: &str = "jenkinsfile";
/// JSON text parameter
pub const JSON_PARAM: &str = "json";

/// Endpoint names accepted by [`dispatch`]
pub const ENDPOINTS: &[&str] = &[
    "toJson",
    "toJenkinsfile",
    "validateJenkinsfile",
    "validateJson",
    "stepsToJson",
    "stepsToJenkinsfile",
    "schema",
];

fn success(payload: Option<(&str, Value)>) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("result".to_string(), json!("success"));
    if let Some((key, value)) = payload {
        obj.insert(key.to_string(), value);
    }
    Value::Object(obj)
}

/// Failure result listing `errors`
pub fn failure(errors: &[Diagnostic]) -> Value {
    json!({"result": "failure", "errors": diagnostics_to_json(errors)})
}

fn respond<T>(conversion: Conversion<T>, payload: impl FnOnce(T) -> Option<(&'static str, Value)>) -> Value {
    match conversion {
        Conversion::Success(value) => success(payload(value)),
        Conversion::Failure(errors) => failure(&errors),
    }
}

fn param<'p>(params: &'p Params, name: &str) -> Result<&'p str, Value> {
    match params.get(name) {
        Some(value) if !value.trim().is_empty() => Ok(value.as_str()),
        _ => {
            tracing::debug!(parameter = name, "missing endpoint parameter");
            Err(failure(&[BoundaryError::MissingParameter(name.to_string()).to_diagnostic()]))
        }
    }
}

/// Script text to pipeline JSON
pub fn to_json(converter: &Converter, params: &Params) -> Value {
    let text = match param(params, JENKINSFILE_PARAM) {
        Ok(text) => text,
        Err(response) => return response,
    };
    respond(converter.script_to_model(text), |def| {
        Some(("json", converter.model_to_json(&def)))
    })
}

/// Pipeline JSON to script text
pub fn to_jenkinsfile(converter: &Converter, params: &Params) -> Value {
    let text = match param(params, JSON_PARAM) {
        Ok(text) => text,
        Err(response) => return response,
    };
    respond(converter.json_to_model(text), |def| {
        Some(("jenkinsfile", json!(converter.model_to_script(&def))))
    })
}

/// Validates script text
pub fn validate_jenkinsfile(converter: &Converter, params: &Params) -> Value {
    let text = match param(params, JENKINSFILE_PARAM) {
        Ok(text) => text,
        Err(response) => return response,
    };
    respond(converter.script_to_model(text), |_| None)
}

/// Validates pipeline JSON
pub fn validate_json(converter: &Converter, params: &Params) -> Value {
    let text = match param(params, JSON_PARAM) {
        Ok(text) => text,
        Err(response) => return response,
    };
    respond(converter.json_to_model(text), |_| None)
}

/// Script step list to a JSON step array
pub fn steps_to_json(converter: &Converter, params: &Params) -> Value {
    let text = match param(params, JENKINSFILE_PARAM) {
        Ok(text) => text,
        Err(response) => return response,
    };
    respond(converter.script_to_steps(text), |steps| {
        Some(("json", converter.steps_to_json(&steps)))
    })
}

/// JSON step array to script text
pub fn steps_to_jenkinsfile(converter: &Converter, params: &Params) -> Value {
    let text = match param(params, JSON_PARAM) {
        Ok(text) => text,
        Err(response) => return response,
    };
    respond(converter.json_to_steps(text), |steps| {
        Some(("jenkinsfile", json!(converter.steps_to_script(&steps))))
    })
}

/// The embedded pipeline schema
pub fn schema() -> Value {
    match crate::json::schema::document() {
        Ok(document) => success(Some(("schema", document.clone()))),
        Err(message) => failure(&[Diagnostic::new(
            crate::errors::ErrorKind::Schema,
            message,
            crate::ast::SourceLocation::Unknown,
        )]),
    }
}

/// Routes an endpoint by name; `None` for unknown names
pub fn dispatch(name: &str, converter: &Converter, params: &Params) -> Option<Value> {
    let response = match name {
        "toJson" => to_json(converter, params),
        "toJenkinsfile" => to_jenkinsfile(converter, params),
        "validateJenkinsfile" => validate_jenkinsfile(converter, params),
        "validateJson" => validate_json(converter, params),
        "stepsToJson" => steps_to_json(converter, params),
        "stepsToJenkinsfile" => steps_to_jenkinsfile(converter, params),
        "schema" => schema(),
        _ => return None,
    };
    tracing::debug!(endpoint = name, result = %response["result"], "endpoint handled");
    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    const MINIMAL: &str = "pipeline { agent none; stages { stage('a') { steps { echo 'hi' } } } }";

    #[test]
    fn test_to_json_success() {
        let response = to_json(&Converter::default(), &params(&[("jenkinsfile", MINIMAL)]));
        assert_eq!(response["result"], "success");
        assert_eq!(response["json"]["pipeline"]["stages"][0]["name"], "a");
    }

    #[test]
    fn test_missing_parameter() {
        let response = to_json(&Converter::default(), &Params::new());
        assert_eq!(
            response,
            json!({"result": "failure", "errors": [{"error": "No content found for parameter 'jenkinsfile'"}]})
        );
    }

    #[test]
    fn test_unparsable_json_is_single_error() {
        let response = to_jenkinsfile(&Converter::default(), &params(&[("json", "{nope")]));
        assert_eq!(response["result"], "failure");
        assert_eq!(response["errors"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_validate_jenkinsfile_failure_has_locations() {
        let response = validate_jenkinsfile(
            &Converter::default(),
            &params(&[("jenkinsfile", "pipeline {\n  agent any\n}")]),
        );
        assert_eq!(response["result"], "failure");
        assert_eq!(response["errors"][0]["error"], "Missing required section \"stages\"");
        assert!(response["errors"][0].get("location").is_some());
    }

    #[test]
    fn test_json_round_trip_through_endpoints() {
        let converter = Converter::default();
        let json = to_json(&converter, &params(&[("jenkinsfile", MINIMAL)]));
        let text = to_jenkinsfile(&converter, &params(&[("json", json["json"].to_string().as_str())]));
        assert_eq!(text["result"], "success");
        let again = to_json(&converter, &params(&[("jenkinsfile", text["jenkinsfile"].as_str().unwrap())]));
        assert_eq!(again["json"], json["json"]);
        assert_eq!(validate_json(&converter, &params(&[("json", json["json"].to_string().as_str())]))["result"], "success");
    }

    #[test]
    fn test_steps_endpoints() {
        let converter = Converter::default();
        let json = steps_to_json(&converter, &params(&[("jenkinsfile", "echo 'a'\nsh 'make'")]));
        assert_eq!(json["result"], "success");
        assert_eq!(json["json"][1]["name"], "sh");
        let text = steps_to_jenkinsfile(&converter, &params(&[("json", json["json"].to_string().as_str())]));
        assert_eq!(text["jenkinsfile"], "echo('a')\nsh('make')\n");
    }

    #[test]
    fn test_schema_and_dispatch() {
        let response = dispatch("schema", &Converter::default(), &Params::new()).unwrap();
        assert_eq!(response["result"], "success");
        assert_eq!(response["schema"]["required"], json!(["pipeline"]));
        assert!(dispatch("toYaml", &Converter::default(), &Params::new()).is_none());
        assert_eq!(ENDPOINTS.len(), 7);
    }
}
