use super::*;
use crate::ast::{Element, EnvironmentValue};
use crate::errors::ErrorKind;
use pretty_assertions::assert_eq;
use serde_json::json;

fn walk(document: &Json) -> (Option<PipelineDef>, ErrorCollector) {
    let mut errors = ErrorCollector::new();
    let def = crate::json::parse_value(document, &mut errors);
    (def, errors)
}

#[test]
fn test_pointer_escaping() {
    assert_eq!(pointer_key("/a", "b/c~d"), "/a/b~1c~0d");
    assert_eq!(pointer_index("/stages", 2), "/stages/2");
}

#[test]
fn test_minimal_document() {
    let (def, errors) = walk(&json!({"pipeline": {
        "agent": {"type": "any"},
        "stages": [{
            "name": "Build",
            "branches": [{"name": "default", "steps": [
                {"name": "echo", "arguments": [{"key": "message", "value": {"isLiteral": true, "value": "hi"}}]}
            ]}]
        }]
    }}));
    assert!(errors.is_empty());
    let def = def.unwrap();
    let stage = &def.stage_list()[0];
    assert_eq!(stage.name, "Build");
    assert_eq!(stage.location().to_string(), "/pipeline/stages/0");
    let step = &stage.branches[0].steps[0];
    assert_eq!(step.location().to_string(), "/pipeline/stages/0/branches/0/steps/0");
    assert_eq!(
        step.arguments().and_then(|a| a.get("message")).and_then(Value::as_str),
        Some("hi")
    );
}

#[test]
fn test_schema_failure_stops_walk() {
    let (def, errors) = walk(&json!({"pipeline": {"agent": {"type": "any"}, "stages": [{"title": "x"}]}}));
    assert!(def.is_none());
    assert!(errors.diagnostics().iter().all(|d| d.kind == ErrorKind::Schema));
}

#[test]
fn test_malformed_json_is_boundary_error() {
    let mut errors = ErrorCollector::new();
    assert!(crate::json::parse("{\"pipeline\": ", &mut errors).is_none());
    assert_eq!(errors.diagnostics()[0].kind, ErrorKind::Boundary);
    assert!(errors.diagnostics()[0].message.starts_with("Unable to parse JSON"));
}

#[test]
fn test_script_block_and_expression() {
    let (def, errors) = walk(&json!({"pipeline": {
        "agent": {"type": "none"},
        "stages": [{
            "name": "A",
            "when": {"conditions": [{"name": "expression", "arguments": [
                {"key": "scriptBlock", "value": {"isLiteral": true, "value": "return true"}}
            ]}], "beforeAgent": true},
            "branches": [{"name": "default", "steps": [
                {"name": "script", "arguments": [
                    {"key": "scriptBlock", "value": {"isLiteral": true, "value": "def x = 1"}}
                ]}
            ]}]
        }]
    }}));
    assert!(errors.is_empty(), "{:?}", errors.errors_as_strings());
    let def = def.unwrap();
    let stage = &def.stage_list()[0];
    assert!(stage.branches[0].steps[0].is_script());
    let when = stage.when.as_ref().unwrap();
    assert!(when.before_agent);
    assert!(matches!(when.conditions[0], WhenCondition::Expression { .. }));
}

#[test]
fn test_environment_internal_function() {
    let (def, errors) = walk(&json!({"pipeline": {
        "agent": {"type": "any"},
        "environment": [
            {"key": "A", "value": {"isLiteral": true, "value": 1}},
            {"key": "B", "value": {"internalFunction": "credentials", "arguments": [
                {"isLiteral": true, "value": "secret-id"}
            ]}}
        ],
        "stages": []
    }}));
    assert!(errors.is_empty());
    let def = def.unwrap();
    let env = def.environment.as_ref().unwrap();
    assert!(matches!(env.get("B"), Some(EnvironmentValue::Function(_))));
    assert_eq!(env.entries[1].location.to_string(), "/pipeline/environment/1");
}

#[test]
fn test_input_with_message_only() {
    let (def, errors) = walk(&json!({"pipeline": {
        "agent": {"type": "any"},
        "stages": [{
            "name": "A",
            "input": {"message": {"isLiteral": true, "value": "ok?"}},
            "branches": [{"name": "default", "steps": []}]
        }]
    }}));
    assert!(errors.is_empty());
    let def = def.unwrap();
    let input = def.stage_list()[0].input.as_ref().unwrap();
    assert_eq!(input.message.as_str(), Some("ok?"));
    assert!(input.id.is_none());
}

#[test]
fn test_matrix_excludes() {
    let (def, errors) = walk(&json!({"pipeline": {
        "agent": {"type": "none"},
        "stages": [{
            "name": "M",
            "matrix": {
                "axes": [
                    {"name": "OS", "values": [
                        {"isLiteral": true, "value": "linux"},
                        {"isLiteral": true, "value": "mac"}
                    ]}
                ],
                "excludes": [{"exclude": [
                    {"name": "OS", "notValues": [{"isLiteral": true, "value": "linux"}]}
                ]}],
                "stages": [{"name": "inner", "branches": [{"name": "default", "steps": []}]}]
            }
        }]
    }}));
    assert!(errors.is_empty());
    let def = def.unwrap();
    let matrix = def.stage_list()[0].matrix.as_ref().unwrap();
    assert!(matrix.excludes.as_ref().unwrap().excludes[0].axes[0].inverse);
    assert_eq!(matrix.cells(), vec![vec![("OS".to_string(), "linux".to_string())]]);
}

#[test]
fn test_front_ends_agree() {
    let script = r"
pipeline {
    agent { docker { image 'rust:1'; args '-u root' } }
    environment {
        NAME = 'value'
        TOKEN = credentials('id')
        GREETING = sh(script: 'echo hi', returnStdout: true)
    }
    options { timestamps() }
    parameters { string(name: 'P', defaultValue: 'x') }
    stages {
        stage('Build') {
            when { branch 'main' }
            steps {
                sh 'cargo build'
                timeout(time: 2, unit: 'MINUTES') {
                    retry(2) { sh 'cargo test' }
                }
                script {
                    echo 'inside'
                }
            }
            post { always { echo 'stage done' } }
        }
        stage('Par') {
            failFast true
            parallel {
                stage('one') { steps { echo '1' } }
                stage('two') { steps { echo '2' } }
            }
        }
    }
    post { failure { echo 'failed' } }
}
";
    let mut errors = ErrorCollector::new();
    let from_script = crate::script::parse(script, &mut errors).unwrap();
    assert!(errors.is_empty(), "{:?}", errors.errors_as_strings());

    let (from_json, errors) = walk(&from_script.to_json());
    assert!(errors.is_empty(), "{:?}", errors.errors_as_strings());
    assert_eq!(from_json.unwrap(), from_script);
}
