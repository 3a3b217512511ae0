use super::*;
use crate::errors::ErrorKind;
use crate::validator::{KnownCredentials, ValidationContext};
use pretty_assertions::assert_eq;

const FULL: &str = r#"
pipeline {
    agent { label 'linux' }
    environment {
        CC = 'clang'
        TOKEN = credentials('deploy-token')
        BUILD_DIR = "${WORKSPACE}/out"
    }
    tools {
        maven 'M3'
        jdk 'jdk17'
    }
    options {
        timeout(time: 1, unit: 'HOURS')
        buildDiscarder(logRotator(numToKeepStr: '10'))
        timestamps()
    }
    triggers { cron('H */4 * * 1-5') }
    parameters {
        string(name: 'TARGET', defaultValue: 'all', description: 'make target')
        booleanParam(name: 'DEBUG', defaultValue: false)
    }
    libraries { lib('shared@main') }
    stages {
        stage('Build') {
            agent { docker { image 'gcc:13'; args '-v /tmp:/tmp' } }
            when {
                beforeAgent true
                allOf {
                    branch 'main'
                    not { buildingTag() }
                }
            }
            steps {
                sh 'make'
                dir('out') {
                    archiveArtifacts artifacts: '*.bin', fingerprint: true
                }
            }
            post { success { echo 'built' } }
        }
        stage('Approve') {
            input {
                message 'Ship it?'
                ok 'Yes'
                submitter 'admins'
                parameters { string(name: 'REASON', defaultValue: '') }
            }
            steps { echo "Approved: ${REASON}" }
        }
        stage('Tests') {
            failFast true
            parallel {
                stage('unit') { steps { sh 'make test' } }
                stage('lint') { steps { sh 'make lint' } }
            }
        }
        stage('Legacy') {
            steps {
                parallel(first: { echo 'a' }, second: { echo 'b' })
            }
        }
        stage('Nested') {
            stages {
                stage('one') { steps { echo '1' } }
                stage('two') { steps { echo '2' } }
            }
        }
        stage('Matrix') {
            matrix {
                axes {
                    axis { name 'OS'; values 'linux', 'mac' }
                    axis { name 'ARCH'; values 'x64', 'arm64' }
                }
                excludes {
                    exclude {
                        axis { name 'OS'; values 'mac' }
                        axis { name 'ARCH'; notValues 'arm64' }
                    }
                }
                stages { stage('cell') { steps { echo "os ${OS}" } } }
            }
        }
        stage('Deploy') {
            when { expression { return params.DEBUG } }
            steps {
                script {
                    def target = params.TARGET
                    echo "deploying ${target}"
                }
            }
        }
    }
    post {
        always { cleanWs() }
        failure { mail to: 'team@example.com', subject: 'failed', body: 'see logs' }
    }
}
"#;

fn model(text: &str) -> PipelineDef {
    match Converter::default().script_to_model(text) {
        Conversion::Success(def) => def,
        Conversion::Failure(errors) => panic!("conversion failed: {errors:?}"),
    }
}

#[test]
fn test_full_pipeline_is_valid() {
    let def = model(FULL);
    assert_eq!(def.stage_count(), 7);
    assert!(Converter::default().validate_model(&def).is_empty());
}

#[test]
fn test_script_round_trip_is_idempotent() {
    let converter = Converter::default();
    let def = model(FULL);
    let text = converter.model_to_script(&def);
    let reparsed = model(&text);
    assert_eq!(reparsed, def);
    assert_eq!(converter.model_to_script(&reparsed), text);
}

#[test]
fn test_json_round_trip_is_idempotent() {
    let converter = Converter::default();
    let def = model(FULL);
    let json = converter.model_to_json(&def);
    let reparsed = converter.json_value_to_model(&json).ok().unwrap();
    assert_eq!(reparsed, def);
    assert_eq!(converter.model_to_json(&reparsed), json);
}

#[test]
fn test_front_ends_produce_equal_models() {
    let converter = Converter::default();
    let from_script = model(FULL);
    let json_text = converter.model_to_json(&from_script).to_string();
    let from_json = converter.json_to_model(&json_text).ok().unwrap();
    assert_eq!(from_json, from_script);
    assert_eq!(converter.model_to_script(&from_json), converter.model_to_script(&from_script));
}

#[test]
fn test_one_element_argument_array_matches_script() {
    let converter = Converter::default();
    let json = serde_json::json!({
        "pipeline": {
            "agent": {"type": "none"},
            "stages": [{
                "name": "a",
                "branches": [{
                    "name": "default",
                    "steps": [{
                        "name": "myCustomStep",
                        "arguments": [{"isLiteral": true, "value": "hi"}]
                    }]
                }]
            }]
        }
    });
    let from_json = converter.json_value_to_model(&json).ok().unwrap();
    let text = converter.model_to_script(&from_json);
    assert!(text.contains("myCustomStep('hi')"), "{text}");
    assert_eq!(model(&text), from_json);
}

#[test]
fn test_script_json_conforms_to_schema() {
    let json = model(FULL).to_json();
    let mut errors = ErrorCollector::new();
    assert!(crate::json::schema::check(&json, &mut errors), "{:?}", errors.errors_as_strings());
}

#[test]
fn test_syntax_errors_skip_validation() {
    let conversion = Converter::default().script_to_model("pipeline { agent any; stages { stage('a') { bogus 1 } } }");
    assert!(!conversion.is_success());
    assert!(conversion.errors().iter().all(|d| d.kind == ErrorKind::Syntax));
}

#[test]
fn test_validation_failure_is_reported() {
    let conversion = Converter::default().script_to_model("pipeline { agent any }");
    let errors = conversion.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::Validation);
    assert_eq!(errors[0].message, "Missing required section \"stages\"");
}

#[test]
fn test_steps_round_trip() {
    let converter = Converter::default();
    let steps = converter
        .script_to_steps("sh 'make'\ntimeout(time: 5) {\n    echo 'waiting'\n}")
        .ok()
        .unwrap();
    let json = converter.steps_to_json(&steps);
    let from_json = converter.json_to_steps(&json.to_string()).ok().unwrap();
    assert_eq!(from_json, steps);
    assert_eq!(
        converter.steps_to_script(&from_json),
        "sh('make')\ntimeout(time: 5) {\n    echo('waiting')\n}\n"
    );
}

#[test]
fn test_steps_are_validated() {
    let conversion = Converter::default().script_to_steps("node('x') { echo 'a' }");
    assert_eq!(conversion.errors().len(), 1);
    assert!(conversion.errors()[0].message.starts_with("Invalid step \"node\" used"));
}

#[test]
fn test_credentials_checked_when_configured() {
    let text = "pipeline { agent any; environment { T = credentials('nope') }; stages { stage('a') { steps { echo 'x' } } } }";
    assert!(Converter::default().script_to_model(text).is_success());

    let converter = Converter::builder()
        .credentials(Arc::new(KnownCredentials::new(["deploy-token"])))
        .build();
    let conversion = converter.script_to_model(text);
    assert_eq!(conversion.errors()[0].message, "Credentials \"nope\" could not be found");
}

struct ProbeContributor;

impl ValidatorContributor for ProbeContributor {
    fn validate_stage(&self, node: &crate::ast::Stage, _ctx: &ValidationContext) -> Option<String> {
        (node.name == "registry-probe").then(|| "probe stage rejected".to_string())
    }
}

#[test]
fn test_registered_contributors() {
    crate::validator::register_contributor(Arc::new(ProbeContributor));
    let text = "pipeline { agent any; stages { stage('registry-probe') { steps { echo 'x' } } } }";

    assert!(Converter::default().script_to_model(text).is_success());
    let converter = Converter::builder().with_registered().build();
    let conversion = converter.script_to_model(text);
    assert_eq!(conversion.errors()[0].message, "probe stage rejected");
}

#[test]
fn test_full_pipeline_lowers() {
    let plan = Converter::default().script_to_plan(FULL).ok().unwrap();
    assert_eq!(
        plan.stage_names(),
        vec![
            lowering::CHECKOUT_STAGE,
            lowering::TOOL_INSTALL_STAGE,
            "Build",
            "Approve",
            "Tests",
            "Legacy",
            "Nested",
            "Matrix",
            "Deploy",
            lowering::POST_ACTIONS_STAGE,
        ]
    );
}

#[test]
fn test_lowering_errors_are_failures() {
    let conversion = Converter::default()
        .script_to_plan("pipeline { agent none; stages { stage('a') { steps { teleport 'x' } } } }");
    assert_eq!(conversion.errors().len(), 1);
    assert_eq!(conversion.errors()[0].kind, ErrorKind::Lowering);
}
