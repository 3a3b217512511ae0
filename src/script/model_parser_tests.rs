//! Tests for the script model parser

use super::*;
use crate::ast::{Arguments, Element, EnvironmentValue, Literal, PostScope};
use crate::script::parse;
use pretty_assertions::assert_eq;

fn parse_ok(src: &str) -> PipelineDef {
    let mut errors = ErrorCollector::new();
    let model = parse(src, &mut errors);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors.errors_as_strings());
    model.unwrap()
}

fn parse_errors(src: &str) -> Vec<String> {
    let mut errors = ErrorCollector::new();
    let _ = parse(src, &mut errors);
    errors.diagnostics().iter().map(|d| d.message.clone()).collect()
}

#[test]
fn test_minimal_pipeline() {
    let def = parse_ok(
        r"
pipeline {
    agent any
    stages {
        stage('Build') {
            steps {
                echo 'hello'
            }
        }
    }
}
",
    );
    assert_eq!(def.agent.as_ref().unwrap().agent_type, "any");
    assert_eq!(def.stage_count(), 1);
    let stage = &def.stage_list()[0];
    assert_eq!(stage.name, "Build");
    assert_eq!(stage.branches.len(), 1);
    assert_eq!(stage.branches[0].name, "default");
    assert_eq!(stage.branches[0].steps[0].name(), "echo");
}

#[test]
fn test_stage_location_recorded() {
    let def = parse_ok("pipeline {\n  agent any\n  stages {\n    stage('A') { steps { echo 'x' } }\n  }\n}");
    assert_eq!(
        def.stage_list()[0].location().to_string(),
        "line 4, column 5"
    );
}

#[test]
fn test_agent_forms() {
    let def = parse_ok(
        r"
pipeline {
    agent { docker { image 'maven:3'; args '-v /tmp:/tmp' } }
    stages {
        stage('A') {
            agent { label 'linux' }
            steps { echo 'a' }
        }
        stage('B') {
            agent { docker(image: 'node:20') }
            steps { echo 'b' }
        }
    }
}
",
    );
    let agent = def.agent.as_ref().unwrap();
    assert_eq!(agent.agent_type, "docker");
    assert_eq!(agent.arguments.get("image").and_then(Value::as_str), Some("maven:3"));
    assert_eq!(agent.arguments.get("args").and_then(Value::as_str), Some("-v /tmp:/tmp"));

    let stages = def.stage_list();
    let label = stages[0].agent.as_ref().unwrap();
    assert_eq!(label.agent_type, "label");
    assert_eq!(label.arguments, Arguments::single(Value::literal("linux")));
    let docker = stages[1].agent.as_ref().unwrap();
    assert_eq!(docker.arguments.get("image").and_then(Value::as_str), Some("node:20"));
}

#[test]
fn test_undefined_and_duplicate_sections() {
    let errors = parse_errors(
        r"
pipeline {
    agent any
    agent none
    banana { }
    stages { stage('A') { steps { echo 'a' } } }
}
",
    );
    assert_eq!(
        errors,
        vec![
            "Multiple occurrences of the agent section".to_string(),
            "Undefined section \"banana\"".to_string(),
        ]
    );
}

#[test]
fn test_non_stage_in_stages() {
    let errors = parse_errors("pipeline { agent any\n stages { echo 'x' } }");
    assert_eq!(errors, vec!["Expected a stage".to_string()]);
}

#[test]
fn test_assignment_is_not_a_step() {
    let errors = parse_errors(
        "pipeline { agent any\n stages { stage('A') { steps { x = 1 } } } }",
    );
    assert_eq!(errors, vec!["Expected a step".to_string()]);
}

#[test]
fn test_mixed_arguments_rejected() {
    let errors = parse_errors(
        "pipeline { agent any\n stages { stage('A') { steps { git 'url', branch: 'main' } } } }",
    );
    assert_eq!(
        errors,
        vec!["Can't mix named and unnamed parameter definition".to_string()]
    );
}

#[test]
fn test_top_level_statement_reported() {
    let errors = parse_errors("def x = 1\npipeline { agent any\n stages { stage('A') { steps { echo 'a' } } } }");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Only a pipeline block is allowed at the top level"));
}

#[test]
fn test_missing_pipeline_block() {
    assert_eq!(parse_errors("echo 'x'").last().unwrap(), "Missing \"pipeline\" block");
}

#[test]
fn test_environment_with_credentials() {
    let def = parse_ok(
        r#"
pipeline {
    agent any
    environment {
        FOO = 'bar'
        COUNT = 3
        GREETING = "hi ${FOO}"
        TOKEN = credentials('my-token')
    }
    stages { stage('A') { steps { echo 'a' } } }
}
"#,
    );
    let env = def.environment.as_ref().unwrap();
    assert_eq!(env.entries.len(), 4);
    match env.get("COUNT") {
        Some(EnvironmentValue::Value(v)) => {
            assert_eq!(v.as_literal(), Some(&Literal::from(3_i64)));
        }
        other => panic!("unexpected {other:?}"),
    }
    match env.get("GREETING") {
        Some(EnvironmentValue::Value(v)) => assert!(!v.is_literal()),
        other => panic!("unexpected {other:?}"),
    }
    match env.get("TOKEN") {
        Some(EnvironmentValue::Function(call)) => {
            assert_eq!(call.name, "credentials");
            assert_eq!(call.args[0].as_str(), Some("my-token"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_environment_requires_assignments() {
    let errors = parse_errors(
        "pipeline { agent any\n environment { echo 'x' }\n stages { stage('A') { steps { echo 'a' } } } }",
    );
    assert_eq!(errors, vec!["Expected name=value pairs".to_string()]);
}

#[test]
fn test_script_block_dedented() {
    let def = parse_ok(
        r"
pipeline {
    agent any
    stages {
        stage('A') {
            steps {
                script {
                    def x = 1
                    if (x) {
                        echo 'y'
                    }
                }
            }
        }
    }
}
",
    );
    let step = &def.stage_list()[0].branches[0].steps[0];
    match step {
        Step::Script(block) => {
            assert_eq!(block.text, "def x = 1\nif (x) {\n    echo 'y'\n}");
        }
        other => panic!("expected script block, got {other:?}"),
    }
}

#[test]
fn test_tree_steps() {
    let def = parse_ok(
        r"
pipeline {
    agent any
    stages {
        stage('A') {
            steps {
                timeout(time: 5, unit: 'MINUTES') {
                    retry(3) {
                        sh 'make'
                    }
                }
            }
        }
    }
}
",
    );
    let step = &def.stage_list()[0].branches[0].steps[0];
    assert_eq!(step.name(), "timeout");
    assert_eq!(step.children()[0].name(), "retry");
    assert_eq!(step.children()[0].children()[0].name(), "sh");
}

#[test]
fn test_legacy_parallel_branches() {
    let def = parse_ok(
        r"
pipeline {
    agent any
    stages {
        stage('Tests') {
            steps {
                parallel(
                    unit: { sh 'make unit' },
                    'it tests': { sh 'make it' },
                    failFast: true
                )
            }
        }
    }
}
",
    );
    let stage = &def.stage_list()[0];
    let names: Vec<&str> = stage.branches.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["unit", "it tests"]);
    assert!(stage.fail_fast);
    assert!(stage.has_legacy_branches());
}

#[test]
fn test_parallel_stages_and_fail_fast() {
    let def = parse_ok(
        r"
pipeline {
    agent any
    stages {
        stage('P') {
            failFast true
            parallel {
                stage('a') { steps { echo 'a' } }
                stage('b') { steps { echo 'b' } }
            }
        }
    }
}
",
    );
    let stage = &def.stage_list()[0];
    assert!(stage.fail_fast);
    assert_eq!(stage.parallel.as_ref().unwrap().stages.len(), 2);
}

#[test]
fn test_when_conditions() {
    let def = parse_ok(
        r"
pipeline {
    agent any
    stages {
        stage('Deploy') {
            when {
                beforeAgent true
                branch 'main'
                anyOf {
                    environment name: 'DEPLOY', value: 'yes'
                    expression { return params.FORCE }
                }
            }
            steps { echo 'deploy' }
        }
    }
}
",
    );
    let when = def.stage_list()[0].when.as_ref().unwrap();
    assert!(when.before_agent);
    assert_eq!(when.conditions.len(), 2);
    assert_eq!(when.conditions[0].name(), "branch");
    match &when.conditions[1] {
        WhenCondition::Composite { name, children, .. } => {
            assert_eq!(name, "anyOf");
            assert_eq!(children.len(), 2);
            match &children[1] {
                WhenCondition::Expression { text, .. } => assert_eq!(text, "return params.FORCE"),
                other => panic!("unexpected {other:?}"),
            }
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_post_sections() {
    let def = parse_ok(
        r"
pipeline {
    agent any
    stages {
        stage('A') {
            steps { echo 'a' }
            post { failure { echo 'stage failed' } }
        }
    }
    post {
        always { echo 'done' }
        success { echo 'ok' }
    }
}
",
    );
    let post = def.post.as_ref().unwrap();
    assert_eq!(post.scope, PostScope::Build);
    assert_eq!(post.conditions.len(), 2);
    assert_eq!(post.conditions[1].condition, "success");
    let stage_post = def.stage_list()[0].post.as_ref().unwrap();
    assert_eq!(stage_post.scope, PostScope::Stage);
}

#[test]
fn test_options_triggers_parameters_tools_libraries() {
    let def = parse_ok(
        r"
pipeline {
    agent any
    libraries { lib('shared@1.0') }
    tools { maven 'mvn-3' }
    options { timeout(time: 1, unit: 'HOURS'); timestamps() }
    parameters { string(name: 'NAME', defaultValue: 'x') }
    triggers { cron('H * * * *') }
    stages {
        stage('A') {
            options { skipDefaultCheckout() }
            steps { echo 'a' }
        }
    }
}
",
    );
    assert_eq!(def.libraries.as_ref().unwrap().libraries[0].as_str(), Some("shared@1.0"));
    assert_eq!(def.tools.as_ref().unwrap().tools[0].key, "maven");
    let options = def.options.as_ref().unwrap();
    assert!(options.contains("timeout") && options.contains("timestamps"));
    assert!(!options.in_stage);
    assert_eq!(def.parameters.as_ref().unwrap().parameters[0].name, "string");
    assert_eq!(def.triggers.as_ref().unwrap().triggers[0].name, "cron");
    assert!(def.stage_list()[0].options.as_ref().unwrap().in_stage);
}

#[test]
fn test_input_fields() {
    let def = parse_ok(
        r"
pipeline {
    agent any
    stages {
        stage('Approve') {
            input {
                message 'Deploy?'
                ok 'Yes'
                parameters { booleanParam(name: 'CONFIRM', defaultValue: false) }
            }
            steps { echo 'a' }
        }
    }
}
",
    );
    let input = def.stage_list()[0].input.as_ref().unwrap();
    assert_eq!(input.message.as_str(), Some("Deploy?"));
    assert_eq!(input.ok.as_ref().and_then(Value::as_str), Some("Yes"));
    assert_eq!(input.parameters.as_ref().unwrap().parameters.len(), 1);
}

#[test]
fn test_input_unknown_field() {
    let errors = parse_errors(
        "pipeline { agent any\n stages { stage('A') { input { message 'm'\n color 'red' }\n steps { echo 'a' } } } }",
    );
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Invalid option \"color\" for input"));
}

#[test]
fn test_matrix() {
    let def = parse_ok(
        r"
pipeline {
    agent none
    stages {
        stage('Matrix') {
            matrix {
                axes {
                    axis { name 'OS'; values 'linux', 'windows' }
                    axis { name 'JDK'; values '11', '17' }
                }
                excludes {
                    exclude {
                        axis { name 'OS'; values 'windows' }
                        axis { name 'JDK'; notValues '17' }
                    }
                }
                stages {
                    stage('Build') { steps { echo 'x' } }
                }
            }
        }
    }
}
",
    );
    let matrix = def.stage_list()[0].matrix.as_ref().unwrap();
    assert_eq!(matrix.axes.axes.len(), 2);
    let exclude = &matrix.excludes.as_ref().unwrap().excludes[0];
    assert!(!exclude.axes[0].inverse);
    assert!(exclude.axes[1].inverse);
    assert_eq!(matrix.cells().len(), 3);
}

#[test]
fn test_not_values_outside_exclude() {
    let errors = parse_errors(
        "pipeline { agent any\n stages { stage('M') { matrix { axes { axis { name 'A'; notValues 'x' } }\n stages { stage('s') { steps { echo 'a' } } } } } } }",
    );
    assert_eq!(errors, vec!["notValues is only allowed in an exclude axis".to_string()]);
}

#[test]
fn test_unknown_stage_section() {
    let errors = parse_errors(
        "pipeline { agent any\n stages { stage('A') { echo 'a' } } }",
    );
    assert_eq!(errors, vec!["Unknown stage section \"echo\"".to_string()]);
}

#[test]
fn test_value_of_number_and_expression() {
    let mut errors = ErrorCollector::new();
    let steps = crate::script::parse_steps("sleep 5\necho env.FOO", &mut errors).unwrap();
    match steps[0].arguments() {
        Some(Arguments::Single(v)) => assert_eq!(v.to_text(), "5"),
        other => panic!("unexpected {other:?}"),
    }
    match steps[1].arguments() {
        Some(Arguments::Single(v)) => {
            assert!(!v.is_literal());
            assert_eq!(v.raw(), "env.FOO");
        }
        other => panic!("unexpected {other:?}"),
    }
}
