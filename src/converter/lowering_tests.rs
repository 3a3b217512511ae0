use super::*;
use crate::descriptor::DescriptorCache;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

fn parse(text: &str) -> PipelineDef {
    let mut errors = ErrorCollector::new();
    let def = crate::script::parse(text, &mut errors);
    assert!(errors.is_empty(), "{:?}", errors.errors_as_strings());
    def.unwrap()
}

fn lower_with(text: &str, rewriters: &[Arc<dyn StepRewriter>]) -> (Option<ExecutionPlan>, Vec<String>) {
    let def = parse(text);
    let lookup = DescriptorCache::builtin();
    let mut errors = ErrorCollector::new();
    let plan = Lowering::new(&lookup, rewriters, &mut errors).lower(&def);
    let messages = errors.diagnostics().iter().map(|d| d.message.clone()).collect();
    (plan, messages)
}

fn lower(text: &str) -> ExecutionPlan {
    let (plan, errors) = lower_with(text, &[]);
    assert!(errors.is_empty(), "{errors:?}");
    plan.unwrap()
}

#[test]
fn test_agent_none_suppresses_checkout() {
    let plan = lower("pipeline { agent none; stages { stage('a') { steps { echo 'hi' } } } }");
    assert_eq!(plan.stage_names(), vec!["a"]);
}

#[test]
fn test_checkout_inserted_for_agent_any() {
    let plan = lower("pipeline { agent any; stages { stage('a') { steps { echo 'hi' } } } }");
    assert_eq!(plan.stage_names(), vec![CHECKOUT_STAGE, "a"]);
    let checkout = plan.stages[0].as_stage().unwrap();
    assert!(checkout.synthetic);
    let steps = plan.stages[0].steps();
    assert_eq!(steps[0].name, "checkout");
    assert_eq!(steps[0].argument("scm"), Some(&PlanValue::Expression("scm".into())));
}

#[test]
fn test_skip_default_checkout_option() {
    let plan = lower(
        "pipeline { agent any; options { skipDefaultCheckout() }; stages { stage('a') { steps { echo 'hi' } } } }",
    );
    assert_eq!(plan.stage_names(), vec!["a"]);

    let plan = lower(
        "pipeline { agent any; options { skipDefaultCheckout(false) }; stages { stage('a') { steps { echo 'hi' } } } }",
    );
    assert_eq!(plan.stage_names(), vec![CHECKOUT_STAGE, "a"]);
}

#[test]
fn test_checkout_to_subdirectory() {
    let plan = lower(
        "pipeline { agent any; options { checkoutToSubdirectory('src') }; stages { stage('a') { steps { echo 'x' } } } }",
    );
    let steps = plan.stages[0].steps();
    assert_eq!(steps[0].name, "dir");
    assert_eq!(steps[0].argument("path"), Some(&PlanValue::Literal(json!("src"))));
    assert_eq!(steps[1].name, "checkout");
}

#[test]
fn test_synthetic_stage_order() {
    let plan = lower(
        r"
pipeline {
    agent { docker { image 'rust:1' } }
    tools { maven 'M3' }
    stages { stage('a') { steps { echo 'x' } } }
    post { always { echo 'done' } }
}",
    );
    assert_eq!(
        plan.stage_names(),
        vec![CHECKOUT_STAGE, AGENT_SETUP_STAGE, TOOL_INSTALL_STAGE, "a", POST_ACTIONS_STAGE]
    );
    let setup = plan.stages[1].steps();
    assert_eq!(setup[0].name, "docker");
    assert_eq!(setup[0].argument("image"), Some(&PlanValue::Literal(json!("rust:1"))));
    let tools = plan.stages[2].steps();
    assert_eq!(tools[0].argument("type"), Some(&PlanValue::Literal(json!("maven"))));
    let post = plan.stages[4].as_stage().unwrap();
    assert_eq!(post.post[0].condition, "always");
}

#[test]
fn test_single_argument_resolution() {
    let plan = lower("pipeline { agent none; stages { stage('a') { steps { sh 'make'; retry(3) { echo 'x' } } } } }");
    let steps = plan.steps();
    assert_eq!(steps[0].argument("script"), Some(&PlanValue::Literal(json!("make"))));
    assert_eq!(steps[1].argument("count"), Some(&PlanValue::Literal(json!(3))));
    assert_eq!(steps[2].name, "echo");
}

#[test]
fn test_unknown_step_is_lowering_error() {
    let (plan, errors) = lower_with(
        "pipeline { agent none; stages { stage('a') { steps { frobnicate 'x' } } } }",
        &[],
    );
    assert!(plan.is_none());
    assert_eq!(errors, vec!["Unknown step \"frobnicate\"".to_string()]);
}

#[test]
fn test_matrix_cells() {
    let plan = lower(
        r"
pipeline {
    agent none
    stages {
        stage('m') {
            matrix {
                axes {
                    axis { name 'OS'; values 'linux', 'mac', 'windows' }
                    axis { name 'JDK'; values '17', '21' }
                }
                excludes {
                    exclude {
                        axis { name 'OS'; values 'mac' }
                        axis { name 'JDK'; values '17' }
                    }
                }
                stages { stage('build') { steps { echo 'x' } } }
            }
        }
    }
}",
    );
    let stage = plan.stages[0].as_stage().unwrap();
    let ExecutionNode::Parallel { children, .. } = &stage.children[0] else {
        panic!("matrix should lower to a parallel node");
    };
    assert_eq!(children.len(), 5);
    let first = children[0].as_stage().unwrap();
    assert_eq!(first.name, "Matrix - OS = 'linux', JDK = '17'");
    assert_eq!(
        first.environment,
        vec![LazyVariable::literal("OS", "linux"), LazyVariable::literal("JDK", "17")]
    );
    assert_eq!(first.children[0].as_stage().unwrap().name, "build");
    let names: Vec<&str> = children.iter().filter_map(ExecutionNode::as_stage).map(|s| s.name.as_str()).collect();
    assert!(!names.contains(&"Matrix - OS = 'mac', JDK = '17'"));
}

#[test]
fn test_legacy_parallel_and_fail_fast() {
    let plan = lower(
        r"
pipeline {
    agent none
    options { parallelsAlwaysFailFast() }
    stages {
        stage('p') {
            steps {
                parallel(one: { echo '1' }, two: { echo '2' })
            }
        }
    }
}",
    );
    let stage = plan.stages[0].as_stage().unwrap();
    let ExecutionNode::Parallel { fail_fast, children } = &stage.children[0] else {
        panic!("legacy branches should lower to a parallel node");
    };
    assert!(*fail_fast);
    let names: Vec<&str> = children
        .iter()
        .map(|c| match c {
            ExecutionNode::Sequence(s) => s.name.as_str(),
            _ => "",
        })
        .collect();
    assert_eq!(names, vec!["one", "two"]);
}

#[test]
fn test_environment_references() {
    let plan = lower(
        r#"
pipeline {
    agent none
    environment {
        BASE = '/opt'
        BIN = "${BASE}/bin"
        PATH = "${BIN}:${PATH}"
        TOKEN = credentials('id')
    }
    stages { stage('a') { steps { echo 'x' } } }
}"#,
    );
    let refs: Vec<(&str, Vec<String>)> = plan
        .environment
        .iter()
        .map(|v| (v.name.as_str(), v.references.clone()))
        .collect();
    assert_eq!(
        refs,
        vec![
            ("BASE", vec![]),
            ("BIN", vec!["BASE".to_string()]),
            ("PATH", vec!["BIN".to_string()]),
            ("TOKEN", vec![]),
        ]
    );
    assert!(matches!(plan.environment[3].value, LazyValue::Function { .. }));
}

#[test]
fn test_environment_cycle() {
    let (plan, errors) = lower_with(
        r#"
pipeline {
    agent none
    environment {
        A = "${B}"
        B = "${A}"
    }
    stages { stage('a') { steps { echo 'x' } } }
}"#,
        &[],
    );
    assert!(plan.is_none());
    assert_eq!(errors, vec!["Environment variable reference cycle: A -> B -> A".to_string()]);
}

#[test]
fn test_plain_string_text_is_not_a_reference() {
    let plan = lower(
        r#"
pipeline {
    agent none
    environment {
        A = "${B}-x"
        B = "${BUILD_ID} A"
        C = 'B and A'
        D = "$A/${env.B}/\$C"
    }
    stages { stage('a') { steps { echo 'x' } } }
}"#,
    );
    let refs: Vec<(&str, Vec<String>)> = plan
        .environment
        .iter()
        .map(|v| (v.name.as_str(), v.references.clone()))
        .collect();
    assert_eq!(
        refs,
        vec![
            ("A", vec!["B".to_string()]),
            ("B", vec![]),
            ("C", vec![]),
            ("D", vec!["A".to_string(), "B".to_string()]),
        ]
    );
}

#[test]
fn test_code_outside_strings_is_a_reference() {
    let siblings: HashSet<&str> = ["A", "B"].into_iter().collect();
    let value = Value::expression("A + ' B ' + \"${B}\"");
    assert_eq!(references(&value, "C", &siblings), vec!["A".to_string(), "B".to_string()]);
    let text = Value::expression("'A' + \"B\"");
    assert!(references(&text, "C", &siblings).is_empty());
}

#[test]
fn test_find_cycle_ignores_acyclic_chains() {
    let variable = |name: &str, refs: &[&str]| LazyVariable {
        name: name.to_string(),
        value: LazyValue::Value(PlanValue::Expression(String::new())),
        references: refs.iter().map(ToString::to_string).collect(),
    };
    assert!(find_cycle(&[variable("A", &["B"]), variable("B", &["C"]), variable("C", &[])]).is_none());
    assert_eq!(
        find_cycle(&[variable("A", &["B"]), variable("B", &["C"]), variable("C", &["B"])]),
        Some(vec!["B".to_string(), "C".to_string(), "B".to_string()])
    );
}

struct Counting {
    steps: AtomicUsize,
    branches: AtomicUsize,
    stages: AtomicUsize,
}

impl StepRewriter for Counting {
    fn rewrite_step(&self, step: PlanStep) -> PlanStep {
        self.steps.fetch_add(1, Ordering::SeqCst);
        step
    }

    fn rewrite_branch(&self, branch: PlanSequence) -> PlanSequence {
        self.branches.fetch_add(1, Ordering::SeqCst);
        branch
    }

    fn rewrite_stage(&self, stage: PlanStage) -> PlanStage {
        self.stages.fetch_add(1, Ordering::SeqCst);
        stage
    }
}

struct Renaming;

impl StepRewriter for Renaming {
    fn rewrite_step(&self, mut step: PlanStep) -> PlanStep {
        if step.name == "sh" {
            step.name = "bat".to_string();
        }
        step
    }
}

#[test]
fn test_rewriters_see_every_node() {
    let counting = Arc::new(Counting {
        steps: AtomicUsize::new(0),
        branches: AtomicUsize::new(0),
        stages: AtomicUsize::new(0),
    });
    let rewriters: Vec<Arc<dyn StepRewriter>> = vec![counting.clone(), Arc::new(Renaming)];
    let (plan, errors) = lower_with(
        r"
pipeline {
    agent any
    stages {
        stage('a') { steps { sh 'make'; timeout(time: 1) { echo 'x' } } }
        stage('b') { steps { echo 'y' } }
    }
}",
        &rewriters,
    );
    assert!(errors.is_empty());
    let plan = plan.unwrap();
    // checkout + sh + timeout + echo + echo
    assert_eq!(counting.steps.load(Ordering::SeqCst), 5);
    assert_eq!(counting.branches.load(Ordering::SeqCst), 3);
    assert_eq!(counting.stages.load(Ordering::SeqCst), 3);
    assert_eq!(plan.steps()[1].name, "bat");
}

#[test]
fn test_plan_json_shape() {
    let plan = lower("pipeline { agent none; stages { stage('a') { steps { echo 'hi'; script { x() } } } } }");
    assert_eq!(
        plan.to_json(),
        json!({
            "agent": {"name": "none"},
            "stages": [{
                "type": "stage",
                "name": "a",
                "children": [{
                    "type": "sequence",
                    "name": "default",
                    "children": [
                        {"type": "step", "name": "echo", "arguments": [{"name": "message", "value": {"literal": "hi"}}]},
                        {"type": "script", "text": "x()"}
                    ]
                }]
            }]
        })
    );
}

#[test]
fn test_cell_name() {
    let cell = vec![("OS".to_string(), "linux".to_string()), ("ARCH".to_string(), "x64".to_string())];
    assert_eq!(cell_name(&cell), "Matrix - OS = 'linux', ARCH = 'x64'");
}
