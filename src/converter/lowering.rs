//! Lowering of the pipeline model into an execution plan
//!
//! The plan is the program form an execution engine consumes: a tree of
//! stage, sequence, parallel, step and script nodes. Lowering resolves single
//! unnamed arguments to parameter names, expands matrices into cells, inserts
//! the synthetic stages and turns environment sections into lazy variables.
//! Every lowered step, branch and stage goes through the registered
//! [`StepRewriter`]s.

use crate::ast::{
    Agent, Arguments, Branch, Element, Environment, EnvironmentValue, Matrix, MethodCall,
    PipelineDef, Post, Stage, StageInput, Step, Tools, Value, When, WhenCondition,
};
use crate::descriptor::{DescriptorKind, DescriptorLookup};
use crate::errors::ErrorCollector;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Implicit SCM checkout
pub const CHECKOUT_STAGE: &str = "Declarative: Checkout SCM";
/// Container agent preparation
pub const AGENT_SETUP_STAGE: &str = "Declarative: Agent Setup";
/// Tool installation
pub const TOOL_INSTALL_STAGE: &str = "Declarative: Tool Install";
/// Pipeline-level post conditions
pub const POST_ACTIONS_STAGE: &str = "Declarative: Post Actions";

/// Names reserved for synthetic stages
pub const SYNTHETIC_STAGES: &[&str] = &[
    CHECKOUT_STAGE,
    AGENT_SETUP_STAGE,
    TOOL_INSTALL_STAGE,
    POST_ACTIONS_STAGE,
];

static IDENTIFIER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("valid identifier token regex"));

/// Escapes, `${...}` bodies and `$NAME` inside a double-quoted string
static INTERPOLATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\.|\$\{([^}]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").expect("valid interpolation regex")
});

/// Argument value as the engine sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlanValue {
    /// Constant
    Literal(serde_json::Value),
    /// Source fragment evaluated at run time
    Expression(String),
}

impl From<&Value> for PlanValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Literal { value, .. } => Self::Literal(value.to_json()),
            Value::Expression { text, .. } => Self::Expression(text.clone()),
        }
    }
}

/// One argument; unnamed only for positional lists
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanArgument {
    /// Parameter name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Argument value
    pub value: PlanValue,
}

impl PlanArgument {
    /// Named argument
    pub fn named(name: impl Into<String>, value: PlanValue) -> Self {
        Self {
            name: Some(name.into()),
            value,
        }
    }
}

/// Agent, option, trigger or parameter invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanCall {
    /// Capability name
    pub name: String,
    /// Resolved arguments
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<PlanArgument>,
}

/// A step invocation with optional nested steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    /// Step name
    pub name: String,
    /// Arguments, single values resolved to their parameter name
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<PlanArgument>,
    /// Nested steps of a block-taking step
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ExecutionNode>,
}

impl PlanStep {
    /// Argument value by name
    pub fn argument(&self, name: &str) -> Option<&PlanValue> {
        self.arguments
            .iter()
            .find(|a| a.name.as_deref() == Some(name))
            .map(|a| &a.value)
    }
}

/// Named ordered node list: a branch, or the stages of a sequential block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanSequence {
    /// Branch or block name
    pub name: String,
    /// Nodes run in order
    pub children: Vec<ExecutionNode>,
}

/// Value of a lazy environment variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LazyValue {
    /// Literal or expression
    Value(PlanValue),
    /// Internal function such as `credentials`
    Function {
        /// Function name
        name: String,
        /// Unnamed arguments
        arguments: Vec<PlanValue>,
    },
}

/// Environment variable evaluated on first use
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LazyVariable {
    /// Variable name
    pub name: String,
    /// Deferred value
    pub value: LazyValue,
    /// Sibling variables the value refers to
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

impl LazyVariable {
    /// Variable holding a literal string
    pub fn literal(name: impl Into<String>, value: &str) -> Self {
        Self {
            name: name.into(),
            value: LazyValue::Value(PlanValue::Literal(serde_json::Value::String(value.to_string()))),
            references: Vec::new(),
        }
    }
}

/// Lowered `when` condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlanCondition {
    /// Catalog condition such as `branch`
    Leaf {
        /// Condition name
        name: String,
        /// Condition arguments
        arguments: Vec<PlanArgument>,
    },
    /// `expression { ... }` block
    Expression {
        /// Block source
        text: String,
    },
    /// `allOf`, `anyOf` or `not`
    Composite {
        /// Composite name
        name: String,
        /// Nested conditions
        children: Vec<PlanCondition>,
    },
}

/// Lowered `when` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanWhen {
    /// Conditions that must all hold
    pub conditions: Vec<PlanCondition>,
    /// Evaluate before entering the agent
    pub before_agent: bool,
    /// Evaluate before the input prompt
    pub before_input: bool,
    /// Evaluate before applying stage options
    pub before_options: bool,
}

/// Lowered stage input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInput {
    /// Prompt message
    pub message: PlanValue,
    /// `id`, `ok`, `submitter` and `submitterParameter` when given
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<PlanArgument>,
    /// Requested build parameters
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<PlanCall>,
}

/// Post condition with the branch run when it holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanPost {
    /// Build condition name
    pub condition: String,
    /// Steps to run
    pub branch: PlanSequence,
}

/// Stage node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStage {
    /// Stage name
    pub name: String,
    /// Inserted by lowering rather than declared
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
    /// Stage agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<PlanCall>,
    /// Guard condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub when: Option<PlanWhen>,
    /// Stage environment
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<LazyVariable>,
    /// Tool type to installation name
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<PlanArgument>,
    /// Stage options
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<PlanCall>,
    /// Input prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<PlanInput>,
    /// Body
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ExecutionNode>,
    /// Post conditions in declaration order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub post: Vec<PlanPost>,
}

impl PlanStage {
    /// Empty stage named `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn synthetic(name: &str, children: Vec<ExecutionNode>) -> Self {
        Self {
            name: name.to_string(),
            synthetic: true,
            children,
            ..Self::default()
        }
    }
}

/// Node of the execution plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExecutionNode {
    /// Stage
    Stage(PlanStage),
    /// Nodes run in order
    Sequence(PlanSequence),
    /// Nodes run concurrently
    Parallel {
        /// Abort siblings on the first failure
        #[serde(rename = "failFast")]
        fail_fast: bool,
        /// Concurrent nodes
        children: Vec<ExecutionNode>,
    },
    /// Step invocation
    Step(PlanStep),
    /// Opaque `script { }` block
    Script {
        /// Block source
        text: String,
    },
}

impl ExecutionNode {
    /// Every step node in this subtree, depth first
    pub fn steps(&self) -> Vec<&PlanStep> {
        let mut out = Vec::new();
        self.collect_steps(&mut out);
        out
    }

    fn collect_steps<'p>(&'p self, out: &mut Vec<&'p PlanStep>) {
        match self {
            Self::Stage(stage) => {
                for child in &stage.children {
                    child.collect_steps(out);
                }
                for post in &stage.post {
                    for child in &post.branch.children {
                        child.collect_steps(out);
                    }
                }
            }
            Self::Sequence(sequence) => {
                for child in &sequence.children {
                    child.collect_steps(out);
                }
            }
            Self::Parallel { children, .. } => {
                for child in children {
                    child.collect_steps(out);
                }
            }
            Self::Step(step) => {
                out.push(step);
                for child in &step.children {
                    child.collect_steps(out);
                }
            }
            Self::Script { .. } => {}
        }
    }

    /// The stage, if this is a stage node
    pub fn as_stage(&self) -> Option<&PlanStage> {
        match self {
            Self::Stage(stage) => Some(stage),
            _ => None,
        }
    }
}

/// Program form of a whole pipeline
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    /// Top-level agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<PlanCall>,
    /// Pipeline environment
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<LazyVariable>,
    /// Pipeline options
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<PlanCall>,
    /// Build triggers
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<PlanCall>,
    /// Build parameters
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<PlanCall>,
    /// Shared libraries to load
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<PlanValue>,
    /// Stages in run order, synthetic ones included
    pub stages: Vec<ExecutionNode>,
}

impl ExecutionPlan {
    /// Names of the top-level stages, synthetic ones included
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter_map(ExecutionNode::as_stage)
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Every step of the plan, depth first
    pub fn steps(&self) -> Vec<&PlanStep> {
        self.stages.iter().flat_map(ExecutionNode::steps).collect()
    }

    /// JSON rendering for engines and the command line
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Extension point transforming lowered nodes
///
/// Rewriters run in registration order; each one receives the output of the
/// previous one. Script blocks are opaque and never rewritten.
pub trait StepRewriter: Send + Sync {
    /// Rewrites a step after its children were lowered
    fn rewrite_step(&self, step: PlanStep) -> PlanStep {
        step
    }

    /// Rewrites a branch: a flat step list, a legacy parallel arm or a post body
    fn rewrite_branch(&self, branch: PlanSequence) -> PlanSequence {
        branch
    }

    /// Rewrites a stage after its body was lowered
    fn rewrite_stage(&self, stage: PlanStage) -> PlanStage {
        stage
    }
}

static REWRITERS: Lazy<RwLock<Vec<Arc<dyn StepRewriter>>>> = Lazy::new(|| RwLock::new(Vec::new()));

/// Registers a rewriter for every converter built with the registry
pub fn register_rewriter(rewriter: Arc<dyn StepRewriter>) {
    let mut rewriters = REWRITERS.write();
    rewriters.push(rewriter);
    tracing::debug!(count = rewriters.len(), "registered step rewriter");
}

/// Snapshot of the process-wide rewriters, in registration order
pub fn registered_rewriters() -> Vec<Arc<dyn StepRewriter>> {
    REWRITERS.read().clone()
}

/// Display name of a matrix cell, e.g. `Matrix - OS = 'linux', JDK = '21'`
pub fn cell_name(cell: &[(String, String)]) -> String {
    let axes: Vec<String> = cell.iter().map(|(axis, value)| format!("{axis} = '{value}'")).collect();
    format!("Matrix - {}", axes.join(", "))
}

/// Sibling variables referenced by an expression, in order of appearance
///
/// Only code counts: identifiers outside string literals and the
/// interpolated parts of double-quoted strings. Plain string text never
/// references anything.
pub fn references(value: &Value, own: &str, siblings: &HashSet<&str>) -> Vec<String> {
    let Value::Expression { text, .. } = value else {
        return Vec::new();
    };
    let mut found: Vec<String> = Vec::new();
    for name in code_identifiers(text) {
        if name != own && siblings.contains(name) && !found.iter().any(|f| f == name) {
            found.push(name.to_string());
        }
    }
    found
}

/// Identifiers of the code parts of an expression
fn code_identifiers(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut code_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let quote = bytes[i];
        if quote != b'\'' && quote != b'"' {
            i += 1;
            continue;
        }
        found.extend(IDENTIFIER_TOKEN.find_iter(&text[code_start..i]).map(|m| m.as_str()));
        let delimiter = if bytes[i..].starts_with(&[quote; 3]) { 3 } else { 1 };
        let body_start = i + delimiter;
        let body_end = string_end(bytes, body_start, quote, delimiter);
        if quote == b'"' {
            found.extend(interpolated_identifiers(&text[body_start..body_end]));
        }
        i = (body_end + delimiter).min(bytes.len());
        code_start = i;
    }
    found.extend(IDENTIFIER_TOKEN.find_iter(&text[code_start..]).map(|m| m.as_str()));
    found
}

/// Index of the closing delimiter, or the end of the text when unterminated
fn string_end(bytes: &[u8], start: usize, quote: u8, delimiter: usize) -> usize {
    let closing = [quote; 3];
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'$' if quote == b'"' && bytes.get(i + 1) == Some(&b'{') => {
                depth += 1;
                i += 2;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                i += 1;
            }
            _ if depth == 0 && bytes[i..].starts_with(&closing[..delimiter]) => return i,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn interpolated_identifiers(body: &str) -> Vec<&str> {
    let mut found = Vec::new();
    for capture in INTERPOLATION.captures_iter(body) {
        if let Some(code) = capture.get(1) {
            found.extend(IDENTIFIER_TOKEN.find_iter(code.as_str()).map(|m| m.as_str()));
        } else if let Some(name) = capture.get(2) {
            found.push(name.as_str());
        }
    }
    found
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Active,
    Done,
}

fn visit(
    at: usize,
    variables: &[LazyVariable],
    index: &HashMap<&str, usize>,
    marks: &mut [Mark],
    path: &mut Vec<usize>,
) -> Option<Vec<String>> {
    marks[at] = Mark::Active;
    path.push(at);
    for reference in &variables[at].references {
        let Some(&next) = index.get(reference.as_str()) else {
            continue;
        };
        match marks[next] {
            Mark::Active => {
                let start = path.iter().position(|&p| p == next)?;
                let mut cycle: Vec<String> = path[start..].iter().map(|&p| variables[p].name.clone()).collect();
                cycle.push(variables[next].name.clone());
                return Some(cycle);
            }
            Mark::Unvisited => {
                if let Some(cycle) = visit(next, variables, index, marks, path) {
                    return Some(cycle);
                }
            }
            Mark::Done => {}
        }
    }
    path.pop();
    marks[at] = Mark::Done;
    None
}

/// First reference cycle between distinct variables, as a closed name path
pub fn find_cycle(variables: &[LazyVariable]) -> Option<Vec<String>> {
    let index: HashMap<&str, usize> = variables
        .iter()
        .enumerate()
        .map(|(i, v)| (v.name.as_str(), i))
        .collect();
    let mut marks = vec![Mark::Unvisited; variables.len()];
    let mut path = Vec::new();
    for start in 0..variables.len() {
        if marks[start] == Mark::Unvisited
            && let Some(cycle) = visit(start, variables, &index, &mut marks, &mut path)
        {
            return Some(cycle);
        }
    }
    None
}

fn option_enabled(options: Option<&crate::ast::Options>, name: &str) -> bool {
    options
        .and_then(|o| o.get(name))
        .is_some_and(|call| call.arguments.values().next().and_then(Value::as_bool) != Some(false))
}

/// Lowers validated models
pub struct Lowering<'a> {
    lookup: &'a dyn DescriptorLookup,
    rewriters: &'a [Arc<dyn StepRewriter>],
    errors: &'a mut ErrorCollector,
    always_fail_fast: bool,
}

impl<'a> Lowering<'a> {
    /// Creates a lowering pass reporting into `errors`
    pub fn new(
        lookup: &'a dyn DescriptorLookup,
        rewriters: &'a [Arc<dyn StepRewriter>],
        errors: &'a mut ErrorCollector,
    ) -> Self {
        Self {
            lookup,
            rewriters,
            errors,
            always_fail_fast: false,
        }
    }

    /// Lowers a whole pipeline; `None` when any lowering error was reported
    pub fn lower(&mut self, def: &PipelineDef) -> Option<ExecutionPlan> {
        let before = self.errors.error_count();
        let options = def.options.as_ref();
        self.always_fail_fast = option_enabled(options, "parallelsAlwaysFailFast");

        let mut plan = ExecutionPlan {
            agent: def.agent.as_ref().map(|a| self.lower_agent(a)),
            environment: def
                .environment
                .as_ref()
                .map(|e| self.lower_environment(e))
                .unwrap_or_default(),
            options: options
                .map(|o| self.lower_calls(DescriptorKind::Option, &o.options))
                .unwrap_or_default(),
            triggers: def
                .triggers
                .as_ref()
                .map(|t| self.lower_calls(DescriptorKind::Trigger, &t.triggers))
                .unwrap_or_default(),
            parameters: def
                .parameters
                .as_ref()
                .map(|p| self.lower_calls(DescriptorKind::Parameter, &p.parameters))
                .unwrap_or_default(),
            libraries: def
                .libraries
                .as_ref()
                .map(|l| l.libraries.iter().map(PlanValue::from).collect())
                .unwrap_or_default(),
            stages: Vec::new(),
        };

        let skip_checkout = option_enabled(options, "skipDefaultCheckout");
        if let Some(agent) = &def.agent
            && !agent.is_none()
            && !skip_checkout
        {
            let subdirectory = options
                .and_then(|o| o.get("checkoutToSubdirectory"))
                .and_then(|call| call.arguments.values().next());
            plan.stages.push(self.checkout_stage(subdirectory));
        }
        if let Some(agent) = &def.agent
            && agent.is_container()
        {
            plan.stages.push(self.agent_setup_stage(agent));
        }
        if let Some(tools) = &def.tools
            && !tools.tools.is_empty()
        {
            plan.stages.push(self.tool_install_stage(tools));
        }
        for stage in def.stage_list() {
            let lowered = self.lower_stage(stage);
            plan.stages.push(lowered);
        }
        if let Some(post) = &def.post {
            let mut stage = PlanStage::synthetic(POST_ACTIONS_STAGE, Vec::new());
            stage.post = self.lower_post(post);
            plan.stages.push(ExecutionNode::Stage(self.rewrite_stage(stage)));
        }

        (self.errors.error_count() == before).then_some(plan)
    }

    /// Lowers a bare step list
    pub fn lower_steps(&mut self, steps: &[Step]) -> Vec<ExecutionNode> {
        steps.iter().map(|s| self.lower_step(s)).collect()
    }

    fn rewrite_step(&self, mut step: PlanStep) -> PlanStep {
        for rewriter in self.rewriters {
            step = rewriter.rewrite_step(step);
        }
        step
    }

    fn rewrite_branch(&self, mut branch: PlanSequence) -> PlanSequence {
        for rewriter in self.rewriters {
            branch = rewriter.rewrite_branch(branch);
        }
        branch
    }

    fn rewrite_stage(&self, mut stage: PlanStage) -> PlanStage {
        for rewriter in self.rewriters {
            stage = rewriter.rewrite_stage(stage);
        }
        stage
    }

    fn lower_arguments(&self, kind: DescriptorKind, name: &str, arguments: &Arguments) -> Vec<PlanArgument> {
        match arguments {
            Arguments::Single(value) => {
                let target = self
                    .lookup
                    .lookup(kind, name)
                    .and_then(|d| d.single_argument_target().map(|p| p.name.clone()));
                vec![PlanArgument {
                    name: target,
                    value: value.into(),
                }]
            }
            Arguments::Positional(values) => values
                .iter()
                .map(|v| PlanArgument {
                    name: None,
                    value: v.into(),
                })
                .collect(),
            Arguments::Named(args) => args
                .iter()
                .map(|a| PlanArgument::named(a.key.clone(), (&a.value).into()))
                .collect(),
        }
    }

    fn lower_calls(&self, kind: DescriptorKind, calls: &[MethodCall]) -> Vec<PlanCall> {
        calls
            .iter()
            .map(|call| PlanCall {
                name: call.name.clone(),
                arguments: self.lower_arguments(kind, &call.name, &call.arguments),
            })
            .collect()
    }

    fn lower_agent(&self, agent: &Agent) -> PlanCall {
        PlanCall {
            name: agent.agent_type.clone(),
            arguments: self.lower_arguments(DescriptorKind::Agent, &agent.agent_type, &agent.arguments),
        }
    }

    fn lower_step(&mut self, step: &Step) -> ExecutionNode {
        if let Step::Script(block) = step {
            return ExecutionNode::Script {
                text: block.text.clone(),
            };
        }
        let name = step.name();
        if self.lookup.lookup(DescriptorKind::Step, name).is_none() {
            self.errors
                .lowering(step.location(), format!("Unknown step \"{name}\""));
        }
        let arguments = step
            .arguments()
            .map(|a| self.lower_arguments(DescriptorKind::Step, name, a))
            .unwrap_or_default();
        let children = self.lower_steps(step.children());
        let lowered = PlanStep {
            name: name.to_string(),
            arguments,
            children,
        };
        ExecutionNode::Step(self.rewrite_step(lowered))
    }

    fn lower_branch(&mut self, branch: &Branch) -> PlanSequence {
        let children = self.lower_steps(&branch.steps);
        self.rewrite_branch(PlanSequence {
            name: branch.name.clone(),
            children,
        })
    }

    fn synthetic_step(&self, step: PlanStep) -> ExecutionNode {
        ExecutionNode::Step(self.rewrite_step(step))
    }

    fn synthetic_stage(&self, name: &str, steps: Vec<ExecutionNode>) -> ExecutionNode {
        let branch = self.rewrite_branch(PlanSequence {
            name: crate::ast::steps::DEFAULT_BRANCH.to_string(),
            children: steps,
        });
        let stage = PlanStage::synthetic(name, vec![ExecutionNode::Sequence(branch)]);
        ExecutionNode::Stage(self.rewrite_stage(stage))
    }

    fn checkout_stage(&self, subdirectory: Option<&Value>) -> ExecutionNode {
        let checkout = self.synthetic_step(PlanStep {
            name: "checkout".to_string(),
            arguments: vec![PlanArgument::named("scm", PlanValue::Expression("scm".to_string()))],
            children: Vec::new(),
        });
        let step = match subdirectory {
            Some(path) => self.synthetic_step(PlanStep {
                name: "dir".to_string(),
                arguments: vec![PlanArgument::named("path", path.into())],
                children: vec![checkout],
            }),
            None => checkout,
        };
        self.synthetic_stage(CHECKOUT_STAGE, vec![step])
    }

    fn agent_setup_stage(&self, agent: &Agent) -> ExecutionNode {
        let call = self.lower_agent(agent);
        let step = self.synthetic_step(PlanStep {
            name: call.name,
            arguments: call.arguments,
            children: Vec::new(),
        });
        self.synthetic_stage(AGENT_SETUP_STAGE, vec![step])
    }

    fn tool_install_stage(&self, tools: &Tools) -> ExecutionNode {
        let steps = tools
            .tools
            .iter()
            .map(|tool| {
                self.synthetic_step(PlanStep {
                    name: "tool".to_string(),
                    arguments: vec![
                        PlanArgument::named("name", (&tool.value).into()),
                        PlanArgument::named(
                            "type",
                            PlanValue::Literal(serde_json::Value::String(tool.key.clone())),
                        ),
                    ],
                    children: Vec::new(),
                })
            })
            .collect();
        self.synthetic_stage(TOOL_INSTALL_STAGE, steps)
    }

    fn lower_environment(&mut self, environment: &Environment) -> Vec<LazyVariable> {
        let siblings: HashSet<&str> = environment.entries.iter().map(|e| e.key.as_str()).collect();
        let variables: Vec<LazyVariable> = environment
            .entries
            .iter()
            .map(|entry| match &entry.value {
                EnvironmentValue::Value(value) => LazyVariable {
                    name: entry.key.clone(),
                    value: LazyValue::Value(value.into()),
                    references: references(value, &entry.key, &siblings),
                },
                EnvironmentValue::Function(call) => LazyVariable {
                    name: entry.key.clone(),
                    value: LazyValue::Function {
                        name: call.name.clone(),
                        arguments: call.args.iter().map(PlanValue::from).collect(),
                    },
                    references: Vec::new(),
                },
            })
            .collect();
        if let Some(cycle) = find_cycle(&variables) {
            self.errors.lowering(
                environment.location(),
                format!("Environment variable reference cycle: {}", cycle.join(" -> ")),
            );
        }
        variables
    }

    fn lower_condition(&self, condition: &WhenCondition) -> PlanCondition {
        match condition {
            WhenCondition::Leaf { name, arguments, .. } => PlanCondition::Leaf {
                name: name.clone(),
                arguments: self.lower_arguments(DescriptorKind::WhenCondition, name, arguments),
            },
            WhenCondition::Expression { text, .. } => PlanCondition::Expression { text: text.clone() },
            WhenCondition::Composite { name, children, .. } => PlanCondition::Composite {
                name: name.clone(),
                children: children.iter().map(|c| self.lower_condition(c)).collect(),
            },
        }
    }

    fn lower_when(&self, when: &When) -> PlanWhen {
        PlanWhen {
            conditions: when.conditions.iter().map(|c| self.lower_condition(c)).collect(),
            before_agent: when.before_agent,
            before_input: when.before_input,
            before_options: when.before_options,
        }
    }

    fn lower_input(&self, input: &StageInput) -> PlanInput {
        let optional = [
            ("id", &input.id),
            ("ok", &input.ok),
            ("submitter", &input.submitter),
            ("submitterParameter", &input.submitter_parameter),
        ];
        PlanInput {
            message: (&input.message).into(),
            fields: optional
                .into_iter()
                .filter_map(|(name, value)| value.as_ref().map(|v| PlanArgument::named(name, v.into())))
                .collect(),
            parameters: input
                .parameters
                .as_ref()
                .map(|p| self.lower_calls(DescriptorKind::Parameter, &p.parameters))
                .unwrap_or_default(),
        }
    }

    fn lower_post(&mut self, post: &Post) -> Vec<PlanPost> {
        post.conditions
            .iter()
            .map(|condition| PlanPost {
                condition: condition.condition.clone(),
                branch: self.lower_branch(&condition.branch),
            })
            .collect()
    }

    fn lower_matrix(&mut self, matrix: &Matrix) -> Vec<ExecutionNode> {
        let inner: Vec<ExecutionNode> = matrix.stages.stages.iter().map(|s| self.lower_stage(s)).collect();
        matrix
            .cells()
            .into_iter()
            .map(|cell| {
                let mut stage = PlanStage::new(cell_name(&cell));
                stage.environment = cell
                    .iter()
                    .map(|(axis, value)| LazyVariable::literal(axis.clone(), value))
                    .collect();
                stage.children = inner.clone();
                ExecutionNode::Stage(self.rewrite_stage(stage))
            })
            .collect()
    }

    fn lower_body(&mut self, stage: &Stage) -> Vec<ExecutionNode> {
        let fail_fast = stage.fail_fast || self.always_fail_fast;
        if stage.has_legacy_branches() {
            let children = stage
                .branches
                .iter()
                .map(|b| ExecutionNode::Sequence(self.lower_branch(b)))
                .collect();
            return vec![ExecutionNode::Parallel { fail_fast, children }];
        }
        if let Some(branch) = stage.branches.first() {
            return vec![ExecutionNode::Sequence(self.lower_branch(branch))];
        }
        if let Some(parallel) = &stage.parallel {
            let children = parallel.stages.iter().map(|s| self.lower_stage(s)).collect();
            return vec![ExecutionNode::Parallel { fail_fast, children }];
        }
        if let Some(stages) = &stage.stages {
            let children = stages.stages.iter().map(|s| self.lower_stage(s)).collect();
            return vec![ExecutionNode::Sequence(PlanSequence {
                name: stage.name.clone(),
                children,
            })];
        }
        if let Some(matrix) = &stage.matrix {
            let children = self.lower_matrix(matrix);
            return vec![ExecutionNode::Parallel { fail_fast, children }];
        }
        Vec::new()
    }

    fn lower_stage(&mut self, stage: &Stage) -> ExecutionNode {
        let mut plan = PlanStage::new(stage.name.clone());
        plan.agent = stage.agent.as_ref().map(|a| self.lower_agent(a));
        plan.when = stage.when.as_ref().map(|w| self.lower_when(w));
        plan.environment = stage
            .environment
            .as_ref()
            .map(|e| self.lower_environment(e))
            .unwrap_or_default();
        plan.tools = stage
            .tools
            .as_ref()
            .map(|t| {
                t.tools
                    .iter()
                    .map(|tool| PlanArgument::named(tool.key.clone(), (&tool.value).into()))
                    .collect()
            })
            .unwrap_or_default();
        plan.options = stage
            .options
            .as_ref()
            .map(|o| self.lower_calls(DescriptorKind::Option, &o.options))
            .unwrap_or_default();
        plan.input = stage.input.as_ref().map(|i| self.lower_input(i));
        plan.children = self.lower_body(stage);
        plan.post = stage.post.as_ref().map(|p| self.lower_post(p)).unwrap_or_default();
        ExecutionNode::Stage(self.rewrite_stage(plan))
    }
}

#[cfg(test)]
#[path = "lowering_tests.rs"]
mod tests;
