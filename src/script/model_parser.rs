//! Walks the host syntax tree into the pipeline model
//!
//! Recursive descent over [`Statement`]s. Problems are reported to the
//! [`ErrorCollector`] with the offending location and parsing continues, so
//! one pass surfaces as many errors as possible.

use super::syntax::{Arg, Call, Closure, Expr, ExprKind, Statement, StatementKind};
use crate::ast::builders::{self, INTERNAL_FUNCTIONS};
use crate::ast::{
    Agent, Arguments, Axis, AxisContainer, Branch, BuildCondition, BuildParameters, Environment,
    Exclude, ExcludeAxis, Excludes, Libraries, Literal, Matrix, MethodCall, NamedArgument, Options,
    PipelineDef, Post, SourceLocation, Stage, StageInput, Stages, Step, ToolEntry, Tools, Triggers,
    Value, When, WhenCondition,
};
use crate::descriptor::DescriptorKind;
use crate::errors::ErrorCollector;

/// Sections accepted directly inside `pipeline { }`
pub const PIPELINE_SECTIONS: &[&str] = &[
    "agent",
    "stages",
    "environment",
    "options",
    "triggers",
    "parameters",
    "tools",
    "post",
    "libraries",
];

/// Sections accepted inside `stage('name') { }`
pub const STAGE_SECTIONS: &[&str] = &[
    "agent",
    "when",
    "environment",
    "tools",
    "options",
    "input",
    "post",
    "steps",
    "parallel",
    "stages",
    "matrix",
    "failFast",
];

const WHEN_FLAGS: &[&str] = &["beforeAgent", "beforeInput", "beforeOptions"];

/// Converts an expression to a model value
pub fn value_of(expr: &Expr) -> Value {
    let literal = match &expr.kind {
        ExprKind::Str(s) => Some(Literal::String(s.clone())),
        ExprKind::Bool(b) => Some(Literal::Boolean(*b)),
        ExprKind::Number(n) => serde_json::from_str::<serde_json::Number>(n)
            .ok()
            .map(Literal::Number),
        _ => None,
    };
    match literal {
        Some(literal) => Value::literal(literal).at(expr.location.clone()),
        None => Value::expression(expr.text.clone()).at(expr.location.clone()),
    }
}

/// Model parser state
pub struct ModelParser<'e> {
    errors: &'e mut ErrorCollector,
}

impl<'e> ModelParser<'e> {
    /// Creates a parser reporting into `errors`
    pub fn new(errors: &'e mut ErrorCollector) -> Self {
        Self { errors }
    }

    fn error(&mut self, location: &SourceLocation, message: impl Into<String>) {
        self.errors.syntax(location, message);
    }

    /// Stores a section, reporting a duplicate if one was already seen
    fn once<T>(&mut self, slot: &mut Option<T>, value: T, name: &str, location: &SourceLocation) {
        if slot.is_some() {
            self.error(location, format!("Multiple occurrences of the {name} section"));
        } else {
            *slot = Some(value);
        }
    }

    /// Closure of a section call, reporting its absence
    fn block<'c>(&mut self, call: &'c Call) -> Option<&'c Closure> {
        if call.closure.is_none() {
            self.error(&call.location, format!("Expected a block for \"{}\"", call.name));
        }
        call.closure.as_ref()
    }

    /// Parses the top-level statements of a script
    pub fn parse_script(&mut self, statements: &[Statement]) -> Option<PipelineDef> {
        let mut pipeline: Option<PipelineDef> = None;
        for stmt in statements {
            match &stmt.kind {
                StatementKind::Call(call) if call.name == "pipeline" && call.args.is_empty() => {
                    let Some(closure) = self.block(call) else {
                        continue;
                    };
                    let parsed = self.parse_pipeline(closure, &call.location);
                    self.once(&mut pipeline, parsed, "pipeline", &call.location);
                }
                _ => self.error(
                    &stmt.location,
                    format!(
                        "Only a pipeline block is allowed at the top level, found: {}",
                        first_line(&stmt.text)
                    ),
                ),
            }
        }
        if pipeline.is_none() {
            self.error(&SourceLocation::script(1, 1), "Missing \"pipeline\" block");
        }
        pipeline
    }

    fn parse_pipeline(&mut self, closure: &Closure, location: &SourceLocation) -> PipelineDef {
        let mut def = PipelineDef {
            location: location.clone(),
            ..PipelineDef::default()
        };
        for stmt in &closure.statements {
            let StatementKind::Call(call) = &stmt.kind else {
                self.error(
                    &stmt.location,
                    format!("Not a valid section definition: \"{}\"", first_line(&stmt.text)),
                );
                continue;
            };
            let loc = &call.location;
            match call.name.as_str() {
                "agent" => {
                    if let Some(agent) = self.parse_agent(call) {
                        self.once(&mut def.agent, agent, "agent", loc);
                    }
                }
                "stages" => {
                    if let Some(stages) = self.parse_stages_call(call) {
                        self.once(&mut def.stages, stages, "stages", loc);
                    }
                }
                "environment" => {
                    if let Some(env) = self.parse_environment(call) {
                        self.once(&mut def.environment, env, "environment", loc);
                    }
                }
                "options" => {
                    if let Some(options) = self.parse_options(call, false) {
                        self.once(&mut def.options, options, "options", loc);
                    }
                }
                "triggers" => {
                    if let Some(calls) = self.parse_calls(call, DescriptorKind::Trigger) {
                        let triggers = Triggers::new(calls).at(loc.clone());
                        self.once(&mut def.triggers, triggers, "triggers", loc);
                    }
                }
                "parameters" => {
                    if let Some(params) = self.parse_parameters(call) {
                        self.once(&mut def.parameters, params, "parameters", loc);
                    }
                }
                "tools" => {
                    if let Some(tools) = self.parse_tools(call) {
                        self.once(&mut def.tools, tools, "tools", loc);
                    }
                }
                "post" => {
                    if let Some(post) = self.parse_post(call, false) {
                        self.once(&mut def.post, post, "post", loc);
                    }
                }
                "libraries" => {
                    if let Some(libraries) = self.parse_libraries(call) {
                        self.once(&mut def.libraries, libraries, "libraries", loc);
                    }
                }
                other => self.error(loc, format!("Undefined section \"{other}\"")),
            }
        }
        def
    }

    /// Converts call arguments, reporting mixed named and unnamed ones
    pub fn arguments(&mut self, call: &Call) -> Arguments {
        self.arguments_of(&call.args, &call.location)
    }

    fn arguments_of(&mut self, args: &[Arg], location: &SourceLocation) -> Arguments {
        let named = args.iter().filter(|a| a.name.is_some()).count();
        if named > 0 && named < args.len() {
            self.error(location, "Can't mix named and unnamed parameter definition");
        }
        match args {
            [] => Arguments::none(),
            [single] if single.name.is_none() => Arguments::single(value_of(&single.value)),
            _ if named == args.len() => Arguments::Named(
                args.iter()
                    .map(|a| {
                        NamedArgument::new(a.name.clone().unwrap_or_default(), value_of(&a.value))
                            .at(a.location.clone())
                    })
                    .collect(),
            ),
            _ => Arguments::positional(args.iter().map(|a| value_of(&a.value)).collect()),
        }
    }

    fn parse_agent(&mut self, call: &Call) -> Option<Agent> {
        let loc = call.location.clone();
        if let Some(closure) = &call.closure {
            let mut calls = closure.statements.iter();
            let (Some(first), None) = (calls.next(), calls.next()) else {
                self.error(&loc, "Expected exactly one agent type in the agent block");
                return None;
            };
            let StatementKind::Call(inner) = &first.kind else {
                self.error(&first.location, "Expected an agent type");
                return None;
            };
            let arguments = match &inner.closure {
                Some(body) if inner.args.is_empty() => self.key_value_block(body),
                Some(_) => {
                    self.error(&inner.location, "Can't mix agent arguments and a block");
                    self.arguments(inner)
                }
                None => self.arguments(inner),
            };
            return Some(Agent::new(inner.name.clone(), arguments).at(loc));
        }

        match call.args.as_slice() {
            [arg] if arg.name.is_none() => match &arg.value.kind {
                ExprKind::Ident(name) | ExprKind::Str(name) => {
                    Some(Agent::new(name.clone(), Arguments::none()).at(loc))
                }
                _ => {
                    self.error(&arg.location, "Expected an agent type");
                    None
                }
            },
            _ => {
                self.error(&loc, "Expected an agent type");
                None
            }
        }
    }

    /// Reads `{ key value; ... }` into named arguments
    fn key_value_block(&mut self, closure: &Closure) -> Arguments {
        let mut pairs = Vec::new();
        for stmt in &closure.statements {
            match &stmt.kind {
                StatementKind::Call(c) if c.closure.is_none() && c.args.len() == 1 && c.args[0].name.is_none() => {
                    pairs.push(
                        NamedArgument::new(c.name.clone(), value_of(&c.args[0].value))
                            .at(c.location.clone()),
                    );
                }
                _ => self.error(&stmt.location, "Expected name=value pairs"),
            }
        }
        Arguments::Named(pairs)
    }

    fn parse_stages_call(&mut self, call: &Call) -> Option<Stages> {
        let closure = self.block(call)?;
        Some(self.parse_stage_list(closure).at(call.location.clone()))
    }

    fn parse_stage_list(&mut self, closure: &Closure) -> Stages {
        let mut stages = Vec::new();
        for stmt in &closure.statements {
            match &stmt.kind {
                StatementKind::Call(call) if call.name == "stage" => {
                    if let Some(stage) = self.parse_stage(call) {
                        stages.push(stage);
                    }
                }
                _ => self.error(&stmt.location, "Expected a stage"),
            }
        }
        Stages::new(stages)
    }

    fn parse_stage(&mut self, call: &Call) -> Option<Stage> {
        let loc = &call.location;
        let name = match call.args.as_slice() {
            [arg] if arg.name.is_none() => match &arg.value.kind {
                ExprKind::Str(name) => name.clone(),
                _ => {
                    self.error(&arg.location, "Stage name must be a string literal");
                    arg.value.text.clone()
                }
            },
            _ => {
                self.error(loc, "Expected a stage name");
                return None;
            }
        };
        let closure = self.block(call)?;

        let mut stage = Stage::new(name).at(loc.clone());
        let mut steps_seen = false;
        let mut fail_fast_seen = false;
        for stmt in &closure.statements {
            let StatementKind::Call(section) = &stmt.kind else {
                self.error(
                    &stmt.location,
                    format!("Not a valid stage section definition: \"{}\"", first_line(&stmt.text)),
                );
                continue;
            };
            let sloc = &section.location;
            match section.name.as_str() {
                "agent" => {
                    if let Some(agent) = self.parse_agent(section) {
                        self.once(&mut stage.agent, agent, "agent", sloc);
                    }
                }
                "when" => {
                    if let Some(when) = self.parse_when(section) {
                        self.once(&mut stage.when, when, "when", sloc);
                    }
                }
                "environment" => {
                    if let Some(env) = self.parse_environment(section) {
                        self.once(&mut stage.environment, env, "environment", sloc);
                    }
                }
                "tools" => {
                    if let Some(tools) = self.parse_tools(section) {
                        self.once(&mut stage.tools, tools, "tools", sloc);
                    }
                }
                "options" => {
                    if let Some(options) = self.parse_options(section, true) {
                        self.once(&mut stage.options, options, "options", sloc);
                    }
                }
                "input" => {
                    if let Some(input) = self.parse_input(section) {
                        self.once(&mut stage.input, input, "input", sloc);
                    }
                }
                "post" => {
                    if let Some(post) = self.parse_post(section, true) {
                        self.once(&mut stage.post, post, "post", sloc);
                    }
                }
                "steps" => {
                    if steps_seen {
                        self.error(sloc, "Multiple occurrences of the steps section");
                    } else if let Some(closure) = self.block(section) {
                        steps_seen = true;
                        let (branches, fail_fast) = self.parse_steps_block(closure, sloc);
                        stage.branches = branches;
                        stage.fail_fast |= fail_fast;
                    }
                }
                "parallel" => {
                    if let Some(parallel) = self.parse_stages_call(section) {
                        self.once(&mut stage.parallel, parallel, "parallel", sloc);
                    }
                }
                "stages" => {
                    if let Some(stages) = self.parse_stages_call(section) {
                        self.once(&mut stage.stages, stages, "stages", sloc);
                    }
                }
                "matrix" => {
                    if let Some(matrix) = self.parse_matrix(section) {
                        self.once(&mut stage.matrix, matrix, "matrix", sloc);
                    }
                }
                "failFast" => {
                    if fail_fast_seen {
                        self.error(sloc, "Multiple occurrences of the failFast section");
                    }
                    fail_fast_seen = true;
                    match self.single_bool(section) {
                        Some(flag) => stage.fail_fast = flag,
                        None => self.error(sloc, "Expected a boolean with failFast"),
                    }
                }
                other => self.error(sloc, format!("Unknown stage section \"{other}\"")),
            }
        }
        Some(stage)
    }

    fn single_bool(&self, call: &Call) -> Option<bool> {
        match call.args.as_slice() {
            [arg] if arg.name.is_none() => match arg.value.kind {
                ExprKind::Bool(flag) => Some(flag),
                _ => None,
            },
            _ => None,
        }
    }

    /// Parses a `steps { }` body into the default branch, or into legacy
    /// parallel branches when its only statement is `parallel name: { }`.
    fn parse_steps_block(&mut self, closure: &Closure, location: &SourceLocation) -> (Vec<Branch>, bool) {
        if let [only] = closure.statements.as_slice()
            && let StatementKind::Call(call) = &only.kind
            && call.name == "parallel"
            && call.closure.is_none()
            && !call.args.is_empty()
            && call.all_named()
            && call
                .args
                .iter()
                .any(|a| matches!(a.value.kind, ExprKind::Closure(_)))
        {
            return self.parse_legacy_parallel(call);
        }
        let steps = self.parse_step_list(&closure.statements);
        (vec![Branch::default_with(steps).at(location.clone())], false)
    }

    fn parse_legacy_parallel(&mut self, call: &Call) -> (Vec<Branch>, bool) {
        let mut branches = Vec::new();
        let mut fail_fast = false;
        for arg in &call.args {
            let name = arg.name.clone().unwrap_or_default();
            match &arg.value.kind {
                ExprKind::Closure(body) => {
                    let steps = self.parse_step_list(&body.statements);
                    branches.push(Branch::new(name, steps).at(arg.location.clone()));
                }
                ExprKind::Bool(flag) if name == "failFast" => fail_fast = *flag,
                _ => self.error(&arg.location, "Expected a block"),
            }
        }
        (branches, fail_fast)
    }

    /// Parses a list of step statements
    pub fn parse_step_list(&mut self, statements: &[Statement]) -> Vec<Step> {
        statements.iter().filter_map(|s| self.parse_step(s)).collect()
    }

    fn parse_step(&mut self, stmt: &Statement) -> Option<Step> {
        let StatementKind::Call(call) = &stmt.kind else {
            self.error(&stmt.location, "Expected a step");
            return None;
        };
        let loc = call.location.clone();
        if call.name == "script" && call.args.is_empty() {
            let Some(closure) = &call.closure else {
                self.error(&loc, "Expected a block");
                return None;
            };
            return Some(builders::script_block(&closure.raw, loc));
        }
        let arguments = self.arguments(call);
        let children = call.closure.as_ref().map(|closure| {
            if closure.has_params {
                self.error(&closure.location, "Expected a block");
            }
            self.parse_step_list(&closure.statements)
        });
        Some(builders::step(&call.name, arguments, children, loc))
    }

    fn parse_environment(&mut self, call: &Call) -> Option<Environment> {
        let closure = self.block(call)?;
        let mut entries = Vec::new();
        for stmt in &closure.statements {
            let StatementKind::Assignment { target, value } = &stmt.kind else {
                self.error(&stmt.location, "Expected name=value pairs");
                continue;
            };
            let entry = match &value.kind {
                ExprKind::Call(inner)
                    if INTERNAL_FUNCTIONS.contains(&inner.name.as_str()) && inner.closure.is_none() =>
                {
                    let args = inner.args.iter().map(|a| value_of(&a.value)).collect();
                    builders::environment_function(target, &inner.name, args, stmt.location.clone())
                }
                _ => builders::environment_value(target, value_of(value), stmt.location.clone()),
            };
            entries.push(entry);
        }
        Some(Environment::new(entries).at(call.location.clone()))
    }

    fn parse_tools(&mut self, call: &Call) -> Option<Tools> {
        let closure = self.block(call)?;
        let mut tools = Vec::new();
        for stmt in &closure.statements {
            match &stmt.kind {
                StatementKind::Call(tool)
                    if tool.closure.is_none() && tool.args.len() == 1 && tool.args[0].name.is_none() =>
                {
                    tools.push(
                        ToolEntry::new(tool.name.clone(), value_of(&tool.args[0].value))
                            .at(tool.location.clone()),
                    );
                }
                _ => self.error(
                    &stmt.location,
                    "Invalid tool declaration, expected a tool type and an installation name",
                ),
            }
        }
        Some(Tools::new(tools).at(call.location.clone()))
    }

    fn parse_calls(&mut self, call: &Call, kind: DescriptorKind) -> Option<Vec<MethodCall>> {
        let closure = self.block(call)?;
        let mut calls = Vec::new();
        for stmt in &closure.statements {
            match &stmt.kind {
                StatementKind::Call(inner) if inner.closure.is_none() => {
                    let arguments = self.arguments(inner);
                    calls.push(
                        MethodCall::new(kind, inner.name.clone(), arguments)
                            .at(inner.location.clone()),
                    );
                }
                _ => self.error(&stmt.location, format!("Expected a {kind}")),
            }
        }
        Some(calls)
    }

    fn parse_options(&mut self, call: &Call, in_stage: bool) -> Option<Options> {
        let calls = self.parse_calls(call, DescriptorKind::Option)?;
        let options = Options::new(calls).at(call.location.clone());
        Some(if in_stage { options.in_stage() } else { options })
    }

    fn parse_parameters(&mut self, call: &Call) -> Option<BuildParameters> {
        let calls = self.parse_calls(call, DescriptorKind::Parameter)?;
        Some(BuildParameters::new(calls).at(call.location.clone()))
    }

    fn parse_libraries(&mut self, call: &Call) -> Option<Libraries> {
        let closure = self.block(call)?;
        let mut libraries = Vec::new();
        for stmt in &closure.statements {
            match &stmt.kind {
                StatementKind::Call(lib)
                    if lib.name == "lib" && lib.args.len() == 1 && lib.args[0].name.is_none() =>
                {
                    libraries.push(value_of(&lib.args[0].value));
                }
                _ => self.error(&stmt.location, "Expected lib('name@version')"),
            }
        }
        Some(Libraries::new(libraries).at(call.location.clone()))
    }

    fn parse_post(&mut self, call: &Call, in_stage: bool) -> Option<Post> {
        let closure = self.block(call)?;
        let mut conditions = Vec::new();
        for stmt in &closure.statements {
            match &stmt.kind {
                StatementKind::Call(cond) if cond.args.is_empty() && cond.closure.is_some() => {
                    let steps = cond
                        .closure
                        .as_ref()
                        .map(|c| self.parse_step_list(&c.statements))
                        .unwrap_or_default();
                    let mut condition =
                        BuildCondition::new(cond.name.clone(), steps).at(cond.location.clone());
                    condition.branch.location = cond.location.clone();
                    conditions.push(condition);
                }
                _ => self.error(&stmt.location, "Expected a build condition"),
            }
        }
        let post = if in_stage {
            Post::stage(conditions)
        } else {
            Post::build(conditions)
        };
        Some(post.at(call.location.clone()))
    }

    fn parse_when(&mut self, call: &Call) -> Option<When> {
        let closure = self.block(call)?;
        let mut when = When::default().at(call.location.clone());
        for stmt in &closure.statements {
            let StatementKind::Call(cond) = &stmt.kind else {
                self.error(&stmt.location, "Expected a when condition");
                continue;
            };
            if WHEN_FLAGS.contains(&cond.name.as_str()) {
                let Some(flag) = self.single_bool(cond) else {
                    self.error(&cond.location, format!("Expected a boolean with {}", cond.name));
                    continue;
                };
                match cond.name.as_str() {
                    "beforeAgent" => when.before_agent = flag,
                    "beforeInput" => when.before_input = flag,
                    _ => when.before_options = flag,
                }
                continue;
            }
            if let Some(condition) = self.parse_when_condition(cond) {
                when.conditions.push(condition);
            }
        }
        Some(when)
    }

    fn parse_when_condition(&mut self, call: &Call) -> Option<WhenCondition> {
        let loc = call.location.clone();
        if call.name == "expression" {
            let closure = self.block(call)?;
            return Some(builders::expression_condition(&closure.raw, loc));
        }
        let children = match &call.closure {
            Some(closure) => {
                let mut children = Vec::new();
                for stmt in &closure.statements {
                    match &stmt.kind {
                        StatementKind::Call(child) => {
                            if let Some(condition) = self.parse_when_condition(child) {
                                children.push(condition);
                            }
                        }
                        _ => self.error(&stmt.location, "Expected a when condition"),
                    }
                }
                Some(children)
            }
            None => None,
        };
        let arguments = self.arguments(call);
        Some(builders::when_condition(&call.name, arguments, children, loc))
    }

    fn parse_input(&mut self, call: &Call) -> Option<StageInput> {
        let closure = self.block(call)?;
        let mut input = StageInput::new(Value::literal("")).at(call.location.clone());
        let mut has_message = false;
        for stmt in &closure.statements {
            match &stmt.kind {
                StatementKind::Call(field) if field.name == "parameters" => {
                    if let Some(params) = self.parse_parameters(field) {
                        let loc = field.location.clone();
                        self.once(&mut input.parameters, params, "parameters", &loc);
                    }
                }
                StatementKind::Call(field)
                    if field.closure.is_none() && field.args.len() == 1 && field.args[0].name.is_none() =>
                {
                    has_message |= field.name == "message";
                    let value = value_of(&field.args[0].value);
                    if let Err(message) = builders::input_field(&mut input, &field.name, value) {
                        self.error(&field.location, message);
                    }
                }
                _ => self.error(&stmt.location, "Expected name=value pairs"),
            }
        }
        if !has_message {
            self.error(&call.location, "Missing required parameter \"message\" for input");
        }
        Some(input)
    }

    fn parse_matrix(&mut self, call: &Call) -> Option<Matrix> {
        let closure = self.block(call)?;
        let mut axes: Option<AxisContainer> = None;
        let mut excludes: Option<Excludes> = None;
        let mut stages: Option<Stages> = None;
        for stmt in &closure.statements {
            let StatementKind::Call(section) = &stmt.kind else {
                self.error(&stmt.location, "Expected a matrix section");
                continue;
            };
            let sloc = &section.location;
            match section.name.as_str() {
                "axes" => {
                    if let Some(container) = self.parse_axes(section) {
                        self.once(&mut axes, container, "axes", sloc);
                    }
                }
                "excludes" => {
                    if let Some(parsed) = self.parse_excludes(section) {
                        self.once(&mut excludes, parsed, "excludes", sloc);
                    }
                }
                "stages" => {
                    if let Some(parsed) = self.parse_stages_call(section) {
                        self.once(&mut stages, parsed, "stages", sloc);
                    }
                }
                other => self.error(sloc, format!("Unknown matrix section \"{other}\"")),
            }
        }
        let mut matrix = Matrix::new(axes.unwrap_or_default(), stages.unwrap_or_default())
            .at(call.location.clone());
        matrix.excludes = excludes;
        Some(matrix)
    }

    fn parse_axes(&mut self, call: &Call) -> Option<AxisContainer> {
        let closure = self.block(call)?;
        let mut axes = Vec::new();
        for stmt in &closure.statements {
            match &stmt.kind {
                StatementKind::Call(axis) if axis.name == "axis" => {
                    if let Some((name, values, _)) = self.parse_axis_block(axis, false) {
                        axes.push(Axis::new(name, values).at(axis.location.clone()));
                    }
                }
                _ => self.error(&stmt.location, "Expected an axis"),
            }
        }
        Some(AxisContainer::new(axes).at(call.location.clone()))
    }

    fn parse_excludes(&mut self, call: &Call) -> Option<Excludes> {
        let closure = self.block(call)?;
        let mut excludes = Vec::new();
        for stmt in &closure.statements {
            let StatementKind::Call(exclude) = &stmt.kind else {
                self.error(&stmt.location, "Expected an exclude");
                continue;
            };
            if exclude.name != "exclude" {
                self.error(&exclude.location, "Expected an exclude");
                continue;
            }
            let Some(body) = self.block(exclude) else {
                continue;
            };
            let mut axes = Vec::new();
            for inner in &body.statements {
                match &inner.kind {
                    StatementKind::Call(axis) if axis.name == "axis" => {
                        if let Some((name, values, inverse)) = self.parse_axis_block(axis, true) {
                            let mut exclude_axis = ExcludeAxis::new(name, values);
                            exclude_axis.inverse = inverse;
                            axes.push(exclude_axis.at(axis.location.clone()));
                        }
                    }
                    _ => self.error(&inner.location, "Expected an axis"),
                }
            }
            excludes.push(Exclude::new(axes).at(exclude.location.clone()));
        }
        Some(Excludes::new(excludes).at(call.location.clone()))
    }

    /// Reads `axis { name 'X'; values 'a', 'b' }`; `notValues` only in excludes
    fn parse_axis_block(&mut self, call: &Call, in_exclude: bool) -> Option<(String, Vec<Value>, bool)> {
        let closure = self.block(call)?;
        let mut name: Option<String> = None;
        let mut values: Option<(Vec<Value>, bool)> = None;
        for stmt in &closure.statements {
            let StatementKind::Call(field) = &stmt.kind else {
                self.error(&stmt.location, "Expected name=value pairs");
                continue;
            };
            let floc = &field.location;
            match field.name.as_str() {
                "name" => match field.args.as_slice() {
                    [arg] if arg.name.is_none() => {
                        let value = value_of(&arg.value);
                        let axis_name = value.as_str().map_or_else(|| value.raw(), str::to_string);
                        self.once(&mut name, axis_name, "name", floc);
                    }
                    _ => self.error(floc, "Expected an axis name"),
                },
                "values" | "notValues" => {
                    let inverse = field.name == "notValues";
                    if inverse && !in_exclude {
                        self.error(floc, "notValues is only allowed in an exclude axis");
                    }
                    let list = field.args.iter().map(|a| value_of(&a.value)).collect();
                    self.once(&mut values, (list, inverse), "values", floc);
                }
                other => self.error(floc, format!("Unknown axis section \"{other}\"")),
            }
        }
        let Some(name) = name else {
            self.error(&call.location, "Missing required parameter \"name\" for axis");
            return None;
        };
        let (values, inverse) = values.unwrap_or_default();
        Some((name, values, inverse))
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default().trim()
}

#[cfg(test)]
#[path = "model_parser_tests.rs"]
mod tests;
