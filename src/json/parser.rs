//! JSON walker building the pipeline model
//!
//! Runs after the schema check, so most shape errors never reach it. It still
//! reports what it cannot map, at the JSON pointer of the offending node.

use crate::ast::builders;
use crate::ast::{
    Agent, Arguments, Axis, AxisContainer, Branch, BuildCondition, BuildParameters, Environment,
    Exclude, ExcludeAxis, Excludes, Libraries, Literal, Matrix, MethodCall, NamedArgument, Options,
    PipelineDef, Post, SourceLocation, Stage, StageInput, Stages, Step, ToolEntry, Tools, Triggers,
    Value, When, WhenCondition,
};
use crate::descriptor::DescriptorKind;
use crate::errors::ErrorCollector;
use serde_json::{Map, Value as Json};

type Object = Map<String, Json>;

/// Appends an object key to a JSON pointer
pub fn pointer_key(pointer: &str, key: &str) -> String {
    format!("{pointer}/{}", key.replace('~', "~0").replace('/', "~1"))
}

/// Appends an array index to a JSON pointer
pub fn pointer_index(pointer: &str, index: usize) -> String {
    format!("{pointer}/{index}")
}

fn at(pointer: &str) -> SourceLocation {
    SourceLocation::json(pointer)
}

/// JSON walker state
pub struct JsonParser<'e> {
    errors: &'e mut ErrorCollector,
}

impl<'e> JsonParser<'e> {
    /// Creates a walker reporting into `errors`
    pub fn new(errors: &'e mut ErrorCollector) -> Self {
        Self { errors }
    }

    fn error(&mut self, pointer: &str, message: impl Into<String>) {
        self.errors.syntax(&at(pointer), message);
    }

    fn object<'v>(&mut self, value: &'v Json, pointer: &str) -> Option<&'v Object> {
        let object = value.as_object();
        if object.is_none() {
            self.error(pointer, "Expected an object");
        }
        object
    }

    fn array<'v>(&mut self, value: &'v Json, pointer: &str) -> Option<&'v Vec<Json>> {
        let array = value.as_array();
        if array.is_none() {
            self.error(pointer, "Expected an array");
        }
        array
    }

    fn string(&mut self, object: &Object, key: &str, pointer: &str) -> Option<String> {
        match object.get(key) {
            Some(Json::String(s)) => Some(s.clone()),
            Some(_) => {
                self.error(&pointer_key(pointer, key), format!("Expected a string for \"{key}\""));
                None
            }
            None => {
                self.error(pointer, format!("Missing required property \"{key}\""));
                None
            }
        }
    }

    /// Walks a whole `{"pipeline": {...}}` document
    pub fn parse_document(&mut self, document: &Json) -> Option<PipelineDef> {
        let root = self.object(document, "")?;
        let Some(pipeline) = root.get("pipeline") else {
            self.error("", "Missing \"pipeline\" block");
            return None;
        };
        self.parse_pipeline(pipeline, "/pipeline")
    }

    fn parse_pipeline(&mut self, value: &Json, pointer: &str) -> Option<PipelineDef> {
        let object = self.object(value, pointer)?;
        let mut def = PipelineDef {
            location: at(pointer),
            ..PipelineDef::default()
        };
        for (key, section) in object {
            let p = pointer_key(pointer, key);
            match key.as_str() {
                "agent" => def.agent = self.parse_agent(section, &p),
                "stages" => def.stages = self.parse_stages(section, &p),
                "environment" => def.environment = self.parse_environment(section, &p),
                "tools" => def.tools = self.parse_tools(section, &p),
                "options" => {
                    def.options = self
                        .parse_calls(section, &p, "options", DescriptorKind::Option)
                        .map(|calls| Options::new(calls).at(at(&p)));
                }
                "triggers" => {
                    def.triggers = self
                        .parse_calls(section, &p, "triggers", DescriptorKind::Trigger)
                        .map(|calls| Triggers::new(calls).at(at(&p)));
                }
                "parameters" => def.parameters = self.parse_parameters(section, &p),
                "libraries" => def.libraries = self.parse_libraries(section, &p),
                "post" => def.post = self.parse_post(section, &p, false),
                other => self.error(&p, format!("Undefined section \"{other}\"")),
            }
        }
        Some(def)
    }

    /// Maps a `{"isLiteral", "value"}` object
    pub fn value(&mut self, value: &Json, pointer: &str) -> Option<Value> {
        let object = self.object(value, pointer)?;
        let literal = object.get("isLiteral").and_then(Json::as_bool).unwrap_or(false);
        let parsed = match (literal, object.get("value")) {
            (true, Some(Json::String(s))) => Value::literal(Literal::String(s.clone())),
            (true, Some(Json::Number(n))) => Value::literal(Literal::Number(n.clone())),
            (true, Some(Json::Bool(b))) => Value::literal(Literal::Boolean(*b)),
            (false, Some(Json::String(s))) => Value::expression(s.clone()),
            _ => {
                self.error(pointer, "Expected a literal or expression value");
                return None;
            }
        };
        Some(parsed.at(at(pointer)))
    }

    fn values(&mut self, value: &Json, pointer: &str) -> Vec<Value> {
        let Some(items) = self.array(value, pointer) else {
            return Vec::new();
        };
        items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| self.value(item, &pointer_index(pointer, i)))
            .collect()
    }

    /// Maps a single value, a positional list or a named list
    pub fn arguments(&mut self, value: &Json, pointer: &str) -> Arguments {
        match value {
            Json::Object(_) => self.value(value, pointer).map_or_else(Arguments::none, Arguments::single),
            Json::Array(items) if items.iter().any(|i| i.get("key").is_some()) => {
                let mut named = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    let p = pointer_index(pointer, i);
                    let Some(object) = self.object(item, &p) else {
                        continue;
                    };
                    let Some(key) = self.string(object, "key", &p) else {
                        continue;
                    };
                    let Some(raw) = object.get("value") else {
                        self.error(&p, "Missing required property \"value\"");
                        continue;
                    };
                    if let Some(value) = self.value(raw, &pointer_key(&p, "value")) {
                        named.push(NamedArgument::new(key, value).at(at(&p)));
                    }
                }
                Arguments::Named(named)
            }
            Json::Array(_) => Arguments::positional(self.values(value, pointer)),
            _ => {
                self.error(pointer, "Expected arguments");
                Arguments::none()
            }
        }
    }

    fn optional_arguments(&mut self, object: &Object, pointer: &str) -> Arguments {
        match object.get("arguments") {
            Some(args) => self.arguments(args, &pointer_key(pointer, "arguments")),
            None => Arguments::none(),
        }
    }

    fn parse_agent(&mut self, value: &Json, pointer: &str) -> Option<Agent> {
        let object = self.object(value, pointer)?;
        let agent_type = self.string(object, "type", pointer)?;
        let arguments = self.optional_arguments(object, pointer);
        Some(Agent::new(agent_type, arguments).at(at(pointer)))
    }

    fn parse_stages(&mut self, value: &Json, pointer: &str) -> Option<Stages> {
        let items = self.array(value, pointer)?;
        let stages = items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| self.parse_stage(item, &pointer_index(pointer, i)))
            .collect();
        Some(Stages::new(stages).at(at(pointer)))
    }

    fn parse_stage(&mut self, value: &Json, pointer: &str) -> Option<Stage> {
        let object = self.object(value, pointer)?;
        let name = self.string(object, "name", pointer)?;
        let mut stage = Stage::new(name).at(at(pointer));
        for (key, section) in object {
            let p = pointer_key(pointer, key);
            match key.as_str() {
                "name" => {}
                "agent" => stage.agent = self.parse_agent(section, &p),
                "when" => stage.when = self.parse_when(section, &p),
                "environment" => stage.environment = self.parse_environment(section, &p),
                "tools" => stage.tools = self.parse_tools(section, &p),
                "options" => {
                    stage.options = self
                        .parse_calls(section, &p, "options", DescriptorKind::Option)
                        .map(|calls| Options::new(calls).in_stage().at(at(&p)));
                }
                "input" => stage.input = self.parse_input(section, &p),
                "post" => stage.post = self.parse_post(section, &p, true),
                "failFast" => match section.as_bool() {
                    Some(flag) => stage.fail_fast = flag,
                    None => self.error(&p, "Expected a boolean with failFast"),
                },
                "branches" => {
                    if let Some(items) = self.array(section, &p) {
                        stage.branches = items
                            .iter()
                            .enumerate()
                            .filter_map(|(i, item)| self.parse_branch(item, &pointer_index(&p, i)))
                            .collect();
                    }
                }
                "parallel" => stage.parallel = self.parse_stages(section, &p),
                "stages" => stage.stages = self.parse_stages(section, &p),
                "matrix" => stage.matrix = self.parse_matrix(section, &p),
                other => self.error(&p, format!("Unknown stage section \"{other}\"")),
            }
        }
        Some(stage)
    }

    fn parse_branch(&mut self, value: &Json, pointer: &str) -> Option<Branch> {
        let object = self.object(value, pointer)?;
        let name = self.string(object, "name", pointer)?;
        let steps = match object.get("steps") {
            Some(steps) => self.parse_step_list(steps, &pointer_key(pointer, "steps")),
            None => Vec::new(),
        };
        Some(Branch::new(name, steps).at(at(pointer)))
    }

    /// Maps an array of step objects
    pub fn parse_step_list(&mut self, value: &Json, pointer: &str) -> Vec<Step> {
        let Some(items) = self.array(value, pointer) else {
            return Vec::new();
        };
        items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| self.parse_step(item, &pointer_index(pointer, i)))
            .collect()
    }

    fn parse_step(&mut self, value: &Json, pointer: &str) -> Option<Step> {
        let object = self.object(value, pointer)?;
        let name = self.string(object, "name", pointer)?;
        let arguments = self.optional_arguments(object, pointer);
        let children = object
            .get("children")
            .map(|children| self.parse_step_list(children, &pointer_key(pointer, "children")));
        Some(builders::step(&name, arguments, children, at(pointer)))
    }

    fn parse_environment(&mut self, value: &Json, pointer: &str) -> Option<Environment> {
        let items = self.array(value, pointer)?;
        let mut entries = Vec::new();
        for (i, item) in items.iter().enumerate() {
            let p = pointer_index(pointer, i);
            let Some(object) = self.object(item, &p) else {
                continue;
            };
            let Some(key) = self.string(object, "key", &p) else {
                continue;
            };
            let vp = pointer_key(&p, "value");
            match object.get("value") {
                Some(Json::Object(inner)) if inner.contains_key("internalFunction") => {
                    let Some(function) = self.string(inner, "internalFunction", &vp) else {
                        continue;
                    };
                    let args = match inner.get("arguments") {
                        Some(args) => self.values(args, &pointer_key(&vp, "arguments")),
                        None => Vec::new(),
                    };
                    entries.push(builders::environment_function(&key, &function, args, at(&p)));
                }
                Some(raw) => {
                    if let Some(value) = self.value(raw, &vp) {
                        entries.push(builders::environment_value(&key, value, at(&p)));
                    }
                }
                None => self.error(&p, "Expected name=value pairs"),
            }
        }
        Some(Environment::new(entries).at(at(pointer)))
    }

    fn parse_tools(&mut self, value: &Json, pointer: &str) -> Option<Tools> {
        let items = self.array(value, pointer)?;
        let mut tools = Vec::new();
        for (i, item) in items.iter().enumerate() {
            let p = pointer_index(pointer, i);
            let Some(object) = self.object(item, &p) else {
                continue;
            };
            let Some(key) = self.string(object, "key", &p) else {
                continue;
            };
            let Some(raw) = object.get("value") else {
                self.error(&p, "Missing required property \"value\"");
                continue;
            };
            if let Some(value) = self.value(raw, &pointer_key(&p, "value")) {
                tools.push(ToolEntry::new(key, value).at(at(&p)));
            }
        }
        Some(Tools::new(tools).at(at(pointer)))
    }

    fn parse_calls(
        &mut self,
        value: &Json,
        pointer: &str,
        wrapper: &str,
        kind: DescriptorKind,
    ) -> Option<Vec<MethodCall>> {
        let object = self.object(value, pointer)?;
        let Some(list) = object.get(wrapper) else {
            self.error(pointer, format!("Missing required property \"{wrapper}\""));
            return None;
        };
        let lp = pointer_key(pointer, wrapper);
        let items = self.array(list, &lp)?;
        let mut calls = Vec::new();
        for (i, item) in items.iter().enumerate() {
            let p = pointer_index(&lp, i);
            let Some(object) = self.object(item, &p) else {
                continue;
            };
            let Some(name) = self.string(object, "name", &p) else {
                continue;
            };
            let arguments = self.optional_arguments(object, &p);
            calls.push(MethodCall::new(kind, name, arguments).at(at(&p)));
        }
        Some(calls)
    }

    fn parse_parameters(&mut self, value: &Json, pointer: &str) -> Option<BuildParameters> {
        self.parse_calls(value, pointer, "parameters", DescriptorKind::Parameter)
            .map(|calls| BuildParameters::new(calls).at(at(pointer)))
    }

    fn parse_libraries(&mut self, value: &Json, pointer: &str) -> Option<Libraries> {
        let object = self.object(value, pointer)?;
        let Some(list) = object.get("libraries") else {
            self.error(pointer, "Missing required property \"libraries\"");
            return None;
        };
        let libraries = self.values(list, &pointer_key(pointer, "libraries"));
        Some(Libraries::new(libraries).at(at(pointer)))
    }

    fn parse_post(&mut self, value: &Json, pointer: &str, in_stage: bool) -> Option<Post> {
        let object = self.object(value, pointer)?;
        let cp = pointer_key(pointer, "conditions");
        let items = self.array(object.get("conditions").unwrap_or(&Json::Null), &cp)?;
        let mut conditions = Vec::new();
        for (i, item) in items.iter().enumerate() {
            let p = pointer_index(&cp, i);
            let Some(entry) = self.object(item, &p) else {
                continue;
            };
            let Some(name) = self.string(entry, "condition", &p) else {
                continue;
            };
            let mut condition = BuildCondition::new(name, Vec::new()).at(at(&p));
            if let Some(branch) = entry.get("branch")
                && let Some(branch) = self.parse_branch(branch, &pointer_key(&p, "branch"))
            {
                condition.branch = branch;
            }
            conditions.push(condition);
        }
        let post = if in_stage {
            Post::stage(conditions)
        } else {
            Post::build(conditions)
        };
        Some(post.at(at(pointer)))
    }

    fn parse_when(&mut self, value: &Json, pointer: &str) -> Option<When> {
        let object = self.object(value, pointer)?;
        let mut when = When::default().at(at(pointer));
        for (key, field) in object {
            let p = pointer_key(pointer, key);
            match key.as_str() {
                "conditions" => {
                    if let Some(items) = self.array(field, &p) {
                        when.conditions = items
                            .iter()
                            .enumerate()
                            .filter_map(|(i, c)| self.parse_when_condition(c, &pointer_index(&p, i)))
                            .collect();
                    }
                }
                "beforeAgent" | "beforeInput" | "beforeOptions" => {
                    let Some(flag) = field.as_bool() else {
                        self.error(&p, format!("Expected a boolean with {key}"));
                        continue;
                    };
                    match key.as_str() {
                        "beforeAgent" => when.before_agent = flag,
                        "beforeInput" => when.before_input = flag,
                        _ => when.before_options = flag,
                    }
                }
                other => self.error(&p, format!("Unknown when section \"{other}\"")),
            }
        }
        Some(when)
    }

    fn parse_when_condition(&mut self, value: &Json, pointer: &str) -> Option<WhenCondition> {
        let object = self.object(value, pointer)?;
        let name = self.string(object, "name", pointer)?;
        let arguments = self.optional_arguments(object, pointer);
        let mut children = None;
        if let Some(list) = object.get("children") {
            let cp = pointer_key(pointer, "children");
            let items = self.array(list, &cp).map(Vec::as_slice).unwrap_or_default();
            children = Some(
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, c)| self.parse_when_condition(c, &pointer_index(&cp, i)))
                    .collect(),
            );
        }
        Some(builders::when_condition(&name, arguments, children, at(pointer)))
    }

    fn parse_input(&mut self, value: &Json, pointer: &str) -> Option<StageInput> {
        let object = self.object(value, pointer)?;
        let mut input = StageInput::new(Value::literal("")).at(at(pointer));
        if !object.contains_key("message") {
            self.error(pointer, "Missing required parameter \"message\" for input");
        }
        for (key, field) in object {
            let p = pointer_key(pointer, key);
            if key == "parameters" {
                input.parameters = self.parse_parameters(field, &p);
                continue;
            }
            let Some(value) = self.value(field, &p) else {
                continue;
            };
            if let Err(message) = builders::input_field(&mut input, key, value) {
                self.error(&p, message);
            }
        }
        Some(input)
    }

    fn parse_matrix(&mut self, value: &Json, pointer: &str) -> Option<Matrix> {
        let object = self.object(value, pointer)?;
        let mut matrix = Matrix::new(AxisContainer::default(), Stages::default()).at(at(pointer));
        for (key, field) in object {
            let p = pointer_key(pointer, key);
            match key.as_str() {
                "axes" => {
                    let Some(items) = self.array(field, &p) else {
                        continue;
                    };
                    let mut axes = Vec::new();
                    for (i, item) in items.iter().enumerate() {
                        let ap = pointer_index(&p, i);
                        if let Some((name, values, _)) = self.axis_fields(item, &ap) {
                            axes.push(Axis::new(name, values).at(at(&ap)));
                        }
                    }
                    matrix.axes = AxisContainer::new(axes).at(at(&p));
                }
                "excludes" => matrix.excludes = self.parse_excludes(field, &p),
                "stages" => {
                    if let Some(stages) = self.parse_stages(field, &p) {
                        matrix.stages = stages;
                    }
                }
                other => self.error(&p, format!("Unknown matrix section \"{other}\"")),
            }
        }
        Some(matrix)
    }

    fn parse_excludes(&mut self, value: &Json, pointer: &str) -> Option<Excludes> {
        let items = self.array(value, pointer)?;
        let mut excludes = Vec::new();
        for (i, item) in items.iter().enumerate() {
            let p = pointer_index(pointer, i);
            let Some(object) = self.object(item, &p) else {
                continue;
            };
            let ep = pointer_key(&p, "exclude");
            let Some(axes) = self.array(object.get("exclude").unwrap_or(&Json::Null), &ep) else {
                continue;
            };
            let mut exclude_axes = Vec::new();
            for (j, axis) in axes.iter().enumerate() {
                let ap = pointer_index(&ep, j);
                if let Some((name, values, inverse)) = self.axis_fields(axis, &ap) {
                    let mut exclude_axis = ExcludeAxis::new(name, values).at(at(&ap));
                    exclude_axis.inverse = inverse;
                    exclude_axes.push(exclude_axis);
                }
            }
            excludes.push(Exclude::new(exclude_axes).at(at(&p)));
        }
        Some(Excludes::new(excludes).at(at(pointer)))
    }

    fn axis_fields(&mut self, value: &Json, pointer: &str) -> Option<(String, Vec<Value>, bool)> {
        let object = self.object(value, pointer)?;
        let name = self.string(object, "name", pointer)?;
        if let Some(values) = object.get("values") {
            return Some((name, self.values(values, &pointer_key(pointer, "values")), false));
        }
        if let Some(values) = object.get("notValues") {
            return Some((name, self.values(values, &pointer_key(pointer, "notValues")), true));
        }
        self.error(pointer, "Missing required property \"values\"");
        None
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
