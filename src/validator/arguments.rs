//! Argument checks against descriptor parameter models

use crate::ast::{Arguments, Value};
use crate::descriptor::{Descriptor, ParameterModel};
use std::collections::HashSet;

fn subject(descriptor: &Descriptor) -> String {
    format!("{} \"{}\"", descriptor.kind, descriptor.name)
}

fn check_type(parameter: &ParameterModel, value: &Value) -> Option<String> {
    let literal = value.as_literal()?;
    if parameter.param_type.accepts(literal) {
        return None;
    }
    Some(format!(
        "Expecting \"{}\" for parameter \"{}\" but got \"{literal}\" instead",
        parameter.param_type, parameter.name
    ))
}

fn missing_required(descriptor: &Descriptor, supplied: &HashSet<&str>) -> Vec<String> {
    descriptor
        .parameters
        .iter()
        .filter(|p| p.required && !supplied.contains(p.name.as_str()))
        .map(|p| format!("Missing required parameter: \"{}\" for {}", p.name, subject(descriptor)))
        .collect()
}

/// Checks `arguments` against `descriptor`, returning every problem found
///
/// Only literal values are type-checked; expressions are opaque until run.
pub fn check(descriptor: &Descriptor, arguments: &Arguments) -> Vec<String> {
    let mut problems = Vec::new();
    let mut supplied: HashSet<&str> = HashSet::new();
    match arguments {
        Arguments::Named(args) => {
            for arg in args {
                if !supplied.insert(arg.key.as_str()) {
                    problems.push(format!("Duplicate named parameter \"{}\"", arg.key));
                    continue;
                }
                match descriptor.parameter(&arg.key) {
                    Some(parameter) => problems.extend(check_type(parameter, &arg.value)),
                    None => problems.push(format!(
                        "Invalid parameter \"{}\" for {}",
                        arg.key,
                        subject(descriptor)
                    )),
                }
            }
        }
        Arguments::Single(value) => match descriptor.single_argument_target() {
            Some(target) => {
                supplied.insert(target.name.as_str());
                problems.extend(check_type(target, value));
            }
            None if descriptor.parameters.is_empty() => {
                problems.push(format!("{} does not take parameters", subject(descriptor)));
                return problems;
            }
            None => {
                problems.push(format!(
                    "Can't use an unnamed argument for {}, specify the parameter names",
                    subject(descriptor)
                ));
                return problems;
            }
        },
        Arguments::Positional(values) if values.is_empty() => {}
        Arguments::Positional(_) => {
            problems.push(format!("Expected named parameters for {}", subject(descriptor)));
            return problems;
        }
    }
    problems.extend(missing_required(descriptor, &supplied));
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DescriptorKind, ParamType};

    fn timeout() -> Descriptor {
        Descriptor::new(DescriptorKind::Step, "timeout")
            .param("time", ParamType::Integer, true)
            .param("unit", ParamType::String, false)
            .block()
    }

    #[test]
    fn test_named_arguments_accepted() {
        let args = Arguments::named([("time", Value::literal(5_i64)), ("unit", Value::literal("MINUTES"))]);
        assert!(check(&timeout(), &args).is_empty());
    }

    #[test]
    fn test_unknown_and_missing_parameters() {
        let args = Arguments::named([("units", Value::literal("MINUTES"))]);
        assert_eq!(
            check(&timeout(), &args),
            vec![
                "Invalid parameter \"units\" for step \"timeout\"".to_string(),
                "Missing required parameter: \"time\" for step \"timeout\"".to_string(),
            ]
        );
    }

    #[test]
    fn test_literal_type_mismatch() {
        let args = Arguments::single(Value::literal("soon"));
        assert_eq!(
            check(&timeout(), &args),
            vec!["Expecting \"int\" for parameter \"time\" but got \"soon\" instead".to_string()]
        );
    }

    #[test]
    fn test_expressions_skip_type_checks() {
        let args = Arguments::single(Value::expression("params.TIMEOUT"));
        assert!(check(&timeout(), &args).is_empty());
    }

    #[test]
    fn test_unnamed_argument_without_parameters() {
        let delete = Descriptor::new(DescriptorKind::Step, "deleteDir");
        assert_eq!(
            check(&delete, &Arguments::single(Value::literal("x"))),
            vec!["step \"deleteDir\" does not take parameters".to_string()]
        );
        assert!(check(&delete, &Arguments::none()).is_empty());
    }

    #[test]
    fn test_ambiguous_unnamed_argument() {
        let mail = Descriptor::new(DescriptorKind::Step, "mail")
            .param("to", ParamType::String, true)
            .param("subject", ParamType::String, true);
        let problems = check(&mail, &Arguments::single(Value::literal("a@b")));
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("Can't use an unnamed argument"));
    }

    #[test]
    fn test_duplicate_named_parameter() {
        let args = Arguments::named([("time", Value::literal(1_i64)), ("time", Value::literal(2_i64))]);
        assert_eq!(check(&timeout(), &args), vec!["Duplicate named parameter \"time\"".to_string()]);
    }
}
