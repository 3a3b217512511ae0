//! Matrix stages
//!
//! A matrix runs its stages once per cell of the cross product of its axes,
//! minus the cells matched by an `exclude` entry.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::location::SourceLocation;
use super::stage::Stages;
use super::text::TextWriter;
use super::value::Value;
use super::Element;
use crate::validator::ModelValidator;
use serde_json::json;

/// One cell: `(axis name, value)` pairs in axis order
pub type MatrixCell = Vec<(String, String)>;

fn values_text(values: &[Value]) -> String {
    values
        .iter()
        .map(Value::to_text)
        .collect::<Vec<_>>()
        .join(", ")
}

fn values_json(values: &[Value]) -> serde_json::Value {
    values.iter().map(Element::to_json).collect()
}

/// Named axis with its values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axis {
    /// Axis name, exposed as an environment variable per cell
    pub name: String,
    /// Ordered values
    pub values: Vec<Value>,
    /// Source location
    pub location: SourceLocation,
}

impl Axis {
    /// Creates an axis
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

impl Element for Axis {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_axis(self);
        for value in &self.values {
            valid &= value.validate(validator);
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        json!({"name": self.name, "values": values_json(&self.values)})
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block("axis", |out| {
            out.line(format!("name({})", super::text::quote(&self.name)));
            out.line(format!("values({})", values_text(&self.values)));
        });
    }
}

/// `axes { ... }`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AxisContainer {
    /// Axes in declaration order
    pub axes: Vec<Axis>,
    /// Source location
    pub location: SourceLocation,
}

impl AxisContainer {
    /// Creates an axis container
    pub fn new(axes: Vec<Axis>) -> Self {
        Self {
            axes,
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    /// Looks up an axis by name
    pub fn get(&self, name: &str) -> Option<&Axis> {
        self.axes.iter().find(|a| a.name == name)
    }
}

impl Element for AxisContainer {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_axis_container(self);
        for axis in &self.axes {
            valid &= axis.validate(validator);
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        self.axes.iter().map(Element::to_json).collect()
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block("axes", |out| {
            for axis in &self.axes {
                axis.write_text(out);
            }
        });
    }
}

/// Axis reference inside an `exclude`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludeAxis {
    /// Referenced axis name
    pub name: String,
    /// Referenced values
    pub values: Vec<Value>,
    /// `notValues`: matches every value except these
    pub inverse: bool,
    /// Source location
    pub location: SourceLocation,
}

impl ExcludeAxis {
    /// Creates a `values` reference
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
            inverse: false,
            location: SourceLocation::Unknown,
        }
    }

    /// Creates a `notValues` reference
    pub fn inverse(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            inverse: true,
            ..Self::new(name, values)
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    fn matches(&self, cell: &[(String, String)]) -> bool {
        let Some((_, current)) = cell.iter().find(|(k, _)| *k == self.name) else {
            return false;
        };
        let listed = self.values.iter().any(|v| v.raw() == *current);
        listed != self.inverse
    }

    fn values_key(&self) -> &'static str {
        if self.inverse { "notValues" } else { "values" }
    }
}

impl Element for ExcludeAxis {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_exclude_axis(self);
        for value in &self.values {
            valid &= value.validate(validator);
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("name".to_string(), json!(self.name));
        obj.insert(self.values_key().to_string(), values_json(&self.values));
        serde_json::Value::Object(obj)
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block("axis", |out| {
            out.line(format!("name({})", super::text::quote(&self.name)));
            out.line(format!("{}({})", self.values_key(), values_text(&self.values)));
        });
    }
}

/// One `exclude { ... }` entry; matches a cell when all its axes match
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Exclude {
    /// Axis references
    pub axes: Vec<ExcludeAxis>,
    /// Source location
    pub location: SourceLocation,
}

impl Exclude {
    /// Creates an exclude entry
    pub fn new(axes: Vec<ExcludeAxis>) -> Self {
        Self {
            axes,
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    /// Returns true if this entry excludes the cell
    pub fn matches(&self, cell: &[(String, String)]) -> bool {
        !self.axes.is_empty() && self.axes.iter().all(|a| a.matches(cell))
    }
}

impl Element for Exclude {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_exclude(self);
        for axis in &self.axes {
            valid &= axis.validate(validator);
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        json!({"exclude": self.axes.iter().map(Element::to_json).collect::<Vec<_>>()})
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block("exclude", |out| {
            for axis in &self.axes {
                axis.write_text(out);
            }
        });
    }
}

/// `excludes { ... }`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Excludes {
    /// Exclude entries
    pub excludes: Vec<Exclude>,
    /// Source location
    pub location: SourceLocation,
}

impl Excludes {
    /// Creates an excludes section
    pub fn new(excludes: Vec<Exclude>) -> Self {
        Self {
            excludes,
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

impl Element for Excludes {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_excludes(self);
        for exclude in &self.excludes {
            valid &= exclude.validate(validator);
        }
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        self.excludes.iter().map(Element::to_json).collect()
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block("excludes", |out| {
            for exclude in &self.excludes {
                exclude.write_text(out);
            }
        });
    }
}

/// `matrix { axes ... excludes ... stages ... }`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Matrix {
    /// Axes
    pub axes: AxisContainer,
    /// Optional excluded combinations
    pub excludes: Option<Excludes>,
    /// Stages run per cell
    pub stages: Stages,
    /// Source location
    pub location: SourceLocation,
}

impl Matrix {
    /// Creates a matrix
    pub fn new(axes: AxisContainer, stages: Stages) -> Self {
        Self {
            axes,
            excludes: None,
            stages,
            location: SourceLocation::Unknown,
        }
    }

    /// Sets the excludes
    pub fn with_excludes(mut self, excludes: Excludes) -> Self {
        self.excludes = Some(excludes);
        self
    }

    /// Sets the source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    /// Effective cells: cross product of the axes minus excluded ones
    pub fn cells(&self) -> Vec<MatrixCell> {
        if self.axes.axes.is_empty() {
            return vec![];
        }

        let mut cells: Vec<MatrixCell> = vec![vec![]];
        for axis in &self.axes.axes {
            let mut next = Vec::with_capacity(cells.len() * axis.values.len());
            for cell in &cells {
                for value in &axis.values {
                    let mut extended = cell.clone();
                    extended.push((axis.name.clone(), value.raw()));
                    next.push(extended);
                }
            }
            cells = next;
        }

        let excludes = self.excludes.as_ref().map_or(&[][..], |e| &e.excludes[..]);
        cells
            .into_iter()
            .filter(|cell| !excludes.iter().any(|e| e.matches(cell)))
            .collect()
    }
}

impl Element for Matrix {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn validate(&self, validator: &mut dyn ModelValidator) -> bool {
        let mut valid = validator.validate_matrix(self);
        valid &= self.axes.validate(validator);
        if let Some(excludes) = &self.excludes {
            valid &= excludes.validate(validator);
        }
        valid &= self.stages.validate(validator);
        valid
    }

    fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("axes".to_string(), self.axes.to_json());
        if let Some(excludes) = &self.excludes {
            obj.insert("excludes".to_string(), excludes.to_json());
        }
        obj.insert("stages".to_string(), self.stages.to_json());
        serde_json::Value::Object(obj)
    }

    fn write_text(&self, out: &mut TextWriter) {
        out.block("matrix", |out| {
            self.axes.write_text(out);
            if let Some(excludes) = &self.excludes {
                excludes.write_text(out);
            }
            self.stages.write_text(out);
        });
    }
}
