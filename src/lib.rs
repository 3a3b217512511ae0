//! # pipeline-model - declarative pipeline front-end
//!
//! Parses Jenkins-style declarative pipelines from script text or JSON into
//! one canonical model, validates it against a descriptor catalog, converts
//! between the two textual forms and lowers a valid model into an execution
//! plan.
//!
//! ## Quick Start
//!
//! ```
//! use pipeline_model::prelude::*;
//!
//! let converter = Converter::default();
//! let text = "pipeline { agent any; stages { stage('build') { steps { sh 'make' } } } }";
//! let def = converter.script_to_model(text).ok().expect("valid pipeline");
//! assert_eq!(def.stage_count(), 1);
//!
//! let json = converter.model_to_json(&def);
//! assert_eq!(json["pipeline"]["stages"][0]["name"], "build");
//! ```
//!
//! ## Layout
//!
//! - [`ast`]: the canonical model shared by both front-ends
//! - [`script`] and [`json`]: the two front-ends
//! - [`validator`]: semantic rules and the contributor extension point
//! - [`descriptor`]: capability catalog with a cached lookup
//! - [`converter`]: conversions, lowering and the endpoint surface
//! - [`infrastructure`]: configuration and logging

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod ast;
pub mod converter;
pub mod descriptor;
pub mod errors;
pub mod infrastructure;
pub mod json;
pub mod script;
pub mod validator;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use ast::{Element, PipelineBuilder, PipelineDef, SourceLocation, Stage, Step};
pub use converter::{Conversion, Converter, ConverterBuilder, ExecutionPlan, StepRewriter};
pub use descriptor::{Descriptor, DescriptorCache, DescriptorKind, DescriptorLookup};
pub use errors::{Diagnostic, ErrorCollector, ErrorKind};
pub use infrastructure::{Config, ConfigError};
pub use validator::{ModelValidator, ValidatorContributor};

/// Version of the pipeline-model crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
