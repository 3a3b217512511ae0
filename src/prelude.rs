//! Prelude module for common imports

// Model
pub use crate::ast::{
    Agent, Arguments, BodyKind, Element, Literal, PipelineBuilder, PipelineDef, Post,
    SourceLocation, Stage, Step, Value, When,
};

// Conversions
pub use crate::converter::endpoints;
pub use crate::converter::{
    Conversion, Converter, ConverterBuilder, ExecutionNode, ExecutionPlan, StepRewriter,
};

// Catalog and validation
pub use crate::descriptor::{
    BuiltinCatalog, Descriptor, DescriptorCache, DescriptorKind, DescriptorLookup,
};
pub use crate::errors::{Diagnostic, ErrorCollector, ErrorKind};
pub use crate::validator::{
    CredentialsLookup, KnownCredentials, ModelValidator, ValidationContext, ValidatorContributor,
};
