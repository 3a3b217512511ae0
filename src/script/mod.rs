//! Script front-end
//!
//! Reads the declarative pipeline dialect of the host scripting language.
//! Three passes: [`lexer`] produces tokens, [`syntax`] builds a tolerant
//! statement tree, [`model_parser`] maps that tree onto the model.

pub mod lexer;
pub mod model_parser;
pub mod syntax;

use crate::ast::{PipelineDef, Step};
use crate::errors::ErrorCollector;
use model_parser::ModelParser;
use syntax::Statement;

fn statements(text: &str, errors: &mut ErrorCollector) -> Option<Vec<Statement>> {
    let tokens = match lexer::tokenize(text) {
        Ok(tokens) => tokens,
        Err(err) => {
            errors.syntax(&err.location(), err.to_string());
            return None;
        }
    };
    match syntax::read(text, &tokens) {
        Ok(statements) => Some(statements),
        Err(err) => {
            errors.syntax(&err.location(), err.message);
            None
        }
    }
}

/// Parses a complete pipeline script
///
/// Returns `None` when the text cannot be read at all. A returned model may
/// still be accompanied by diagnostics in `errors`.
pub fn parse(text: &str, errors: &mut ErrorCollector) -> Option<PipelineDef> {
    let statements = statements(text, errors)?;
    tracing::trace!(count = statements.len(), "read top-level statements");
    ModelParser::new(errors).parse_script(&statements)
}

/// Parses a bare list of steps, as found inside a `steps { }` block
pub fn parse_steps(text: &str, errors: &mut ErrorCollector) -> Option<Vec<Step>> {
    let statements = statements(text, errors)?;
    Some(ModelParser::new(errors).parse_step_list(&statements))
}
