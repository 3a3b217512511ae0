//! pipeline-model - command-line conversions for declarative pipelines
//!
//! ## Commands
//!
//! - `pipeline-model to-json` - Jenkinsfile to pipeline JSON
//! - `pipeline-model to-jenkinsfile` - pipeline JSON to Jenkinsfile
//! - `pipeline-model validate` - validate either form
//! - `pipeline-model lower` - print the execution plan
//! - `pipeline-model steps-to-json` / `steps-to-jenkinsfile` - bare step lists
//! - `pipeline-model schema` - print the embedded JSON schema
//! - `pipeline-model completions` - generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! pipeline-model validate Jenkinsfile
//! pipeline-model to-json Jenkinsfile > pipeline.json
//! cat pipeline.json | pipeline-model to-jenkinsfile
//! ```

use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    match cli::run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e}");
            if std::env::var("PIPELINE_MODEL_VERBOSE").is_ok() {
                eprintln!("{e:?}");
            }
            ExitCode::from(2)
        }
    }
}
