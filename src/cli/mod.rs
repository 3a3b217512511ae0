//! Command-line front-end over the conversion endpoints
//!
//! Every subcommand reads its input from a file (or stdin when the file is
//! omitted or `-`) and prints the endpoint response as JSON.

pub mod completions;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use pipeline_model::converter::{Conversion, Converter, endpoints};
use pipeline_model::infrastructure::{Config, init_logging};
use serde_json::{Value, json};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// CLI arguments for pipeline-model
#[derive(Parser, Debug)]
#[command(name = "pipeline-model")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overrides the configured one
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a Jenkinsfile to pipeline JSON
    ToJson {
        /// Jenkinsfile (stdin if omitted)
        file: Option<PathBuf>,
    },

    /// Convert pipeline JSON to a Jenkinsfile
    ToJenkinsfile {
        /// JSON file (stdin if omitted)
        file: Option<PathBuf>,
    },

    /// Validate a Jenkinsfile or pipeline JSON
    Validate {
        /// Input file (stdin if omitted)
        file: Option<PathBuf>,
        /// Input format
        #[arg(short, long, value_enum, default_value_t = InputFormat::Jenkinsfile)]
        format: InputFormat,
    },

    /// Lower a Jenkinsfile to its execution plan
    Lower {
        /// Jenkinsfile (stdin if omitted)
        file: Option<PathBuf>,
    },

    /// Convert a step list to a JSON step array
    StepsToJson {
        /// Step list file (stdin if omitted)
        file: Option<PathBuf>,
    },

    /// Convert a JSON step array to a step list
    StepsToJenkinsfile {
        /// JSON file (stdin if omitted)
        file: Option<PathBuf>,
    },

    /// Print the pipeline JSON schema
    Schema,

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: ShellArg,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum InputFormat {
    Jenkinsfile,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

/// Build the CLI command for completion generation
pub fn build_cli() -> clap::Command {
    Args::command()
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read standard input")?;
            Ok(text)
        }
    }
}

fn params(name: &str, text: String) -> endpoints::Params {
    endpoints::Params::from([(name.to_string(), text)])
}

/// Runs a parameterised endpoint against the input
fn endpoint(converter: &Converter, name: &str, param: &str, file: Option<&Path>) -> Result<Value> {
    let text = read_input(file)?;
    endpoints::dispatch(name, converter, &params(param, text))
        .with_context(|| format!("Unknown endpoint: {name}"))
}

fn lower(converter: &Converter, file: Option<&Path>) -> Result<Value> {
    let text = read_input(file)?;
    if text.trim().is_empty() {
        return Ok(endpoints::failure(&[pipeline_model::errors::BoundaryError::MissingParameter(
            endpoints::JENKINSFILE_PARAM.to_string(),
        )
        .to_diagnostic()]));
    }
    Ok(match converter.script_to_plan(&text) {
        Conversion::Success(plan) => json!({"result": "success", "plan": plan.to_json()}),
        Conversion::Failure(errors) => endpoints::failure(&errors),
    })
}

fn print(response: &Value, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(response)?
    } else {
        serde_json::to_string(response)?
    };
    println!("{text}");
    Ok(())
}

/// Parse and execute CLI arguments
///
/// Returns false when the endpoint reported a failure result.
pub fn run() -> Result<bool> {
    let args = Args::parse();
    let config = Config::load_or_default(args.config.as_deref())?;

    if let Some(level) = &args.log_level {
        init_logging(level);
    } else if std::env::var("PIPELINE_MODEL_DEBUG").is_ok() {
        init_logging(config.effective_log_level());
    }

    let converter = config.converter();
    debug!(?converter, "configured converter");

    let response = match args.command {
        Command::ToJson { file } => endpoint(
            &converter,
            "toJson",
            endpoints::JENKINSFILE_PARAM,
            file.as_deref(),
        )?,
        Command::ToJenkinsfile { file } => {
            endpoint(&converter, "toJenkinsfile", endpoints::JSON_PARAM, file.as_deref())?
        }
        Command::Validate { file, format } => match format {
            InputFormat::Jenkinsfile => endpoint(
                &converter,
                "validateJenkinsfile",
                endpoints::JENKINSFILE_PARAM,
                file.as_deref(),
            )?,
            InputFormat::Json => {
                endpoint(&converter, "validateJson", endpoints::JSON_PARAM, file.as_deref())?
            }
        },
        Command::Lower { file } => lower(&converter, file.as_deref())?,
        Command::StepsToJson { file } => endpoint(
            &converter,
            "stepsToJson",
            endpoints::JENKINSFILE_PARAM,
            file.as_deref(),
        )?,
        Command::StepsToJenkinsfile { file } => endpoint(
            &converter,
            "stepsToJenkinsfile",
            endpoints::JSON_PARAM,
            file.as_deref(),
        )?,
        Command::Schema => endpoints::schema(),
        Command::Completions { shell, output } => {
            use clap_complete::Shell;

            let shell_enum = match shell {
                ShellArg::Bash => Shell::Bash,
                ShellArg::Zsh => Shell::Zsh,
                ShellArg::Fish => Shell::Fish,
                ShellArg::PowerShell => Shell::PowerShell,
            };

            let completions = completions::generate_completions(shell_enum)?;

            if let Some(output_path) = output {
                completions::save_completions(&completions, &output_path)?;
            } else {
                print!("{completions}");
            }
            return Ok(true);
        }
    };

    print(&response, config.pretty)?;
    Ok(response["result"] == "success")
}
