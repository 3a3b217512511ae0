//! Configuration management

use crate::converter::Converter;
use crate::descriptor::{BuiltinCatalog, Descriptor, DescriptorCache, DescriptorLookup};
use crate::validator::{CredentialsLookup, KnownCredentials};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Configuration loading failure
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid YAML for [`Config`]
    #[error("Invalid config file {}: {source}", path.display())]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_yaml::Error,
    },
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
    /// Pretty-print JSON output
    pub pretty: bool,
    /// Resolve `credentials(...)` ids against `credentials`
    pub check_credentials: bool,
    /// Known credential ids
    pub credentials: Vec<String>,
    /// Extra descriptors layered over the built-in catalog
    pub descriptors: Vec<Descriptor>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            pretty: true,
            check_credentials: false,
            credentials: Vec::new(),
            descriptors: Vec::new(),
        }
    }
}

impl Config {
    /// Parses YAML configuration text
    ///
    /// # Errors
    ///
    /// Returns the YAML error when the text does not describe a [`Config`].
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Loads a YAML configuration file
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            path = %path.display(),
            descriptors = config.descriptors.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Loads `path` when given, defaults otherwise
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`].
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                debug!("no configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Log level, falling back to `info` when the configured one is unknown
    #[must_use]
    pub fn effective_log_level(&self) -> &str {
        let level = self.log_level.as_str();
        if LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
            level
        } else {
            warn!(level, "unknown log level, falling back to info");
            "info"
        }
    }

    /// Descriptor lookup over the built-in catalog plus configured extras
    #[must_use]
    pub fn descriptor_lookup(&self) -> Arc<dyn DescriptorLookup> {
        let catalog = BuiltinCatalog::new().with_descriptors(self.descriptors.iter().cloned());
        Arc::new(DescriptorCache::new(Arc::new(catalog)))
    }

    /// Credentials lookup when credential checks are enabled
    #[must_use]
    pub fn credentials_lookup(&self) -> Option<Arc<dyn CredentialsLookup>> {
        if !self.check_credentials {
            return None;
        }
        if self.credentials.is_empty() {
            warn!("credential checks enabled without known credentials, every reference will fail");
        }
        Some(Arc::new(KnownCredentials::new(self.credentials.iter().cloned())))
    }

    /// Converter configured from this file and the process-wide registries
    #[must_use]
    pub fn converter(&self) -> Converter {
        let mut builder = Converter::builder()
            .lookup(self.descriptor_lookup())
            .with_registered();
        if let Some(credentials) = self.credentials_lookup() {
            builder = builder.credentials(credentials);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorKind;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert!(config.pretty);
        assert!(config.credentials_lookup().is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml("pretty: false\ncredentials: [a, b]\n").unwrap();
        assert!(!config.pretty);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.credentials, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_load_file_with_descriptors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "log_level: debug\ndescriptors:\n  - name: slackSend\n    kind: step\n    parameters:\n      - name: message\n        type: string\n        required: true\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.effective_log_level(), "debug");
        let lookup = config.descriptor_lookup();
        let slack = lookup.lookup(DescriptorKind::Step, "slackSend").unwrap();
        assert!(slack.parameter("message").is_some_and(|p| p.required));
        assert!(lookup.lookup(DescriptorKind::Step, "echo").is_some());
    }

    #[test]
    fn test_load_errors() {
        let missing = Config::load(Path::new("/nonexistent/pipeline-model.yaml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pretty: [not, a, bool]").unwrap();
        let invalid = Config::load(file.path());
        assert!(matches!(invalid, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_unknown_log_level_falls_back() {
        let config = Config {
            log_level: "loud".to_string(),
            ..Config::default()
        };
        assert_eq!(config.effective_log_level(), "info");
    }

    #[test]
    fn test_configured_converter_checks_credentials() {
        let config = Config {
            check_credentials: true,
            credentials: vec!["known".to_string()],
            ..Config::default()
        };
        let converter = config.converter();
        let text = "pipeline { agent any; environment { A = credentials('unknown') }; stages { stage('a') { steps { echo 'x' } } } }";
        assert!(!converter.script_to_model(text).is_success());
    }
}
