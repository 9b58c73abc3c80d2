//! Error types for the infrastructure harness
//!
//! Error messages name the scenario phase and the terraform command that
//! failed, so a failing CI log is actionable without re-running.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Terraform Errors ===
    #[error("terraform binary '{0}' not found. Install terraform or set [terraform] binary in config.toml")]
    TerraformNotFound(String),

    #[error("terraform init failed: {0}")]
    InitFailed(String),

    #[error("terraform {command} failed (exit code {code:?}): {output}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("terraform {command} interrupted")]
    Interrupted { command: String },

    #[error("Failed to parse terraform output: {0}")]
    OutputParse(String),

    #[error("Unsupported terraform version {found}: at least {required} is required")]
    UnsupportedVersion { found: String, required: String },

    // === Scenario Errors ===
    #[error("Invalid variable '{name}': {reason}")]
    InvalidVariable { name: String, reason: String },

    #[error("Scenario '{0}' not found")]
    ScenarioNotFound(String),

    #[error("Duplicate scenario name '{0}'")]
    DuplicateScenario(String),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    // === Run Errors ===
    #[error("{failed} scenario(s) failed, {teardown} teardown(s) failed")]
    RunFailed { failed: usize, teardown: usize },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a command failed error from a finished terraform invocation
    pub fn command_failed(command: &str, code: Option<i32>, output: &str) -> Self {
        Self::CommandFailed {
            command: command.to_string(),
            code,
            output: output.trim().to_string(),
        }
    }

    /// Create an invalid variable error
    pub fn invalid_variable(name: &str, reason: &str) -> Self {
        Self::InvalidVariable {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error was detected before terraform touched any resources
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InitFailed(_)
                | Error::InvalidVariable { .. }
                | Error::Config(_)
                | Error::ConfigParse(_)
                | Error::TerraformNotFound(_)
        )
    }

    /// Combined process output, used for retryable-error classification
    pub fn output(&self) -> Option<&str> {
        match self {
            Error::CommandFailed { output, .. } => Some(output),
            Error::InitFailed(output) => Some(output),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_trims_output() {
        let err = Error::command_failed("apply", Some(1), "\n  boom  \n");
        assert_eq!(err.output(), Some("boom"));
        assert_eq!(err.to_string(), "terraform apply failed (exit code Some(1)): boom");
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::InitFailed("no module".into()).is_configuration());
        assert!(Error::invalid_variable("", "empty name").is_configuration());
        assert!(!Error::command_failed("apply", Some(1), "quota").is_configuration());
    }
}
