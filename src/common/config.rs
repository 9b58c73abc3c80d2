//! Configuration file handling

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};
use crate::terraform::{RetryPolicy, DEFAULT_INTERRUPT_GRACE};

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Terraform binary settings
    #[serde(default)]
    pub terraform: TerraformConfig,

    /// Retry settings for transient terraform failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Suite run settings
    #[serde(default)]
    pub run: RunConfig,
}

/// Terraform binary settings
#[derive(Debug, Deserialize)]
pub struct TerraformConfig {
    /// Name or path of the terraform executable
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
        }
    }
}

fn default_binary() -> PathBuf {
    PathBuf::from("terraform")
}

/// Retry settings
#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt for retryable errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between attempts
    #[serde(default = "default_time_between_retries")]
    pub time_between_retries_secs: u64,

    /// Additional output signatures treated as retryable, mapped to a description
    #[serde(default)]
    pub extra_retryable_errors: BTreeMap<String, String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            time_between_retries_secs: default_time_between_retries(),
            extra_retryable_errors: BTreeMap::new(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_time_between_retries() -> u64 {
    5
}

/// Suite run settings
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    /// Maximum number of scenarios provisioning at once
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Overall run timeout in seconds (0 disables it)
    #[serde(default)]
    pub timeout_secs: u64,

    /// Scenarios carrying any of these tags are skipped unless `--run-all`
    #[serde(default = "default_skip_tags")]
    pub skip_tags: Vec<String>,

    /// Seconds an interrupted terraform gets to save state before it is killed
    #[serde(default = "default_interrupt_grace_secs")]
    pub interrupt_grace_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            timeout_secs: 0,
            skip_tags: default_skip_tags(),
            interrupt_grace_secs: default_interrupt_grace_secs(),
        }
    }
}

fn default_parallelism() -> usize {
    4
}
fn default_interrupt_grace_secs() -> u64 {
    DEFAULT_INTERRUPT_GRACE.as_secs()
}
fn default_skip_tags() -> Vec<String> {
    vec!["expensive".to_string(), "dependent".to_string()]
}

impl Config {
    /// Load configuration from an explicit path, or the default config file
    ///
    /// Returns default configuration if no file exists
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Resolve the terraform executable
    ///
    /// Absolute or relative paths are used as-is if they exist; bare names
    /// are searched in PATH.
    pub fn terraform_binary(&self) -> Result<PathBuf> {
        let binary = &self.terraform.binary;
        if binary.components().count() > 1 {
            if binary.exists() {
                return Ok(binary.clone());
            }
            return Err(Error::TerraformNotFound(binary.display().to_string()));
        }
        which::which(binary).map_err(|_| Error::TerraformNotFound(binary.display().to_string()))
    }

    /// Build the retry policy: default retryable errors plus configured extras
    pub fn retry_policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::default()
            .with_max_retries(self.retry.max_retries)
            .with_time_between_retries(Duration::from_secs(self.retry.time_between_retries_secs));
        for (signature, description) in &self.retry.extra_retryable_errors {
            policy = policy.with_retryable_error(signature, description);
        }
        policy
    }

    pub fn interrupt_grace(&self) -> Duration {
        Duration::from_secs(self.run.interrupt_grace_secs)
    }

    /// Overall run timeout, if any
    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run.timeout_secs > 0).then(|| Duration::from_secs(self.run.timeout_secs))
    }
}
