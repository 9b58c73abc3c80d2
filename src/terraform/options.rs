//! Per-scenario terraform invocation options

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::interrupt::{Interrupt, DEFAULT_INTERRUPT_GRACE};
use super::retry::RetryPolicy;
use super::vars::VarSet;

/// Everything needed to run terraform against one working directory
///
/// The same options value is used for apply, output reads and destroy, so
/// teardown always targets exactly what was applied.
#[derive(Debug, Clone)]
pub struct TerraformOptions {
    /// Directory holding the root module
    pub working_dir: PathBuf,
    /// Input variables passed with `-var`
    pub vars: VarSet,
    /// Extra variable files passed with `-var-file`
    pub var_files: Vec<PathBuf>,
    /// Extra environment for the terraform process
    pub env: BTreeMap<String, String>,
    /// Pass `-no-color` to terraform
    pub no_color: bool,
    /// Retry policy for init, apply and destroy
    pub retry: RetryPolicy,
    /// Stop running commands with SIGINT when this fires
    pub interrupt: Option<Interrupt>,
    /// Time an interrupted command gets to exit before it is killed
    pub interrupt_grace: Duration,
}

impl TerraformOptions {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            vars: VarSet::new(),
            var_files: Vec::new(),
            env: BTreeMap::new(),
            no_color: true,
            retry: RetryPolicy::none(),
            interrupt: None,
            interrupt_grace: DEFAULT_INTERRUPT_GRACE,
        }
    }

    pub fn with_vars(mut self, vars: VarSet) -> Self {
        self.vars = vars;
        self
    }

    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    /// Retry the default set of transient terraform errors
    pub fn with_default_retryable_errors(mut self) -> Self {
        self.retry = RetryPolicy::default();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn with_interrupt_grace(mut self, grace: Duration) -> Self {
        self.interrupt_grace = grace;
        self
    }

    /// Arguments for `terraform init`
    pub fn init_args(&self) -> Vec<String> {
        let mut args = vec!["init".to_string(), "-upgrade=false".to_string()];
        if self.no_color {
            args.push("-no-color".to_string());
        }
        args
    }

    /// Arguments for `terraform apply`
    pub fn apply_args(&self) -> Vec<String> {
        self.mutating_args("apply")
    }

    /// Arguments for `terraform destroy`
    pub fn destroy_args(&self) -> Vec<String> {
        self.mutating_args("destroy")
    }

    /// Arguments for `terraform output`, for one output or all of them
    pub fn output_args(&self, name: Option<&str>) -> Vec<String> {
        let mut args = vec![
            "output".to_string(),
            "-no-color".to_string(),
            "-json".to_string(),
        ];
        if let Some(name) = name {
            args.push(name.to_string());
        }
        args
    }

    fn mutating_args(&self, command: &str) -> Vec<String> {
        let mut args = vec![
            command.to_string(),
            "-input=false".to_string(),
            "-auto-approve".to_string(),
            "-lock=false".to_string(),
        ];
        if self.no_color {
            args.push("-no-color".to_string());
        }
        args.extend(self.vars.to_args());
        for file in &self.var_files {
            args.push("-var-file".to_string());
            args.push(file.display().to_string());
        }
        args
    }
}
