//! Runnable scenario

use super::config::OutputAssertion;
use crate::common::Result;
use crate::terraform::TerraformOptions;

/// One named unit of apply / validate / destroy work
///
/// Built right before it runs and consumed by the runner; nothing carries
/// over from one scenario to the next.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub options: TerraformOptions,
    pub assertions: Vec<OutputAssertion>,
    /// Read every output instead of only those named by assertions
    pub read_all_outputs: bool,
    /// Skip instead of running, with the reason to report
    pub skip: Option<String>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, options: TerraformOptions) -> Self {
        Self {
            name: name.into(),
            options,
            assertions: Vec::new(),
            read_all_outputs: false,
            skip: None,
        }
    }

    pub fn with_assertion(mut self, assertion: OutputAssertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    pub fn with_assertions(mut self, assertions: Vec<OutputAssertion>) -> Self {
        self.assertions.extend(assertions);
        self
    }

    pub fn with_read_all_outputs(mut self, read_all: bool) -> Self {
        self.read_all_outputs = read_all;
        self
    }

    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }

    /// Output names referenced by assertions, first occurrence order
    pub fn output_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for assertion in &self.assertions {
            if !names.contains(&assertion.output.as_str()) {
                names.push(&assertion.output);
            }
        }
        names
    }

    /// Checks made before anything is handed to terraform
    pub fn preflight(&self) -> Result<()> {
        let dir = &self.options.working_dir;
        if !dir.is_dir() {
            return Err(crate::common::Error::Config(format!(
                "working directory '{}' does not exist or is not a directory",
                dir.display()
            )));
        }
        self.options.vars.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terraform::VarSet;

    fn assertion(output: &str) -> OutputAssertion {
        OutputAssertion {
            output: output.to_string(),
            not_empty: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_output_names_dedup() {
        let scenario = Scenario::new("networking", TerraformOptions::new("."))
            .with_assertion(assertion("vnet_name"))
            .with_assertion(assertion("vnet_id"))
            .with_assertion(assertion("vnet_name"));
        assert_eq!(scenario.output_names(), vec!["vnet_name", "vnet_id"]);
    }

    #[test]
    fn test_preflight() {
        let dir = tempfile::tempdir().unwrap();
        let ok = Scenario::new("ok", TerraformOptions::new(dir.path()));
        assert!(ok.preflight().is_ok());

        let missing = Scenario::new("missing", TerraformOptions::new(dir.path().join("nope")));
        assert!(missing.preflight().is_err());

        let bad_vars = Scenario::new(
            "bad",
            TerraformOptions::new(dir.path()).with_vars(VarSet::new().with("9lives", "x")),
        );
        assert!(bad_vars.preflight().is_err());
    }
}
