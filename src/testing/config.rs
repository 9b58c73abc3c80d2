//! Scenario file configuration types
//!
//! Defines the data structures for deserializing YAML scenario files. A file
//! holds either one scenario or a list of them.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::policy::SelectionPolicy;
use super::scenario::Scenario;
use crate::common::{Error, Result};
use crate::terraform::{RetryPolicy, TerraformOptions, VarSet};

/// A scenario as written in a YAML file
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    /// Name of the scenario, unique within a run
    pub name: String,
    /// Optional description of what the scenario verifies
    pub description: Option<String>,
    /// Terraform root module, relative to the YAML file
    pub working_dir: PathBuf,
    /// Input variables
    #[serde(default)]
    pub vars: VarSet,
    /// Variable files, relative to the YAML file
    #[serde(default)]
    pub var_files: Vec<PathBuf>,
    /// Extra environment for terraform
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Pass `-no-color` to terraform (default: true)
    #[serde(default = "default_no_color")]
    pub no_color: bool,
    /// Tags consulted by the selection policy (e.g. "expensive", "dependent")
    #[serde(default)]
    pub tags: Vec<String>,
    /// Reason reported when the policy skips this scenario
    pub skip_reason: Option<String>,
    /// Read every output instead of only the ones named by assertions
    #[serde(default)]
    pub read_all_outputs: bool,
    /// Assertions made against outputs after apply
    #[serde(default)]
    pub validate: Vec<OutputAssertion>,
}

fn default_no_color() -> bool {
    true
}

/// Assertion for a terraform output
///
/// With no predicate set, the output only has to be present.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputAssertion {
    /// Output name to check
    pub output: String,
    /// Expected substring
    pub contains: Option<String>,
    /// Expected exact value
    pub equals: Option<String>,
    /// Expected glob pattern (`*` matches any run of characters)
    pub matches: Option<String>,
    /// Output must be present and non-empty
    #[serde(default)]
    pub not_empty: bool,
}

/// A scenario file entry together with the directory it was loaded from
#[derive(Debug)]
pub struct LoadedScenario {
    pub file: ScenarioFile,
    pub source: PathBuf,
}

impl LoadedScenario {
    /// Directory that relative paths in the file are resolved against
    pub fn base_dir(&self) -> &Path {
        self.source.parent().unwrap_or(Path::new("."))
    }

    /// Build the runnable scenario, applying the selection policy
    pub fn to_scenario(&self, retry: &RetryPolicy, policy: &SelectionPolicy) -> Scenario {
        let base = self.base_dir();
        let file = &self.file;

        let mut options = TerraformOptions::new(resolve(base, &file.working_dir))
            .with_vars(file.vars.clone())
            .with_no_color(file.no_color)
            .with_retry(retry.clone());
        options.var_files = file.var_files.iter().map(|f| resolve(base, f)).collect();
        options.env = file.env.clone();

        let mut scenario = Scenario::new(&file.name, options)
            .with_assertions(file.validate.clone())
            .with_read_all_outputs(file.read_all_outputs);
        if let Some(reason) =
            policy.skip_reason(&file.name, &file.tags, file.skip_reason.as_deref())
        {
            scenario = scenario.skip(reason);
        }
        scenario
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Parse one YAML document into scenario entries
///
/// A top-level sequence is a list of scenarios; anything else is one.
pub fn parse_scenarios(content: &str) -> Result<Vec<ScenarioFile>> {
    let document: serde_yaml::Value = serde_yaml::from_str(content)?;
    if document.is_sequence() {
        Ok(serde_yaml::from_value(document)?)
    } else {
        Ok(vec![serde_yaml::from_value(document)?])
    }
}

/// Load scenarios from files and directories
///
/// Directories contribute their `*.yaml` / `*.yml` files (not recursive),
/// in file-name order. Names must be unique across everything loaded.
pub fn load_scenarios(paths: &[PathBuf]) -> Result<Vec<LoadedScenario>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.is_file()
                        && matches!(
                            p.extension().and_then(|e| e.to_str()),
                            Some("yaml") | Some("yml")
                        )
                })
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(path.clone());
        }
    }

    let mut loaded: Vec<LoadedScenario> = Vec::new();
    for source in files {
        let content = std::fs::read_to_string(&source).map_err(|e| {
            Error::Config(format!(
                "Failed to read scenario file '{}': {}",
                source.display(),
                e
            ))
        })?;
        let entries = parse_scenarios(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse scenario file '{}': {}",
                source.display(),
                e
            ))
        })?;
        for file in entries {
            if loaded.iter().any(|l| l.file.name == file.name) {
                return Err(Error::DuplicateScenario(file.name));
            }
            loaded.push(LoadedScenario {
                file,
                source: source.clone(),
            });
        }
    }

    tracing::debug!(count = loaded.len(), "Loaded scenarios");
    Ok(loaded)
}
