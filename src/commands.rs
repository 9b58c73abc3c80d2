//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Apply, validate and destroy scenarios
    Test {
        /// Scenario YAML files or directories containing them
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Maximum scenarios provisioning at once (default from config)
        #[arg(long)]
        parallel: Option<usize>,

        /// Cancel the whole run after this many seconds; scenarios still tear down
        #[arg(long)]
        timeout: Option<u64>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List scenarios and whether they would run
    List {
        /// Scenario YAML files or directories containing them
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Destroy a scenario's resources without applying (cleanup after a failed teardown)
    Destroy {
        /// Scenario YAML file or directory
        path: PathBuf,

        /// Scenario name
        name: String,
    },

    /// Locate terraform and check its version
    Check {
        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Which scenarios run
#[derive(Args, Debug, Default)]
pub struct SelectionArgs {
    /// Run only the named scenario (repeatable); overrides tag skipping for it
    #[arg(long = "only", value_name = "NAME")]
    pub only: Vec<String>,

    /// Skip scenarios with this tag, in addition to the configured ones (repeatable)
    #[arg(long = "skip-tag", value_name = "TAG")]
    pub skip_tags: Vec<String>,

    /// Ignore tag-based skipping
    #[arg(long)]
    pub run_all: bool,
}
