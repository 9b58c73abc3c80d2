//! CLI command handling
//!
//! Dispatches CLI commands to the harness and formats output.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;

use crate::commands::{Commands, SelectionArgs};
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::terraform::{check_version, value_to_string, Provisioner, TerraformCli};
use crate::testing::{
    load_scenarios, ExecutionOutcome, LoadedScenario, ReleaseGuard, Scenario, SelectionPolicy,
    Status, Suite,
};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Test {
            paths,
            selection,
            parallel,
            timeout,
            json,
        } => {
            let loaded = load_scenarios(&paths)?;
            check_only(&selection, &loaded)?;
            let policy = selection_policy(&selection, config);
            let retry = config.retry_policy();
            let grace = config.interrupt_grace();
            let scenarios: Vec<Scenario> = loaded
                .iter()
                .map(|l| {
                    let mut scenario = l.to_scenario(&retry, &policy);
                    scenario.options.interrupt_grace = grace;
                    scenario
                })
                .collect();

            // Only require terraform when something will actually run
            let binary = if scenarios.iter().any(|s| s.skip.is_none()) {
                config.terraform_binary()?
            } else {
                config.terraform.binary.clone()
            };
            let provisioner: Arc<dyn Provisioner> = Arc::new(TerraformCli::new(binary));

            let timeout = timeout
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .or_else(|| config.run_timeout());

            let outcomes = Suite::new(provisioner)
                .with_parallelism(parallel.unwrap_or(config.run.parallelism))
                .with_timeout(timeout)
                .with_interrupt_handling(true)
                .run(scenarios)
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcomes)?);
            } else {
                for outcome in &outcomes {
                    print_outcome(outcome);
                }
                print_summary(&outcomes);
            }

            let failed = outcomes
                .iter()
                .filter(|o| o.status == Status::Failed)
                .count();
            let leaked = outcomes
                .iter()
                .filter(|o| o.teardown_error.is_some())
                .count();
            if failed > 0 || leaked > 0 {
                return Err(Error::RunFailed {
                    failed,
                    teardown: leaked,
                });
            }
            Ok(())
        }

        Commands::List {
            paths,
            selection,
            json,
        } => {
            let loaded = load_scenarios(&paths)?;
            check_only(&selection, &loaded)?;
            let policy = selection_policy(&selection, config);

            if json {
                let entries: Vec<serde_json::Value> = loaded
                    .iter()
                    .map(|l| list_entry(l, &policy))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }

            if loaded.is_empty() {
                println!("No scenarios found");
                return Ok(());
            }
            for l in &loaded {
                print_list_entry(l, &policy);
            }
            Ok(())
        }

        Commands::Destroy { path, name } => {
            let loaded = load_scenarios(&[path])?;
            let entry = loaded
                .iter()
                .find(|l| l.file.name == name)
                .ok_or_else(|| Error::ScenarioNotFound(name.clone()))?;
            let scenario = entry.to_scenario(&config.retry_policy(), &SelectionPolicy::default());

            let provisioner: Arc<dyn Provisioner> =
                Arc::new(TerraformCli::new(config.terraform_binary()?));

            println!(
                "{} {} ({})",
                "Destroying".cyan(),
                name.white().bold(),
                scenario.options.working_dir.display().to_string().dimmed()
            );

            let mut guard = ReleaseGuard::new(&name);
            guard.arm(provisioner, scenario.options);
            guard.release().await?;

            println!("  {} Destroyed", "✓".green());
            Ok(())
        }

        Commands::Check { json } => {
            let binary = config.terraform_binary()?;
            let cli = TerraformCli::new(&binary);
            let version = cli.version().await?;
            let supported = check_version(&version);

            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "binary": binary,
                        "version": version.to_string(),
                        "supported": supported.is_ok(),
                    })
                );
            } else {
                println!("terraform: {}", binary.display());
                println!("version:   {}", version);
            }

            supported?;
            if !json {
                println!("  {} terraform is usable", "✓".green());
            }
            Ok(())
        }
    }
}

/// Merge CLI selection flags with the configured skip tags
fn selection_policy(selection: &SelectionArgs, config: &Config) -> SelectionPolicy {
    let mut skip_tags = config.run.skip_tags.clone();
    for tag in &selection.skip_tags {
        if !skip_tags.contains(tag) {
            skip_tags.push(tag.clone());
        }
    }
    SelectionPolicy::default()
        .with_only(selection.only.iter().cloned())
        .with_skip_tags(skip_tags)
        .with_run_all(selection.run_all)
}

/// Every `--only` name must match a loaded scenario
fn check_only(selection: &SelectionArgs, loaded: &[LoadedScenario]) -> Result<()> {
    match selection
        .only
        .iter()
        .find(|name| !loaded.iter().any(|l| &l.file.name == *name))
    {
        Some(name) => Err(Error::ScenarioNotFound(name.clone())),
        None => Ok(()),
    }
}

fn skip_reason_for(l: &LoadedScenario, policy: &SelectionPolicy) -> Option<String> {
    policy.skip_reason(&l.file.name, &l.file.tags, l.file.skip_reason.as_deref())
}

fn list_entry(l: &LoadedScenario, policy: &SelectionPolicy) -> serde_json::Value {
    serde_json::json!({
        "name": l.file.name,
        "source": l.source,
        "working_dir": l.base_dir().join(&l.file.working_dir),
        "tags": l.file.tags,
        "skip_reason": skip_reason_for(l, policy),
    })
}

fn print_list_entry(l: &LoadedScenario, policy: &SelectionPolicy) {
    let tags = if l.file.tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", l.file.tags.join(", "))
    };

    match skip_reason_for(l, policy) {
        None => println!("  {} {}{}", "run ".green(), l.file.name.bold(), tags.dimmed()),
        Some(reason) => println!(
            "  {} {}{} - {}",
            "skip".yellow(),
            l.file.name.bold(),
            tags.dimmed(),
            reason.dimmed()
        ),
    }
    if let Some(desc) = &l.file.description {
        println!("       {}", desc.dimmed());
    }
}

/// Print one scenario outcome
fn print_outcome(outcome: &ExecutionOutcome) {
    let elapsed = format!("({:.1}s)", outcome.elapsed_secs);
    match outcome.status {
        Status::Succeeded => {
            println!(
                "{} {} {}",
                "✓".green().bold(),
                outcome.name.white().bold(),
                elapsed.dimmed()
            );
            for (name, value) in &outcome.outputs {
                println!("    {} = {}", name.dimmed(), value_to_string(value));
            }
        }
        Status::Failed => {
            println!(
                "{} {} {}",
                "✗".red().bold(),
                outcome.name.white().bold(),
                elapsed.dimmed()
            );
            if let Some(error) = &outcome.error {
                let phase = serde_json::to_value(error.phase)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                println!("    {} {}", format!("[{}]", phase).red(), error.message);
            }
        }
        Status::Skipped => {
            println!(
                "{} {} {}",
                "○".yellow(),
                outcome.name.white().bold(),
                outcome.skip_reason.as_deref().unwrap_or("skipped").dimmed()
            );
        }
    }

    if let Some(teardown) = &outcome.teardown_error {
        println!("    {} {}", "teardown failed:".red().bold(), teardown);
    }
}

fn print_summary(outcomes: &[ExecutionOutcome]) {
    let count = |status: Status| outcomes.iter().filter(|o| o.status == status).count();
    let leaked = outcomes
        .iter()
        .filter(|o| o.teardown_error.is_some())
        .count();

    let mut summary = format!(
        "{} passed, {} failed, {} skipped",
        count(Status::Succeeded),
        count(Status::Failed),
        count(Status::Skipped)
    );
    if leaked > 0 {
        summary.push_str(&format!(", {} teardown failure(s)", leaked));
    }

    if count(Status::Failed) == 0 && leaked == 0 {
        println!("\n{}\n", summary.green().bold());
    } else {
        println!("\n{}\n", summary.red().bold());
    }
}
