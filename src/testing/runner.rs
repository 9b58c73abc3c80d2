//! Scenario runner
//!
//! Drives one scenario through apply, validate and destroy. Destroy is
//! requested exactly once for every scenario whose apply was invoked: after
//! success, after an apply or validation failure, after a panic in
//! provisioner or assertion code, and after cancellation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinError};

use super::outcome::{ExecutionOutcome, Phase, PhaseError};
use super::predicate;
use super::scenario::Scenario;
use crate::common::{Error, Result};
use crate::terraform::{Interrupt, Outputs, Provisioner, TerraformOptions};

/// Obligation to destroy what a scenario applied
///
/// Armed right before apply is invoked. `release` awaits the destroy; if the
/// guard is dropped while still armed (the runner itself was dropped), any
/// in-flight apply is aborted and the destroy is spawned onto the current
/// runtime instead.
pub struct ReleaseGuard {
    scenario: String,
    armed: Option<Armed>,
    in_flight: Option<AbortHandle>,
}

struct Armed {
    provisioner: Arc<dyn Provisioner>,
    options: TerraformOptions,
    scenario: String,
}

impl Armed {
    async fn destroy(self) -> Result<()> {
        tracing::info!(scenario = %self.scenario, "Destroying");
        self.provisioner.destroy(&self.options).await?;
        tracing::info!(scenario = %self.scenario, "Destroyed");
        Ok(())
    }
}

impl ReleaseGuard {
    /// A guard with nothing to release
    pub fn new(scenario: &str) -> Self {
        Self {
            scenario: scenario.to_string(),
            armed: None,
            in_flight: None,
        }
    }

    /// Take on the obligation to destroy `options` with `provisioner`
    pub fn arm(&mut self, provisioner: Arc<dyn Provisioner>, options: TerraformOptions) {
        self.armed = Some(Armed {
            provisioner,
            options,
            scenario: self.scenario.clone(),
        });
    }

    /// Task to abort if the guard is dropped before release
    pub fn track(&mut self, work: AbortHandle) {
        self.in_flight = Some(work);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Run the destroy, if armed. Releasing an unarmed guard does nothing.
    ///
    /// The destroy runs in its own task, so it completes even if the caller
    /// stops polling this future.
    pub async fn release(mut self) -> Result<bool> {
        let Some(armed) = self.armed.take() else {
            return Ok(false);
        };
        match tokio::spawn(armed.destroy()).await {
            Ok(result) => result.map(|_| true),
            Err(e) => Err(Error::Internal(format!(
                "destroy task failed: {}",
                join_error_message(e)
            ))),
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let Some(armed) = self.armed.take() else {
            return;
        };
        if let Some(work) = self.in_flight.take() {
            work.abort();
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(
                    scenario = %self.scenario,
                    "Runner dropped before teardown, destroying in background"
                );
                handle.spawn(async move {
                    if let Err(e) = armed.destroy().await {
                        tracing::error!(error = %e, "Background destroy failed");
                    }
                });
            }
            Err(_) => {
                tracing::error!(
                    scenario = %self.scenario,
                    working_dir = %armed.options.working_dir.display(),
                    "No runtime available to destroy resources; they must be removed manually"
                );
            }
        }
    }
}

/// Extra time, past the terraform grace period, before in-flight work is aborted
const INTERRUPT_MARGIN: Duration = Duration::from_secs(5);

fn joined_result(joined: std::result::Result<PhaseResult, JoinError>) -> PhaseResult {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => PhaseResult::failed(Phase::Panic, join_error_message(e)),
        Err(e) => PhaseResult::failed(Phase::Cancelled, e.to_string()),
    }
}

/// Outputs read and the first failure, if any, from apply + validate
struct PhaseResult {
    outputs: Outputs,
    error: Option<PhaseError>,
}

impl PhaseResult {
    fn failed(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            outputs: Outputs::new(),
            error: Some(PhaseError::new(phase, message)),
        }
    }
}

/// Run a scenario to completion
///
/// `cancel` flipping to `true` aborts apply/validate; destroy still runs.
pub async fn run_scenario(
    provisioner: Arc<dyn Provisioner>,
    scenario: Scenario,
    mut cancel: watch::Receiver<bool>,
) -> ExecutionOutcome {
    let started = Instant::now();
    let name = scenario.name.clone();

    if let Some(reason) = &scenario.skip {
        tracing::info!(scenario = %name, reason = %reason, "Skipped");
        return ExecutionOutcome::skipped(&name, reason.clone());
    }

    if *cancel.borrow() {
        return ExecutionOutcome::skipped(&name, "run cancelled before apply");
    }

    if let Err(e) = scenario.preflight() {
        tracing::warn!(scenario = %name, error = %e, "Configuration rejected");
        return ExecutionOutcome::finished(
            &name,
            Outputs::new(),
            Some(PhaseError::new(Phase::Configuration, e.to_string())),
            started.elapsed(),
        );
    }

    // Destroy must not observe the cancellation that interrupts apply
    let mut guard = ReleaseGuard::new(&name);
    guard.arm(provisioner.clone(), scenario.options.clone());

    let mut scenario = scenario;
    scenario.options.interrupt = Some(Interrupt::new(cancel.clone()));
    let grace = scenario.options.interrupt_grace;

    let scenario = Arc::new(scenario);
    let mut work = tokio::spawn(apply_and_validate(provisioner, scenario));
    guard.track(work.abort_handle());

    let result = tokio::select! {
        joined = &mut work => {
            let mut result = joined_result(joined);
            // Work that failed because it was interrupted reports the cancellation
            if *cancel.borrow() {
                if let Some(error) = result.error.as_mut() {
                    error.phase = Phase::Cancelled;
                }
            }
            result
        }
        _ = cancelled(&mut cancel) => {
            tracing::warn!(scenario = %name, "Cancelled, waiting for terraform to stop before teardown");
            match tokio::time::timeout(grace + INTERRUPT_MARGIN, &mut work).await {
                Ok(joined) => {
                    if let Err(e) = joined {
                        tracing::warn!(scenario = %name, error = %join_error_message(e), "Interrupted work failed");
                    }
                }
                Err(_) => {
                    tracing::error!(scenario = %name, "Work did not stop after interrupt, aborting");
                    work.abort();
                    let _ = work.await;
                }
            }
            PhaseResult::failed(Phase::Cancelled, "run cancelled during apply or validation")
        }
    };

    let mut outcome =
        ExecutionOutcome::finished(&name, result.outputs, result.error, started.elapsed());

    match guard.release().await {
        Ok(destroyed) => outcome.destroyed = destroyed,
        Err(e) => {
            tracing::error!(scenario = %name, error = %e, "Teardown failed");
            outcome.destroyed = true;
            outcome.teardown_error = Some(e.to_string());
        }
    }
    outcome.elapsed_secs = started.elapsed().as_secs_f64();
    outcome
}

async fn apply_and_validate(
    provisioner: Arc<dyn Provisioner>,
    scenario: Arc<Scenario>,
) -> PhaseResult {
    let options = &scenario.options;
    tracing::info!(
        scenario = %scenario.name,
        working_dir = %options.working_dir.display(),
        "Applying"
    );

    if let Err(e) = provisioner.init_and_apply(options).await {
        let phase = if matches!(e, Error::Interrupted { .. }) {
            Phase::Cancelled
        } else if e.is_configuration() {
            Phase::Configuration
        } else {
            Phase::Apply
        };
        tracing::warn!(scenario = %scenario.name, error = %e, "Apply failed");
        return PhaseResult::failed(phase, e.to_string());
    }

    let outputs = match read_outputs(provisioner.as_ref(), &scenario).await {
        Ok(outputs) => outputs,
        Err(e) => {
            return PhaseResult::failed(Phase::Validation, format!("reading outputs: {}", e));
        }
    };

    let failures = predicate::evaluate(&scenario.assertions, &outputs);
    let error = if failures.is_empty() {
        tracing::info!(scenario = %scenario.name, "Validated");
        None
    } else {
        tracing::warn!(scenario = %scenario.name, failures = failures.len(), "Validation failed");
        Some(PhaseError::new(Phase::Validation, failures.join("; ")))
    };

    PhaseResult { outputs, error }
}

/// Read outputs after apply
///
/// Named reads that fail leave the output absent, so the assertion that
/// asked for it reports it; a failed full read fails validation outright.
async fn read_outputs(provisioner: &dyn Provisioner, scenario: &Scenario) -> Result<Outputs> {
    if scenario.read_all_outputs {
        let outputs = provisioner.output_all(&scenario.options).await?;
        for (name, value) in &outputs {
            tracing::info!(scenario = %scenario.name, output = %name, value = %value, "Output");
        }
        return Ok(outputs);
    }

    let mut outputs = Outputs::new();
    for name in scenario.output_names() {
        match provisioner.output_json(&scenario.options, name).await {
            Ok(value) => {
                tracing::info!(scenario = %scenario.name, output = %name, value = %value, "Output");
                outputs.insert(name.to_string(), value);
            }
            Err(e) => {
                tracing::warn!(scenario = %scenario.name, output = %name, error = %e, "Output unavailable");
            }
        }
    }
    Ok(outputs)
}

/// Resolves once cancellation is requested; never if the sender goes away
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn join_error_message(e: JoinError) -> String {
    if !e.is_panic() {
        return e.to_string();
    }
    let payload = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
