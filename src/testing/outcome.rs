//! Scenario outcomes

use serde::Serialize;
use std::time::Duration;

use crate::terraform::Outputs;

/// Final status of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Succeeded,
    Failed,
    Skipped,
}

/// Phase a scenario failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Rejected before or during `terraform init`; nothing was provisioned
    Configuration,
    Apply,
    Validation,
    /// Provisioner or assertion code panicked
    Panic,
    /// Run timeout or interrupt
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseError {
    pub phase: Phase,
    pub message: String,
}

impl PhaseError {
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
        }
    }
}

/// Result of running one scenario
///
/// `error` and `teardown_error` are independent: a failed destroy never
/// changes `status`, and never hides a failure that came before it.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub name: String,
    pub status: Status,
    /// Outputs read after a successful apply
    #[serde(skip_serializing_if = "Outputs::is_empty")]
    pub outputs: Outputs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PhaseError>,
    /// Whether destroy was requested
    pub destroyed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub elapsed_secs: f64,
}

impl ExecutionOutcome {
    pub fn skipped(name: &str, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: Status::Skipped,
            outputs: Outputs::new(),
            error: None,
            destroyed: false,
            teardown_error: None,
            skip_reason: Some(reason.into()),
            elapsed_secs: 0.0,
        }
    }

    pub(crate) fn finished(
        name: &str,
        outputs: Outputs,
        error: Option<PhaseError>,
        elapsed: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            status: if error.is_some() {
                Status::Failed
            } else {
                Status::Succeeded
            },
            outputs,
            error,
            destroyed: false,
            teardown_error: None,
            skip_reason: None,
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }

    /// No scenario failure and no teardown failure
    pub fn is_clean(&self) -> bool {
        self.status != Status::Failed && self.teardown_error.is_none()
    }
}
