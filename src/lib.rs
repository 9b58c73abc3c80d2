//! infra-harness - Terraform module test harness
//!
//! Drives terraform through a repeatable apply / validate / destroy cycle
//! per scenario, with caller-controlled selection of which scenarios run.

pub mod cli;
pub mod commands;
pub mod common;
pub mod terraform;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use testing::{ExecutionOutcome, Scenario, Status};
