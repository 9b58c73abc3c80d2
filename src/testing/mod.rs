//! Scenario harness
//!
//! Reads YAML scenarios, decides which ones run, and drives each through
//! terraform apply, output validation and destroy.

mod config;
mod outcome;
mod policy;
mod predicate;
mod runner;
mod scenario;
mod suite;

pub use config::{load_scenarios, parse_scenarios, LoadedScenario, OutputAssertion, ScenarioFile};
pub use outcome::{ExecutionOutcome, Phase, PhaseError, Status};
pub use policy::SelectionPolicy;
pub use predicate::{contains, evaluate, glob_match, not_empty};
pub use runner::{run_scenario, ReleaseGuard};
pub use scenario::Scenario;
pub use suite::Suite;
