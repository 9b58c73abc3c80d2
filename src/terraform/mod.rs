//! Terraform client
//!
//! Thin async wrapper around the `terraform` executable: argument
//! construction, output parsing and the retryable-error policy. All
//! provisioning semantics stay inside terraform itself.

mod client;
mod interrupt;
mod options;
mod retry;
mod vars;

pub use client::{
    check_version, parse_output_json, parse_output_value, parse_outputs, value_to_string,
    Outputs, Provisioner, TerraformCli, MIN_TERRAFORM_VERSION,
};
pub use interrupt::{Interrupt, DEFAULT_INTERRUPT_GRACE};
pub use options::TerraformOptions;
pub use retry::RetryPolicy;
pub use vars::{VarSet, VarValue};
