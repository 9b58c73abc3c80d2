//! Provisioner trait and the terraform CLI implementation

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;

use super::interrupt::{send_interrupt, Interrupt};
use super::options::TerraformOptions;
use crate::common::{Error, Result};

/// Output name -> value, as reported by `terraform output -json`
pub type Outputs = BTreeMap<String, Value>;

/// Oldest terraform release whose CLI flags and JSON output we rely on
pub const MIN_TERRAFORM_VERSION: semver::Version = semver::Version::new(1, 0, 0);

/// The operations the harness needs from an infrastructure tool
///
/// Every method takes the same options value that was applied, which acts
/// as the handle for the provisioned resources.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Run `init` then `apply`, retrying transient errors per `options.retry`
    async fn init_and_apply(&self, options: &TerraformOptions) -> Result<String>;

    /// Read one output as its JSON value; `null` when terraform has no value
    async fn output_json(&self, options: &TerraformOptions, name: &str) -> Result<Value>;

    /// Read one output as a string
    async fn output(&self, options: &TerraformOptions, name: &str) -> Result<String> {
        Ok(value_to_string(&self.output_json(options, name).await?))
    }

    /// Read every output
    async fn output_all(&self, options: &TerraformOptions) -> Result<Outputs>;

    /// Destroy everything in the working directory's state
    async fn destroy(&self, options: &TerraformOptions) -> Result<String>;
}

/// Drives the `terraform` executable
#[derive(Debug, Clone)]
pub struct TerraformCli {
    binary: PathBuf,
}

impl TerraformCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Report the installed terraform version
    pub async fn version(&self) -> Result<semver::Version> {
        #[derive(Deserialize)]
        struct VersionOutput {
            terraform_version: String,
        }

        let stdout = self
            .exec(
                Path::new("."),
                &BTreeMap::new(),
                &["version".to_string(), "-json".to_string()],
                None,
                Duration::ZERO,
            )
            .await?;
        let parsed: VersionOutput = serde_json::from_str(&stdout)
            .map_err(|e| Error::OutputParse(format!("terraform version: {}", e)))?;
        semver::Version::parse(&parsed.terraform_version)
            .map_err(|e| Error::OutputParse(format!("terraform version '{}': {}", parsed.terraform_version, e)))
    }

    async fn run(&self, options: &TerraformOptions, args: &[String]) -> Result<String> {
        self.exec(
            &options.working_dir,
            &options.env,
            args,
            options.interrupt.clone(),
            options.interrupt_grace,
        )
        .await
    }

    /// Run terraform to completion
    ///
    /// When `interrupt` fires, terraform gets SIGINT and up to `grace` to
    /// record state and exit; only then is it killed.
    async fn exec(
        &self,
        dir: &Path,
        env: &BTreeMap<String, String>,
        args: &[String],
        interrupt: Option<Interrupt>,
        grace: Duration,
    ) -> Result<String> {
        let command = args.first().map(String::as_str).unwrap_or("");
        if interrupt.as_ref().is_some_and(Interrupt::is_requested) {
            return Err(Error::Interrupted {
                command: command.to_string(),
            });
        }
        tracing::debug!(
            binary = %self.binary.display(),
            dir = %dir.display(),
            "terraform {}",
            args.join(" ")
        );

        let child = Command::new(&self.binary)
            .args(args)
            .current_dir(dir)
            .envs(env)
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::TerraformNotFound(self.binary.display().to_string())
                } else {
                    Error::Io(e)
                }
            })?;
        let pid = child.id();
        let wait = child.wait_with_output();
        tokio::pin!(wait);

        let output = match interrupt {
            None => wait.await?,
            Some(mut interrupt) => tokio::select! {
                output = &mut wait => output?,
                _ = interrupt.requested() => {
                    tracing::warn!(command, "Interrupting terraform");
                    if let Some(pid) = pid {
                        send_interrupt(pid);
                    }
                    match tokio::time::timeout(grace, &mut wait).await {
                        Ok(Ok(output)) => {
                            tracing::info!(command, status = %output.status, "terraform stopped after interrupt");
                        }
                        Ok(Err(e)) => {
                            tracing::warn!(command, error = %e, "Lost track of interrupted terraform");
                        }
                        Err(_) => {
                            tracing::error!(
                                command,
                                grace_secs = grace.as_secs(),
                                "terraform ignored interrupt, killing it"
                            );
                        }
                    }
                    return Err(Error::Interrupted {
                        command: command.to_string(),
                    });
                }
            },
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            tracing::trace!(command, stdout = %stdout, "terraform succeeded");
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Error::command_failed(
            command,
            output.status.code(),
            &format!("{}{}", stderr, stdout),
        ))
    }
}

#[async_trait]
impl Provisioner for TerraformCli {
    async fn init_and_apply(&self, options: &TerraformOptions) -> Result<String> {
        let init_args = options.init_args();
        options
            .retry
            .run("init", || async {
                self.run(options, &init_args).await.map_err(|e| match e {
                    Error::CommandFailed { output, .. } => Error::InitFailed(output),
                    other => other,
                })
            })
            .await?;

        let apply_args = options.apply_args();
        options
            .retry
            .run("apply", || self.run(options, &apply_args))
            .await
    }

    async fn output_json(&self, options: &TerraformOptions, name: &str) -> Result<Value> {
        let stdout = self.run(options, &options.output_args(Some(name))).await?;
        parse_output_json(&stdout)
    }

    async fn output_all(&self, options: &TerraformOptions) -> Result<Outputs> {
        let stdout = self.run(options, &options.output_args(None)).await?;
        parse_outputs(&stdout)
    }

    async fn destroy(&self, options: &TerraformOptions) -> Result<String> {
        let destroy_args = options.destroy_args();
        options
            .retry
            .run("destroy", || self.run(options, &destroy_args))
            .await
    }
}

/// Parse `terraform output -json <name>`
pub fn parse_output_json(stdout: &str) -> Result<Value> {
    serde_json::from_str(stdout.trim()).map_err(|e| Error::OutputParse(e.to_string()))
}

/// Parse `terraform output -json <name>`: strings unquoted, anything else as compact JSON
pub fn parse_output_value(stdout: &str) -> Result<String> {
    parse_output_json(stdout).map(|value| value_to_string(&value))
}

/// Parse `terraform output -json` into name -> value
pub fn parse_outputs(stdout: &str) -> Result<Outputs> {
    #[derive(Deserialize)]
    struct OutputMeta {
        value: Value,
    }

    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Outputs::new());
    }
    let raw: BTreeMap<String, OutputMeta> =
        serde_json::from_str(trimmed).map_err(|e| Error::OutputParse(e.to_string()))?;
    Ok(raw.into_iter().map(|(name, meta)| (name, meta.value)).collect())
}

/// String form of an output value used by assertions and reports
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Fail if `version` is older than the minimum supported release
pub fn check_version(version: &semver::Version) -> Result<()> {
    if *version < MIN_TERRAFORM_VERSION {
        return Err(Error::UnsupportedVersion {
            found: version.to_string(),
            required: MIN_TERRAFORM_VERSION.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_output_value() {
        assert_eq!(parse_output_value("\"test-vnet-a1b2\"\n").unwrap(), "test-vnet-a1b2");
        assert_eq!(parse_output_value("[\"a\",\"b\"]").unwrap(), r#"["a","b"]"#);
        assert_eq!(parse_output_value("3").unwrap(), "3");
        assert!(parse_output_value("not json").is_err());
    }

    #[test]
    fn test_parse_output_json_keeps_structure() {
        assert_eq!(parse_output_json("[]\n").unwrap(), json!([]));
        assert_eq!(parse_output_json("{}").unwrap(), json!({}));
        assert_eq!(parse_output_json("null").unwrap(), Value::Null);
        assert_eq!(
            parse_output_json(r#"{"test": "/subnets/test"}"#).unwrap(),
            json!({"test": "/subnets/test"})
        );
    }

    #[test]
    fn test_parse_outputs() {
        let stdout = r#"{
  "vnet_id": {"sensitive": false, "type": "string", "value": "/subscriptions/x/vnets/test"},
  "subnet_ids": {"sensitive": false, "type": ["map", "string"], "value": {"test": "/subnets/test"}}
}"#;
        let outputs = parse_outputs(stdout).unwrap();
        assert_eq!(outputs["vnet_id"], json!("/subscriptions/x/vnets/test"));
        assert_eq!(outputs["subnet_ids"], json!({"test": "/subnets/test"}));
        assert!(parse_outputs("{}\n").unwrap().is_empty());
        assert!(parse_outputs("").unwrap().is_empty());
    }

    #[test]
    fn test_check_version() {
        assert!(check_version(&semver::Version::new(1, 6, 2)).is_ok());
        assert!(matches!(
            check_version(&semver::Version::new(0, 15, 5)),
            Err(Error::UnsupportedVersion { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let cli = TerraformCli::new("/nonexistent/terraform-binary");
        let options = TerraformOptions::new(".");
        assert!(matches!(
            cli.output_all(&options).await,
            Err(Error::TerraformNotFound(_))
        ));
    }

    /// A stand-in terraform that records SIGINT and exits like terraform does
    #[cfg(unix)]
    fn interruptible_terraform(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("terraform");
        let marker = dir.join("interrupted");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\ntrap 'echo stopped > {}; exit 1' INT\nsleep 30 &\nwait\n",
                marker.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interrupt_sends_sigint_and_waits() {
        let dir = tempfile::tempdir().unwrap();
        let cli = TerraformCli::new(interruptible_terraform(dir.path()));
        let (tx, rx) = tokio::sync::watch::channel(false);
        let options = TerraformOptions::new(dir.path())
            .with_interrupt(Interrupt::new(rx))
            .with_interrupt_grace(Duration::from_secs(10));

        let apply = tokio::spawn(async move { cli.init_and_apply(&options).await });
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), apply)
            .await
            .expect("interrupted terraform should stop well before the grace period")
            .unwrap();
        assert!(matches!(result, Err(Error::Interrupted { .. })));
        assert!(dir.path().join("interrupted").exists());
    }

    #[tokio::test]
    async fn test_already_interrupted_spawns_nothing() {
        let (tx, rx) = tokio::sync::watch::channel(false);
        tx.send(true).unwrap();
        let cli = TerraformCli::new("/nonexistent/terraform-binary");
        let options = TerraformOptions::new(".").with_interrupt(Interrupt::new(rx));

        assert!(matches!(
            cli.destroy(&options).await,
            Err(Error::Interrupted { .. })
        ));
    }
}
