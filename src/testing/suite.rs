//! Running many scenarios
//!
//! Scenarios run with bounded parallelism and report in input order. An
//! overall timeout or Ctrl-C cancels every scenario still applying or
//! validating; each of them still destroys before the suite returns.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tokio::sync::watch;

use super::outcome::ExecutionOutcome;
use super::runner::run_scenario;
use super::scenario::Scenario;
use crate::common::{Error, Result};
use crate::terraform::Provisioner;

/// A set of scenarios sharing a provisioner and run limits
pub struct Suite {
    provisioner: Arc<dyn Provisioner>,
    parallelism: usize,
    timeout: Option<Duration>,
    handle_interrupts: bool,
}

impl Suite {
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            provisioner,
            parallelism: 1,
            timeout: None,
            handle_interrupts: false,
        }
    }

    /// Maximum scenarios in flight at once (at least 1)
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Cancel the run after `timeout`; `None` waits indefinitely
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Treat SIGINT (Ctrl-C) and SIGTERM as cancellation
    pub fn with_interrupt_handling(mut self, enabled: bool) -> Self {
        self.handle_interrupts = enabled;
        self
    }

    /// Run every scenario and return outcomes in input order
    pub async fn run(&self, scenarios: Vec<Scenario>) -> Result<Vec<ExecutionOutcome>> {
        if self.handle_interrupts {
            self.run_until(scenarios, shutdown_signal()).await
        } else {
            self.run_until(scenarios, std::future::pending()).await
        }
    }

    /// Run every scenario, cancelling whatever is still in flight once
    /// `interrupt` resolves
    pub async fn run_until<F>(
        &self,
        scenarios: Vec<Scenario>,
        interrupt: F,
    ) -> Result<Vec<ExecutionOutcome>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        for (i, scenario) in scenarios.iter().enumerate() {
            if scenarios[..i].iter().any(|s| s.name == scenario.name) {
                return Err(Error::DuplicateScenario(scenario.name.clone()));
            }
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let watcher = self.spawn_watcher(cancel_tx, interrupt);

        tracing::info!(
            scenarios = scenarios.len(),
            parallelism = self.parallelism,
            "Starting run"
        );

        let outcomes: Vec<ExecutionOutcome> = stream::iter(scenarios)
            .map(|scenario| run_scenario(self.provisioner.clone(), scenario, cancel_rx.clone()))
            .buffered(self.parallelism)
            .collect()
            .await;

        watcher.abort();
        Ok(outcomes)
    }

    fn spawn_watcher<F>(
        &self,
        cancel: watch::Sender<bool>,
        interrupt: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let timeout = self.timeout;

        tokio::spawn(async move {
            let deadline = async {
                match timeout {
                    Some(t) => tokio::time::sleep(t).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = deadline => {
                    tracing::warn!(
                        timeout_secs = timeout.map(|t| t.as_secs()).unwrap_or_default(),
                        "Run timed out, cancelling and tearing down"
                    );
                }
                _ = interrupt => {
                    tracing::warn!("Interrupted, cancelling and tearing down");
                }
            }
            let _ = cancel.send(true);
        })
    }
}

/// Resolves on SIGTERM or SIGINT
///
/// Handlers are installed when this is called, so a signal arriving before
/// the future is first polled still counts.
#[cfg(unix)]
fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    use tokio::signal::unix::{signal, SignalKind};

    let handlers = signal(SignalKind::terminate())
        .and_then(|sigterm| Ok((sigterm, signal(SignalKind::interrupt())?)));

    async move {
        match handlers {
            Ok((mut sigterm, mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                    _ = sigint.recv() => tracing::info!("Received SIGINT (Ctrl+C)"),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
                std::future::pending::<()>().await
            }
        }
    }
}

#[cfg(not(unix))]
fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terraform::{Outputs, TerraformOptions};
    use crate::testing::outcome::{Phase, Status};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use serde_json::Value;
    use std::sync::Mutex;

    /// Applies take `delay`; records the peak number of concurrent applies
    #[derive(Default)]
    struct SlowProvisioner {
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
        destroyed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Provisioner for SlowProvisioner {
        async fn init_and_apply(&self, options: &TerraformOptions) -> Result<String> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let interrupted = match options.interrupt.clone() {
                Some(mut interrupt) => tokio::select! {
                    _ = tokio::time::sleep(self.delay) => false,
                    _ = interrupt.requested() => true,
                },
                None => {
                    tokio::time::sleep(self.delay).await;
                    false
                }
            };
            self.active.fetch_sub(1, Ordering::SeqCst);
            if interrupted {
                return Err(Error::Interrupted {
                    command: "apply".to_string(),
                });
            }
            Ok(String::new())
        }

        async fn output_json(&self, _options: &TerraformOptions, _name: &str) -> Result<Value> {
            Ok(Value::String("value".to_string()))
        }

        async fn output_all(&self, _options: &TerraformOptions) -> Result<Outputs> {
            Ok(Outputs::new())
        }

        async fn destroy(&self, options: &TerraformOptions) -> Result<String> {
            self.destroyed
                .lock()
                .unwrap()
                .push(options.working_dir.display().to_string());
            Ok(String::new())
        }
    }

    fn scenarios(dir: &std::path::Path, names: &[&str]) -> Vec<Scenario> {
        names
            .iter()
            .map(|name| Scenario::new(*name, TerraformOptions::new(dir)))
            .collect()
    }

    #[tokio::test]
    async fn test_outcomes_keep_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = Arc::new(SlowProvisioner::default());
        let mut input = scenarios(dir.path(), &["networking", "aks", "complete"]);
        input[1] = input[1].clone().skip("requires pre-existing networking resources");

        let outcomes = Suite::new(provisioner.clone())
            .with_parallelism(3)
            .run(input)
            .await
            .unwrap();

        let names: Vec<_> = outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["networking", "aks", "complete"]);
        assert_eq!(outcomes[1].status, Status::Skipped);
        assert_eq!(provisioner.destroyed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_parallelism_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = Arc::new(SlowProvisioner {
            delay: Duration::from_millis(20),
            ..Default::default()
        });

        let outcomes = Suite::new(provisioner.clone())
            .with_parallelism(2)
            .run(scenarios(dir.path(), &["a", "b", "c", "d", "e"]))
            .await
            .unwrap();

        assert!(outcomes.iter().all(|o| o.status == Status::Succeeded));
        assert!(provisioner.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_timeout_cancels_and_destroys() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = Arc::new(SlowProvisioner {
            delay: Duration::from_secs(600),
            ..Default::default()
        });

        let outcomes = Suite::new(provisioner.clone())
            .with_parallelism(2)
            .with_timeout(Some(Duration::from_millis(50)))
            .run(scenarios(dir.path(), &["a", "b"]))
            .await
            .unwrap();

        for outcome in &outcomes {
            assert_eq!(outcome.status, Status::Failed);
            assert_eq!(outcome.error.as_ref().unwrap().phase, Phase::Cancelled);
            assert!(outcome.destroyed);
        }
        assert_eq!(provisioner.destroyed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_external_interrupt_cancels_and_destroys() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = Arc::new(SlowProvisioner {
            delay: Duration::from_secs(600),
            ..Default::default()
        });
        let (signal_tx, signal_rx) = tokio::sync::oneshot::channel::<()>();

        let suite = Suite::new(provisioner.clone()).with_parallelism(3);
        let run = suite.run_until(scenarios(dir.path(), &["networking", "aks", "complete"]), async move {
            let _ = signal_rx.await;
        });
        let send = async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = signal_tx.send(());
        };
        let (outcomes, _) = tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(run, send)
        })
        .await
        .expect("interrupt should end the run promptly");
        let outcomes = outcomes.unwrap();

        for outcome in &outcomes {
            assert_eq!(outcome.status, Status::Failed);
            assert_eq!(outcome.error.as_ref().unwrap().phase, Phase::Cancelled);
            assert!(outcome.destroyed);
        }
        assert_eq!(provisioner.destroyed.lock().unwrap().len(), 3);
        assert_eq!(provisioner.active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = Arc::new(SlowProvisioner::default());

        let result = Suite::new(provisioner.clone())
            .run(scenarios(dir.path(), &["networking", "networking"]))
            .await;

        assert!(matches!(result, Err(Error::DuplicateScenario(name)) if name == "networking"));
        assert!(provisioner.destroyed.lock().unwrap().is_empty());
    }
}
