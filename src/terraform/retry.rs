//! Retry policy for transient terraform failures
//!
//! Terraform commands fail for reasons that have nothing to do with the
//! module under test: registry outages, provider download hiccups, eventual
//! consistency in the cloud API. Failures whose output contains a known
//! signature are retried after a fixed delay; anything else fails at once.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use crate::common::Result;

/// Output signatures retried by default, with a human-readable description
const DEFAULT_RETRYABLE_ERRORS: &[(&str, &str)] = &[
    ("read: connection reset by peer", "Failed to reach helm charts repository."),
    ("transport is closing", "Failed to reach Kubernetes API."),
    ("unable to verify signature", "Failed to retrieve plugin due to transient network error."),
    ("unable to verify checksum", "Failed to retrieve plugin due to transient network error."),
    ("no provider exists with the given name", "Failed to retrieve plugin due to transient network error."),
    ("registry service is unreachable", "Failed to retrieve plugin due to transient network error."),
    ("Error installing provider", "Failed to retrieve plugin due to transient network error."),
    ("Failed to query available provider packages", "Failed to retrieve plugin due to transient network error."),
    ("timeout while waiting for plugin to start", "Failed to retrieve plugin due to transient network error."),
    ("timed out waiting for server handshake", "Failed to retrieve plugin due to transient network error."),
    ("could not query provider registry for", "Failed to retrieve plugin due to transient network error."),
    ("Provider produced inconsistent result after apply", "Provider eventual consistency error."),
];

/// Which failures to retry, how often, and how long to wait between attempts
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Fixed delay between attempts
    pub time_between_retries: Duration,
    /// Output signature -> description
    pub retryable_errors: BTreeMap<String, String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            time_between_retries: Duration::from_secs(5),
            retryable_errors: DEFAULT_RETRYABLE_ERRORS
                .iter()
                .map(|(sig, desc)| (sig.to_string(), desc.to_string()))
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            time_between_retries: Duration::ZERO,
            retryable_errors: BTreeMap::new(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_time_between_retries(mut self, delay: Duration) -> Self {
        self.time_between_retries = delay;
        self
    }

    pub fn with_retryable_error(mut self, signature: &str, description: &str) -> Self {
        self.retryable_errors
            .insert(signature.to_string(), description.to_string());
        self
    }

    /// Description of the first retryable signature found in `output`
    pub fn classify(&self, output: &str) -> Option<&str> {
        self.retryable_errors
            .iter()
            .find(|(signature, _)| output.contains(signature.as_str()))
            .map(|(_, description)| description.as_str())
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or runs out of retries
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let Some(description) = err.output().and_then(|output| self.classify(output)) else {
                return Err(err);
            };

            if attempt > self.max_retries {
                tracing::error!(
                    operation = %operation_name,
                    attempt,
                    reason = %description,
                    "Retryable error persisted after max retries"
                );
                return Err(err);
            }

            tracing::warn!(
                operation = %operation_name,
                attempt,
                reason = %description,
                delay_secs = self.time_between_retries.as_secs(),
                "Retryable terraform error, retrying"
            );

            tokio::time::sleep(self.time_between_retries).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(max_retries)
            .with_time_between_retries(Duration::ZERO)
    }

    #[test]
    fn test_classify_default_signatures() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.classify("Error: Failed to query available provider packages for azurerm"),
            Some("Failed to retrieve plugin due to transient network error.")
        );
        assert_eq!(policy.classify("Error: insufficient quota"), None);
    }

    #[tokio::test]
    async fn test_retries_retryable_error_then_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = fast_policy(3)
            .run("apply", || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::command_failed("apply", Some(1), "transport is closing"))
                } else {
                    Ok("applied")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "applied");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = fast_policy(2)
            .run("apply", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::command_failed("apply", Some(1), "registry service is unreachable"))
            })
            .await;

        let err = result.unwrap_err();
        assert!(fast_policy(2).classify(err.output().unwrap()).is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = fast_policy(3)
            .run("apply", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::command_failed("apply", Some(1), "Error: invalid CIDR block"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_none_policy_never_retries() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let _: Result<()> = RetryPolicy::none()
            .run("destroy", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::command_failed("destroy", Some(1), "transport is closing"))
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
