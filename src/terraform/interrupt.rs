//! Graceful interruption of running terraform commands
//!
//! Terraform only writes state for half-created resources when it is
//! stopped with SIGINT and allowed to finish; a SIGKILL loses them.

use std::time::Duration;

use tokio::sync::watch;

/// How long an interrupted terraform gets to exit before it is killed
pub const DEFAULT_INTERRUPT_GRACE: Duration = Duration::from_secs(120);

/// Cancellation request observed by a running terraform command
#[derive(Debug, Clone)]
pub struct Interrupt {
    rx: watch::Receiver<bool>,
}

impl Interrupt {
    /// Interrupt once `rx` reads `true`
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once an interrupt is requested; never if the sender is gone
    pub async fn requested(&mut self) {
        if self.rx.wait_for(|r| *r).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Ask a child process to stop the way Ctrl-C would
#[cfg(unix)]
pub(crate) fn send_interrupt(pid: u32) {
    // SAFETY: kill(2) with a pid we spawned and a valid signal number
    let result = unsafe { libc::kill(pid as i32, libc::SIGINT) };
    if result != 0 {
        tracing::warn!(pid, error = %std::io::Error::last_os_error(), "Failed to send SIGINT");
    }
}

#[cfg(not(unix))]
pub(crate) fn send_interrupt(pid: u32) {
    tracing::warn!(pid, "Graceful interrupt not supported on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_requested_after_send() {
        let (tx, rx) = watch::channel(false);
        let mut interrupt = Interrupt::new(rx);
        assert!(!interrupt.is_requested());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), interrupt.requested())
            .await
            .unwrap();
        assert!(interrupt.is_requested());
    }

    #[tokio::test]
    async fn test_dropped_sender_never_requests() {
        let (tx, rx) = watch::channel(false);
        let mut interrupt = Interrupt::new(rx);
        drop(tx);

        let waited =
            tokio::time::timeout(Duration::from_millis(50), interrupt.requested()).await;
        assert!(waited.is_err());
    }
}
