//! Per-call cancellation and deadline.

use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::WrapperError;

/// Cancellation token plus optional deadline carried by every call.
///
/// Cloning shares the token, so cancelling a parent context cancels every
/// call started from a clone. The deadline crosses the RPC boundary as a
/// relative `timeout_ms` and is enforced on both sides.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Context with no deadline and a fresh token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context driven by an existing token.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self { cancel: token, deadline: None }
    }

    /// Rebuild a context from a propagated `timeout_ms`.
    pub fn from_timeout_ms(timeout_ms: Option<u64>) -> Self {
        let ctx = Self::new();
        match timeout_ms {
            Some(ms) => ctx.with_timeout(Duration::from_millis(ms)),
            None => ctx,
        }
    }

    /// Set the deadline to `timeout` from now. Keeps an earlier deadline.
    ///
    /// A timeout too large to represent as an instant leaves the context
    /// unchanged.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Set an absolute deadline. Keeps an earlier deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |current| current.min(deadline)));
        self
    }

    /// Child context: cancelled with this one, but cancellable on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self { cancel: self.cancel.child_token(), deadline: self.deadline }
    }

    /// Cancel this context and every clone of it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token observed by calls made with this context.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Absolute deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `Some(ZERO)` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Remaining time in whole milliseconds for the wire.
    ///
    /// Rounds up, so a live deadline never propagates as zero.
    pub fn timeout_ms(&self) -> Option<u64> {
        self.remaining().map(|remaining| {
            let ms = remaining.as_millis() + u128::from(remaining.subsec_nanos() % 1_000_000 != 0);
            u64::try_from(ms).unwrap_or(u64::MAX)
        })
    }

    /// Fail fast if the context is already cancelled or expired.
    pub fn check(&self, op: &str) -> Result<(), WrapperError> {
        if self.cancel.is_cancelled() {
            return Err(WrapperError::Cancelled { op: op.to_string() });
        }
        if self.remaining().is_some_and(|remaining| remaining.is_zero()) {
            return Err(WrapperError::DeadlineExceeded { op: op.to_string() });
        }
        Ok(())
    }

    /// Run `fut` under this context.
    ///
    /// Cancellation wins over the deadline, and both win over a result that
    /// becomes ready in the same poll.
    pub async fn run<T, F>(&self, op: &str, fut: F) -> Result<T, WrapperError>
    where
        F: Future<Output = Result<T, WrapperError>>,
    {
        self.check(op)?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(WrapperError::Cancelled { op: op.to_string() }),
            () = deadline => Err(WrapperError::DeadlineExceeded { op: op.to_string() }),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_returns_inner_result() {
        let ctx = CallContext::new();
        let value = ctx.run("key_id", async { Ok::<_, WrapperError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn cancelled_context_fails_before_running() {
        let ctx = CallContext::new();
        ctx.cancel();

        let result = ctx.run("wrap", async { Ok::<_, WrapperError>(()) }).await;
        assert_eq!(result, Err(WrapperError::Cancelled { op: "wrap".to_string() }));
    }

    #[tokio::test]
    async fn cancellation_interrupts_pending_call() {
        let ctx = CallContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = ctx.run("unwrap", std::future::pending::<Result<(), WrapperError>>()).await;
        assert_eq!(result, Err(WrapperError::Cancelled { op: "unwrap".to_string() }));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_pending_call() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(50));

        let pending = std::future::pending::<Result<(), WrapperError>>();
        let result = ctx.run("compute_hmac", pending).await;
        assert_eq!(result, Err(WrapperError::DeadlineExceeded { op: "compute_hmac".to_string() }));
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_deadline_is_kept() {
        let ctx = CallContext::new()
            .with_timeout(Duration::from_millis(100))
            .with_timeout(Duration::from_secs(10));

        assert_eq!(ctx.timeout_ms(), Some(100));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_timeout_leaves_context_unchanged() {
        let ctx = CallContext::new().with_timeout(Duration::MAX);
        assert_eq!(ctx.deadline(), None);
        assert!(ctx.check("encrypt").is_ok());

        let ctx = CallContext::new()
            .with_timeout(Duration::from_millis(100))
            .with_timeout(Duration::MAX);
        assert_eq!(ctx.timeout_ms(), Some(100));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_ms_round_trips() {
        let ctx = CallContext::from_timeout_ms(Some(250));
        assert_eq!(ctx.timeout_ms(), Some(250));
        assert_eq!(CallContext::from_timeout_ms(None).timeout_ms(), None);
    }

    #[tokio::test]
    async fn child_cancel_leaves_parent_alive() {
        let parent = CallContext::new();
        let child = parent.child();
        child.cancel();

        assert!(parent.check("wrap").is_ok());
        assert!(child.check("wrap").is_err());

        parent.cancel();
        assert!(parent.child().check("wrap").is_err());
    }
}
