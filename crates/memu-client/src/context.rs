//! Per-call cancellation and deadline scope.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::CancelReason;

/// Cancellation token plus optional deadline attached to a logical call.
///
/// Every suspension point of a call (sending, reading, backoff sleeps) races
/// against this scope. Cloning shares the same token.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A scope that never cancels and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: cancel the call when `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Builder: abort the call once `deadline` passes.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Builder: abort the call `timeout` from now.
    ///
    /// A timeout too large to represent leaves the scope without a deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Get the cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Get the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel every call running under this scope.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Why this scope is already finished, if it is.
    pub fn check(&self) -> Result<(), CancelReason> {
        if self.token.is_cancelled() {
            return Err(CancelReason::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(CancelReason::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the scope finishes first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, CancelReason> {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(CancelReason::Cancelled),
            _ = deadline => Err(CancelReason::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = CallContext::new();
        assert_eq!(ctx.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn test_run_already_cancelled() {
        let ctx = CallContext::new();
        ctx.cancel();
        assert_eq!(ctx.check(), Err(CancelReason::Cancelled));
        assert_eq!(ctx.run(async { 7 }).await, Err(CancelReason::Cancelled));
    }

    #[tokio::test]
    async fn test_run_cancelled_while_pending() {
        let token = CancellationToken::new();
        let ctx = CallContext::new().with_cancellation(token.clone());
        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let result = ctx.run(std::future::pending::<()>()).await;
        assert_eq!(result, Err(CancelReason::Cancelled));
        trigger.await.unwrap();
    }

    #[tokio::test]
    async fn test_unbounded_timeout_has_no_deadline() {
        let ctx = CallContext::new().with_timeout(Duration::MAX);
        assert_eq!(ctx.deadline(), None);
        assert_eq!(ctx.check(), Ok(()));
        assert_eq!(ctx.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn test_scope_accessors() {
        let token = CancellationToken::new();
        let deadline = Instant::now() + Duration::from_secs(30);
        let ctx = CallContext::new()
            .with_cancellation(token.clone())
            .with_deadline(deadline);
        assert_eq!(ctx.deadline(), Some(deadline));

        token.cancel();
        assert!(ctx.token().is_cancelled());
        assert_eq!(ctx.check(), Err(CancelReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_deadline_exceeded() {
        let ctx = CallContext::new().with_timeout(Duration::from_secs(1));
        let result = ctx
            .run(tokio::time::sleep(Duration::from_secs(10)))
            .await;
        assert_eq!(result, Err(CancelReason::DeadlineExceeded));
    }
}
