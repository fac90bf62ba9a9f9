use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Operation, SqlAdapterError};

/// Cancellation and deadline carried into every native call.
///
/// Cloning shares the cancellation token, so cancelling any clone cancels all of them.
/// ```rust
/// use std::time::Duration;
/// use sql_engine_adapter::prelude::*;
///
/// let ctx = Context::background().with_timeout(Duration::from_secs(5));
/// assert!(!ctx.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Build a context driven by an existing cancellation token.
    #[must_use]
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// A context cancelled when either this one or the returned child is cancelled.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Run `fut` unless the context is cancelled or its deadline passes first.
    ///
    /// A context that is already done fails before `fut` is polled, so no native call is issued.
    ///
    /// # Errors
    /// Returns `Cancelled`/`DeadlineExceeded` for `op`, or whatever `fut` returns.
    pub(crate) async fn run<T, F>(&self, op: Operation, fut: F) -> Result<T, SqlAdapterError>
    where
        F: Future<Output = Result<T, SqlAdapterError>>,
    {
        if self.token.is_cancelled() {
            return Err(SqlAdapterError::Cancelled(op));
        }
        if let Some(deadline) = self.deadline
            && deadline <= Instant::now()
        {
            return Err(SqlAdapterError::DeadlineExceeded(op));
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(SqlAdapterError::Cancelled(op)),
            () = deadline => Err(SqlAdapterError::DeadlineExceeded(op)),
            res = fut => res,
        }
    }
}
