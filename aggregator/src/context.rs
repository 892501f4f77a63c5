use crate::errors::{GatewayError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Cancellation signal and deadline shared by every downstream call made on
/// behalf of one inbound request.
#[derive(Clone, Debug)]
pub struct RequestContext {
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            cancellation: CancellationToken::new(),
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    /// Context without a deadline that is only cancelled explicitly.
    pub fn background() -> Self {
        Self::new(None)
    }

    /// Derived context: cancelled with its parent, never outlives its deadline.
    pub fn child(&self) -> Self {
        Self {
            cancellation: self.cancellation.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancels the context when the guard is dropped, e.g. when the inbound
    /// request future is dropped because the client went away.
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.cancellation.clone().drop_guard()
    }

    /// Drives `fut` until it completes, the context is cancelled or the
    /// deadline passes. In the latter two cases `fut` is dropped.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let deadline = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => {
                Err(GatewayError::Transport("request cancelled".to_string()))
            }
            _ = deadline => Err(GatewayError::Transport("deadline exceeded".to_string())),
            result = fut => result,
        }
    }
}
