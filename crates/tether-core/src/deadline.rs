//! Call contexts and their wire translation.
//!
//! A [`CallContext`] never crosses the wire. At the call boundary it becomes a
//! relative timeout in milliseconds (`0` = no deadline) and the receiving side
//! rebuilds a fresh context from that number, so the two processes' clocks are
//! never compared.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline-bearing, cancelable scope for one call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl CallContext {
    /// A context with no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context expiring `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context expiring at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            token: CancellationToken::new(),
        }
    }

    /// Rebuild a context from a wire timeout.
    pub fn from_timeout_ms(timeout_ms: u64) -> Self {
        if timeout_ms == 0 {
            Self::background()
        } else {
            Self::with_timeout(Duration::from_millis(timeout_ms))
        }
    }

    /// Milliseconds until the deadline, `0` when there is none.
    ///
    /// An elapsed deadline, or one less than a millisecond away, encodes as `1`
    /// so it can never be mistaken for "no deadline".
    pub fn timeout_ms(&self) -> u64 {
        match self.deadline {
            None => 0,
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX).max(1)
            }
        }
    }

    /// Absolute deadline, `None` when unbounded.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| d <= Instant::now())
    }

    /// Cancel the context and every call running under it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when [`CallContext::cancel`] is called.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Run `fut` bounded by this context's deadline and cancellation.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .map_err(|_| Error::DeadlineExceeded)?,
                None => fut.await,
            }
        };
        tokio::select! {
            _ = self.token.cancelled() => Err(Error::Cancelled),
            result = bounded => result,
        }
    }
}
