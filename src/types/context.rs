//! Per-call deadline and cancellation.
//!
//! A [`RequestContext`] is threaded from the terminal send operation down to
//! the transport, which runs every network future under [`RequestContext::run`].
//! Whichever fires first wins: the request completing, the deadline elapsing
//! ([`RestError::Timeout`]) or the cancel handle being triggered
//! ([`RestError::Cancelled`]). In-flight reads and writes are dropped at once.
//!
//! # Examples
//!
//! ```
//! use rest_chain::RequestContext;
//! use std::time::Duration;
//!
//! let ctx = RequestContext::with_timeout(Duration::from_secs(5));
//! assert!(ctx.deadline().is_some());
//!
//! let (ctx, handle) = RequestContext::with_cancel();
//! handle.cancel();
//! assert!(ctx.is_cancelled());
//! ```

use crate::error::{RestError, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Deadline and cancellation signal for one request
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Triggers cancellation of every context cloned from its pair
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel all in-flight and future calls using the paired context
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl RequestContext {
    /// Context without deadline or cancellation
    pub fn background() -> Self {
        Self::default()
    }

    /// Context that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().deadline_at(Instant::now() + timeout)
    }

    /// Context that expires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::background().deadline_at(deadline)
    }

    /// Cancellable context and the handle that cancels it
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        let ctx = RequestContext {
            deadline: None,
            cancel: Some(receiver),
        };
        (ctx, CancelHandle { sender })
    }

    /// Tighten the deadline; an earlier existing deadline is kept
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// Current deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once the paired [`CancelHandle`] fired
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Fail fast when the context is already done
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(RestError::Cancelled);
        }
        if matches!(self.deadline, Some(d) if d <= Instant::now()) {
            return Err(RestError::Timeout);
        }
        Ok(())
    }

    /// Drive `fut` until it completes, the deadline passes or the context is cancelled
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        let deadline = self.deadline;
        let cancel = self.cancel.clone();
        tokio::select! {
            res = fut => res,
            _ = expired(deadline) => Err(RestError::Timeout),
            _ = cancelled(cancel) => Err(RestError::Cancelled),
        }
    }
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(tokio::time::Instant::from_std(d)).await,
        None => std::future::pending().await,
    }
}

async fn cancelled(cancel: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = cancel {
        // A dropped handle can never cancel.
        let fired = rx.wait_for(|c| *c).await.is_ok();
        if fired {
            return;
        }
    }
    std::future::pending::<()>().await
}
