//! Retry policy for the `*_with_retry` send operations.
//!
//! Retrying is a pure wrapper: each attempt re-runs the whole
//! resolve/encode/dispatch cycle (re-reading file attachments and re-emitting
//! the curl command), then hands the outcome to a caller predicate. The
//! predicate decides success (`Ok(())`) or failure (`Err(reason)`); only the
//! options here decide how many attempts are made and how long to wait.
//!
//! # Examples
//!
//! ```
//! use rest_chain::client::{exponential_backoff, is_retryable_status, DelayType, RetryOptions};
//! use std::time::Duration;
//!
//! let options = RetryOptions::new()
//!     .attempts(3)
//!     .delay(Duration::from_millis(200))
//!     .delay_type(DelayType::Fixed)
//!     .last_error_only(true);
//! assert_eq!(options.delay_for(2), Duration::from_millis(200));
//!
//! assert!(is_retryable_status(503));
//! assert!(!is_retryable_status(404));
//! assert_eq!(exponential_backoff(2, 100), Duration::from_millis(400));
//! ```

use crate::error::{RestError, Result};
use crate::types::{RequestContext, Response};
use std::fmt;
use std::time::Duration;

type OnRetry = Box<dyn Fn(u32, &RestError) + Send + Sync>;
type RetryIf = Box<dyn Fn(&RestError) -> bool + Send + Sync>;

/// How the wait between attempts grows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelayType {
    /// Same delay before every retry
    Fixed,
    /// `delay * 2^n` before retry `n + 1`
    #[default]
    Exponential,
}

/// Attempt count, delays and hooks for a retrying send
pub struct RetryOptions {
    attempts: u32,
    delay: Duration,
    max_delay: Option<Duration>,
    delay_type: DelayType,
    on_retry: Option<OnRetry>,
    retry_if: Option<RetryIf>,
    last_error_only: bool,
}

impl RetryOptions {
    /// 10 attempts, 100 ms exponential delay
    pub fn new() -> Self {
        RetryOptions {
            attempts: 10,
            delay: Duration::from_millis(100),
            max_delay: None,
            delay_type: DelayType::Exponential,
            on_retry: None,
            retry_if: None,
            last_error_only: false,
        }
    }

    /// Total attempts including the first; at least one is always made
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Base delay between attempts
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Upper bound for any single delay
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Delay growth strategy
    pub fn delay_type(mut self, delay_type: DelayType) -> Self {
        self.delay_type = delay_type;
        self
    }

    /// Called with the 1-based attempt number and its error before each wait
    pub fn on_retry(mut self, f: impl Fn(u32, &RestError) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Box::new(f));
        self
    }

    /// Stop retrying as soon as this returns false for a predicate error
    pub fn retry_if(mut self, f: impl Fn(&RestError) -> bool + Send + Sync + 'static) -> Self {
        self.retry_if = Some(Box::new(f));
        self
    }

    /// Return only the final error instead of [`RestError::RetriesExhausted`]
    pub fn last_error_only(mut self, last_error_only: bool) -> Self {
        self.last_error_only = last_error_only;
        self
    }

    /// Configured attempt count
    pub fn max_attempts(&self) -> u32 {
        self.attempts
    }

    /// Wait after the failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = match self.delay_type {
            DelayType::Fixed => self.delay,
            DelayType::Exponential => {
                let base_ms = self.delay.as_millis().min(u64::MAX as u128) as u64;
                exponential_backoff(attempt.saturating_sub(1), base_ms)
            }
        };
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("attempts", &self.attempts)
            .field("delay", &self.delay)
            .field("max_delay", &self.max_delay)
            .field("delay_type", &self.delay_type)
            .field("last_error_only", &self.last_error_only)
            .finish()
    }
}

/// Bookkeeping for one retrying call
pub(crate) struct RetryLoop<'a> {
    options: &'a RetryOptions,
    attempt: u32,
    errors: Vec<RestError>,
}

impl<'a> RetryLoop<'a> {
    pub(crate) fn new(options: &'a RetryOptions) -> Self {
        RetryLoop {
            options,
            attempt: 0,
            errors: Vec::new(),
        }
    }

    /// Advance to the next attempt; false once the budget is spent
    pub(crate) fn next_attempt(&mut self) -> bool {
        if self.attempt >= self.options.attempts {
            return false;
        }
        self.attempt += 1;
        true
    }

    /// Record a failed attempt and wait before the next one.
    ///
    /// Returns the error back when it must not be retried, and `Timeout` or
    /// `Cancelled` when `ctx` ends during the wait.
    pub(crate) async fn failed(&mut self, ctx: &RequestContext, err: RestError) -> Result<()> {
        if let Some(retry_if) = &self.options.retry_if {
            if !retry_if(&err) {
                return Err(err);
            }
        }
        if self.attempt < self.options.attempts {
            let delay = self.options.delay_for(self.attempt);
            tracing::warn!(
                "Request failed (attempt {}), retrying after {:?}: {}",
                self.attempt,
                delay,
                err
            );
            if let Some(on_retry) = &self.options.on_retry {
                on_retry(self.attempt, &err);
            }
            ctx.run(async {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await?;
        }
        self.errors.push(err);
        Ok(())
    }

    /// Final error once every attempt failed
    pub(crate) fn exhausted(mut self) -> RestError {
        if self.options.last_error_only {
            if let Some(last) = self.errors.pop() {
                return last;
            }
        }
        RestError::RetriesExhausted {
            attempts: self.attempt,
            errors: self.errors,
        }
    }
}

/// Predicate accepting only a 2xx response
///
/// Transport errors and other statuses become predicate errors, so they are
/// retried.
pub fn require_success(outcome: &Result<Response>) -> Result<()> {
    match outcome {
        Ok(response) if response.is_success() => Ok(()),
        Ok(response) => Err(RestError::handler(format!(
            "http status code: {}",
            response.status_code()
        ))),
        Err(e) => Err(RestError::handler(e.to_string())),
    }
}

/// Check if status code indicates retryable error
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 502 | 503 | 504)
}

/// Exponential backoff delay calculation
///
/// Returns `base_ms * 2^attempt`, with the exponent capped at 10
pub fn exponential_backoff(attempt: u32, base_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2_u64.pow(attempt.min(10)));
    Duration::from_millis(delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, StatusCode, Version};

    #[test]
    fn test_is_retryable_status() {
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(404));
    }

    #[test]
    fn test_exponential_backoff() {
        let delay0 = exponential_backoff(0, 100);
        let delay1 = exponential_backoff(1, 100);
        assert!(delay1 > delay0);
        assert_eq!(exponential_backoff(30, 1), Duration::from_millis(1024));
    }

    #[test]
    fn test_delay_for_respects_cap() {
        let options = RetryOptions::new()
            .delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(250));
        assert_eq!(options.delay_for(1), Duration::from_millis(100));
        assert_eq!(options.delay_for(2), Duration::from_millis(200));
        assert_eq!(options.delay_for(3), Duration::from_millis(250));
    }

    #[test]
    fn test_attempts_never_zero() {
        assert_eq!(RetryOptions::new().attempts(0).max_attempts(), 1);
    }

    #[test]
    fn test_require_success() {
        let ok = Response::new(StatusCode::OK, Version::HTTP_11, HeaderMap::new(), "");
        let busy = Response::new(
            StatusCode::GATEWAY_TIMEOUT,
            Version::HTTP_11,
            HeaderMap::new(),
            "",
        );
        assert!(require_success(&Ok(ok)).is_ok());
        let err = require_success(&Ok(busy)).unwrap_err();
        assert_eq!(err.to_string(), "http status code: 504");
        assert!(require_success(&Err(RestError::Timeout)).is_err());
    }

    #[tokio::test]
    async fn test_loop_collects_every_error() {
        let options = RetryOptions::new().attempts(3).delay(Duration::ZERO);
        let ctx = RequestContext::background();
        let mut retry = RetryLoop::new(&options);
        let mut runs = 0;
        while retry.next_attempt() {
            runs += 1;
            retry.failed(&ctx, RestError::handler("nope")).await.unwrap();
        }
        assert_eq!(runs, 3);
        match retry.exhausted() {
            RestError::RetriesExhausted { attempts, errors } => {
                assert_eq!(attempts, 3);
                assert_eq!(errors.len(), 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_if_stops_early() {
        let options = RetryOptions::new()
            .delay(Duration::ZERO)
            .retry_if(|e| !matches!(e, RestError::Cancelled));
        let mut retry = RetryLoop::new(&options);
        assert!(retry.next_attempt());
        let err = retry
            .failed(&RequestContext::background(), RestError::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, RestError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_cuts_the_wait_short() {
        let options = RetryOptions::new()
            .attempts(2)
            .delay(Duration::from_secs(3))
            .delay_type(DelayType::Fixed);
        let (ctx, handle) = RequestContext::with_cancel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });

        let mut retry = RetryLoop::new(&options);
        assert!(retry.next_attempt());
        let started = std::time::Instant::now();
        let err = retry
            .failed(&ctx, RestError::handler("status 503"))
            .await
            .unwrap_err();
        assert!(matches!(err, RestError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_deadline_cuts_the_wait_short() {
        let options = RetryOptions::new()
            .attempts(2)
            .delay(Duration::from_secs(3))
            .delay_type(DelayType::Fixed);
        let ctx = RequestContext::with_timeout(Duration::from_millis(50));

        let mut retry = RetryLoop::new(&options);
        assert!(retry.next_attempt());
        let err = retry
            .failed(&ctx, RestError::handler("status 503"))
            .await
            .unwrap_err();
        assert!(matches!(err, RestError::Timeout));
    }
}
