//! Bounded retry for upstream calls.
//!
//! Only transport failures (see [`CheckinError::is_transient`]) are retried.
//! A malformed or rejected response is an answer, not an outage, and is
//! returned to the caller on the first attempt.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{CheckinError, Result};

/// How often and how patiently an upstream call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Fixed wait between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

impl RetryPolicy {
    /// Creates a policy with the given attempt cap and delay.
    #[must_use]
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// A policy that retries without waiting.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }
}

/// Runs `operation` until it succeeds, fails non-transiently, or the policy's
/// attempts are used up.
///
/// Each call keeps its own attempt counter. After the last failed attempt no
/// delay is taken and [`CheckinError::RetryExhausted`] is returned.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                if attempt >= max_attempts {
                    return Err(CheckinError::retry_exhausted(name, attempt));
                }
                warn!(
                    operation = name,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Request failed, retrying in {}s",
                    policy.delay.as_secs()
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
