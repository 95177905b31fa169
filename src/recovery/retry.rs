//! Retry with backoff for external calls
//!
//! One policy shape covers every external-call boundary: speech recognition,
//! answer generation, synthesis, and recording downloads. Whether a failure is
//! retried at all is decided by its [`ErrorCategory`].
//!
//! [`ErrorCategory`]: super::ErrorCategory

use std::future::Future;
use std::time::{Duration, SystemTime};

use crate::Result;

/// Retry policy for a class of external calls
///
/// Controls how many times a failed call is retried and how long to wait
/// between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt unless fixed)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Add 0-25% jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy with a constant delay between attempts
    #[must_use]
    pub const fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            max_delay: delay,
            jitter: false,
        }
    }

    /// Policy that never retries
    #[must_use]
    pub const fn none() -> Self {
        Self::fixed(0, Duration::ZERO)
    }
}

/// Compute the delay before the next retry attempt.
///
/// The delay follows exponential backoff: `min(base_delay * 2^attempt + jitter, max_delay)`.
/// Jitter is 0-25% of the computed delay, derived from `SystemTime` to avoid
/// pulling in a full random number generator.
#[must_use]
pub fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt));
    let base = base.min(policy.max_delay);

    if !policy.jitter {
        return base;
    }

    // Derive a simple jitter from subsecond nanos of the system clock
    let jitter_nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();

    // Scale to 0-25% of the base delay
    let jitter_fraction = f64::from(jitter_nanos % 250) / 1000.0;
    let jitter = base.mul_f64(jitter_fraction);

    (base + jitter).min(policy.max_delay)
}

/// Run `op` until it succeeds, its error is not retryable, or retries run out.
///
/// Sleeps happen on the calling task, which for pipeline stages is the
/// background job, never a webhook request.
///
/// # Errors
///
/// Returns the last error from `op`
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let category = e.category();
                if !category.is_retryable() || attempt >= policy.max_retries {
                    if attempt > 0 {
                        tracing::warn!(
                            operation,
                            attempts = attempt + 1,
                            category = category.as_str(),
                            error = %e,
                            "giving up after retries"
                        );
                    }
                    return Err(e);
                }

                let delay = delay_for_attempt(policy, attempt);
                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    category = category.as_str(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
