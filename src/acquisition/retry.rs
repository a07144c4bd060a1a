//! Bounded retry for single network operations.
//!
//! Distinct from the queue level `attempts` counter: this retries one request
//! a few times within a download, while the queue counter retries the whole
//! download across scheduler passes.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::error::AcquisitionError;
use crate::config::AcquisitionSettings;

/// Retry policy for a single network call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    /// 1.0 keeps the delay fixed.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Create a new RetryPolicy from configuration settings.
    pub fn new(config: &AcquisitionSettings) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
            backoff_multiplier: 1.0,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        self.delay.mul_f64(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(200),
            backoff_multiplier: 1.0,
        }
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// attempt budget is spent. The last error is returned on exhaustion.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, AcquisitionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AcquisitionError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", label, attempt);
                }
                return Ok(value);
            }
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt >= policy.max_attempts => {
                warn!("{} failed after {} attempts: {}", label, attempt, e);
                return Err(e);
            }
            Err(e) => {
                debug!(
                    "{} attempt {}/{} failed: {}",
                    label, attempt, policy.max_attempts, e
                );
                tokio::time::sleep(policy.delay_after(attempt)).await;
                attempt += 1;
            }
        }
    }
}
