//! Bounded exponential backoff for retry-eligible upstream calls.
//!
//! Only price/quote lookups go through here. Analytics series are refreshed
//! often enough that the next cycle heals them.

use crate::config::RetryConfig;
use crate::domain::{FailureKind, UpstreamError};
use std::future::Future;
use std::time::Duration;
use tokio_retry::Retry;
use tracing::{debug, warn};

/// Delay before retry `n` (0-based) is `2^n * base_delay`, capped at
/// `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// The sleep schedule between attempts.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let base = self.base_delay;
        let cap = self.max_delay;
        (0..self.max_retries).map(move |attempt| {
            let factor = 2u32.saturating_pow(attempt as u32);
            base.saturating_mul(factor).min(cap)
        })
    }

    /// Worst-case time spent sleeping before giving up.
    pub fn total_backoff(&self) -> Duration {
        self.delays().sum()
    }
}

/// Run `operation` under `policy`, stopping at the first success.
///
/// Rate-limit responses follow the same schedule as other failures; they
/// are only logged differently. After the last attempt the final error is
/// returned unchanged.
pub async fn with_backoff<T, F, Fut>(
    upstream: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, UpstreamError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let total_attempts = policy.max_retries + 1;
    let mut attempt = 0usize;

    Retry::spawn(policy.delays(), || {
        attempt += 1;
        let current = attempt;
        let call = operation();
        async move {
            match call.await {
                Ok(value) => {
                    if current > 1 {
                        debug!(upstream, attempt = current, "Upstream recovered after retry");
                    }
                    Ok(value)
                }
                Err(e) => {
                    let will_retry = current < total_attempts;
                    if e.kind() == FailureKind::RateLimited {
                        warn!(
                            upstream,
                            attempt = current,
                            total_attempts,
                            "Rate limited by upstream{}",
                            if will_retry { ", backing off" } else { "" }
                        );
                    } else {
                        warn!(
                            upstream,
                            attempt = current,
                            total_attempts,
                            kind = e.kind().as_str(),
                            "Upstream call failed: {}",
                            e
                        );
                    }
                    if will_retry {
                        metrics::counter!("upstream_retries_total", "upstream" => upstream.to_string())
                            .increment(1);
                    }
                    Err(e)
                }
            }
        }
    })
    .await
}
