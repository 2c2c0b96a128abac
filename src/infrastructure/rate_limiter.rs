//! Outbound rate limiter for upstream providers.
//!
//! Sliding one-minute window. A denied call never reaches the network; the
//! caller reports it as `UpstreamError::RateLimited`.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use utoipa::ToSchema;

#[derive(Clone)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    requests: Arc<RwLock<Vec<Instant>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the specified requests per minute
    pub fn new(requests_per_minute: u32) -> Self {
        Self::with_window(requests_per_minute, Duration::from_secs(60))
    }

    pub fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Check if a request is allowed and record it if so
    ///
    /// Returns true if the request is allowed, false if rate limit exceeded
    pub async fn check_and_record(&self) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        requests.retain(|&time| now.duration_since(time) < self.window);

        if requests.len() < self.limit as usize {
            requests.push(now);
            true
        } else {
            false
        }
    }

    /// Current usage; `reset_in_secs` is when the oldest request in the
    /// window expires.
    pub async fn stats(&self) -> RateLimitStats {
        let now = Instant::now();
        let requests = self.requests.read().await;

        let live: Vec<&Instant> = requests
            .iter()
            .filter(|&&time| now.duration_since(time) < self.window)
            .collect();
        let used = live.len() as u32;
        let reset_in_secs = live
            .iter()
            .min()
            .map(|oldest| self.window.saturating_sub(now.duration_since(**oldest)).as_secs())
            .unwrap_or(0);

        RateLimitStats {
            limit: self.limit,
            remaining: self.limit.saturating_sub(used),
            used,
            reset_in_secs,
        }
    }
}

/// Rate limit statistics
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStats {
    pub limit: u32,
    pub remaining: u32,
    pub used: u32,
    pub reset_in_secs: u64,
}
