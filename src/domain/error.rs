//! Failure taxonomy for upstream calls.
//!
//! Every upstream client reports one of these variants. They never travel
//! past the client set: `application::UpstreamClientSet` logs them and turns
//! them into `DatasetResult::Unavailable`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Typed failure of a single upstream call.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The per-call timeout elapsed before a response arrived.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// HTTP 429, or the outbound limiter refused the call.
    #[error("rate limited by upstream")]
    RateLimited,

    /// Any other non-2xx status.
    #[error("upstream returned status {0}")]
    HttpStatus(u16),

    /// Connection or IO failure before a status was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// The payload could not be decoded into the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The payload decoded fine but carried no usable data.
    #[error("upstream returned no data")]
    EmptyResult,
}

/// Coarse failure classification, used for logs, metrics labels and
/// degraded notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Timeout,
    RateLimited,
    HttpStatus,
    Transport,
    MalformedResponse,
    EmptyResult,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::HttpStatus => "http_status",
            FailureKind::Transport => "transport",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::EmptyResult => "empty_result",
        }
    }
}

impl UpstreamError {
    pub fn kind(&self) -> FailureKind {
        match self {
            UpstreamError::Timeout(_) => FailureKind::Timeout,
            UpstreamError::RateLimited => FailureKind::RateLimited,
            UpstreamError::HttpStatus(_) => FailureKind::HttpStatus,
            UpstreamError::Transport(_) => FailureKind::Transport,
            UpstreamError::MalformedResponse(_) => FailureKind::MalformedResponse,
            UpstreamError::EmptyResult => FailureKind::EmptyResult,
        }
    }

    /// Map a reqwest failure onto the taxonomy.
    pub fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(timeout_secs)
        } else if err.is_decode() {
            UpstreamError::MalformedResponse(err.to_string())
        } else if let Some(status) = err.status() {
            if status.as_u16() == 429 {
                UpstreamError::RateLimited
            } else {
                UpstreamError::HttpStatus(status.as_u16())
            }
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

impl FailureKind {
    /// Message shown next to a metric card whose data is not fresh.
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureKind::RateLimited => {
                "Provider rate limit reached; showing estimated data until it resets"
            }
            FailureKind::Timeout => "Provider is responding slowly; data may be estimated",
            _ => "Provider unavailable; data may be estimated",
        }
    }
}
