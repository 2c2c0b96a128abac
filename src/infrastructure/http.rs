//! Shared JSON-over-HTTP plumbing for the upstream clients.

use crate::config::UpstreamConfig;
use crate::domain::UpstreamError;
use crate::infrastructure::rate_limiter::RateLimiter;
use anyhow::Context;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

const USER_AGENT: &str = "ChainPulseGateway/1.0";

/// One upstream endpoint: base URL, per-call timeout and optional outbound
/// limiter.
#[derive(Clone)]
pub struct UpstreamHttp {
    name: &'static str,
    client: Client,
    base_url: String,
    timeout_secs: u64,
    limiter: Option<RateLimiter>,
}

impl UpstreamHttp {
    pub fn new(name: &'static str, config: &UpstreamConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(USER_AGENT)
            .build()
            .with_context(|| format!("Failed to create HTTP client for {}", name))?;

        Ok(Self {
            name,
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
            limiter: None,
        })
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `{base_url}{path}` and decode the body as `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        headers: HeaderMap,
    ) -> Result<T, UpstreamError> {
        if let Some(limiter) = &self.limiter {
            if !limiter.check_and_record().await {
                warn!(upstream = self.name, "Outbound rate limit reached, skipping call");
                return Err(UpstreamError::RateLimited);
            }
        }

        let url = format!("{}{}", self.base_url, path);
        debug!(upstream = self.name, "Fetching {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .headers(headers)
            .query(query)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(e, self.timeout_secs))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(UpstreamError::RateLimited);
        }
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            debug!(
                upstream = self.name,
                status = status.as_u16(),
                "Upstream error body: {}",
                error_body.chars().take(200).collect::<String>()
            );
            return Err(UpstreamError::HttpStatus(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::from_reqwest(e, self.timeout_secs))?;
        if body.trim().is_empty() {
            return Err(UpstreamError::EmptyResult);
        }

        serde_json::from_str(&body).map_err(|e| UpstreamError::MalformedResponse(e.to_string()))
    }
}
