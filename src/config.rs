//! Service configuration loaded from `config.yaml` plus environment overrides.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    /// Server configuration (host, port, CORS origins)
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream provider endpoints and per-call budgets
    #[serde(default)]
    pub upstreams: UpstreamsConfig,
    /// Backoff policy for price lookups
    #[serde(default)]
    pub retry: RetryConfig,
    /// Scheduler settings
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Rolling history settings
    #[serde(default)]
    pub history: HistoryConfig,
    /// Assets tracked on the dashboard
    #[serde(default = "default_assets")]
    pub assets: Vec<AssetConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstreams: UpstreamsConfig::default(),
            retry: RetryConfig::default(),
            refresh: RefreshConfig::default(),
            history: HistoryConfig::default(),
            assets: default_assets(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Comma-separated list of allowed CORS origins (default: "*")
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3010
}
fn default_allowed_origins() -> String {
    "*".to_string()
}

/// One upstream provider.
#[derive(Deserialize, Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Outbound request budget per minute
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_requests_per_minute() -> u32 {
    30
}

#[derive(Deserialize, Debug, Clone)]
pub struct UpstreamsConfig {
    #[serde(default = "default_price_upstream")]
    pub price: UpstreamConfig,
    #[serde(default = "default_analytics_upstream")]
    pub analytics: UpstreamConfig,
    #[serde(default = "default_news_upstream")]
    pub news: UpstreamConfig,
}

impl Default for UpstreamsConfig {
    fn default() -> Self {
        Self {
            price: default_price_upstream(),
            analytics: default_analytics_upstream(),
            news: default_news_upstream(),
        }
    }
}

fn default_price_upstream() -> UpstreamConfig {
    UpstreamConfig {
        base_url: "https://api.coingecko.com/api/v3".to_string(),
        timeout_secs: 30,
        requests_per_minute: 30,
        api_key: None,
    }
}

fn default_analytics_upstream() -> UpstreamConfig {
    UpstreamConfig {
        base_url: "https://analytics.chainpulse.local/v1".to_string(),
        timeout_secs: 15,
        requests_per_minute: 120,
        api_key: None,
    }
}

fn default_news_upstream() -> UpstreamConfig {
    UpstreamConfig {
        base_url: "https://min-api.cryptocompare.com/data/v2".to_string(),
        timeout_secs: 10,
        requests_per_minute: 60,
        api_key: None,
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_retries() -> usize {
    3
}
fn default_base_delay_ms() -> u64 {
    2000
}
fn default_max_delay_ms() -> u64 {
    30_000
}

#[derive(Deserialize, Debug, Clone)]
pub struct RefreshConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_range")]
    pub default_range: String,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            default_range: default_range(),
        }
    }
}

fn default_interval_secs() -> u64 {
    60
}
fn default_range() -> String {
    "7d".to_string()
}

#[derive(Deserialize, Debug, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    7
}

/// A tracked asset and the reference figures used when no real quote has
/// been seen yet.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AssetConfig {
    /// Provider asset id (e.g. "avalanche-2")
    pub id: String,
    pub symbol: String,
    pub reference_price: f64,
    #[serde(default)]
    pub reference_market_cap_usd: f64,
    #[serde(default)]
    pub reference_volume_usd: f64,
}

fn default_assets() -> Vec<AssetConfig> {
    vec![
        AssetConfig {
            id: "avalanche-2".to_string(),
            symbol: "AVAX".to_string(),
            reference_price: 28.0,
            reference_market_cap_usd: 9_000_000_000.0,
            reference_volume_usd: 350_000_000.0,
        },
        AssetConfig {
            id: "bitcoin".to_string(),
            symbol: "BTC".to_string(),
            reference_price: 65_000.0,
            reference_market_cap_usd: 1_280_000_000_000.0,
            reference_volume_usd: 30_000_000_000.0,
        },
        AssetConfig {
            id: "ethereum".to_string(),
            symbol: "ETH".to_string(),
            reference_price: 3_200.0,
            reference_market_cap_usd: 385_000_000_000.0,
            reference_volume_usd: 15_000_000_000.0,
        },
        AssetConfig {
            id: "joe".to_string(),
            symbol: "JOE".to_string(),
            reference_price: 0.35,
            reference_market_cap_usd: 130_000_000.0,
            reference_volume_usd: 12_000_000.0,
        },
    ]
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {} - check YAML syntax", path.display()))?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use built-in defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!(
                "{} not found, using built-in configuration defaults",
                path.display()
            );
            Ok(Self::default())
        }
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Ok(key) = std::env::var("PRICE_API_KEY") {
            self.upstreams.price.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("ANALYTICS_BASE_URL") {
            self.upstreams.analytics.base_url = url;
        }
        if let Ok(key) = std::env::var("NEWS_API_KEY") {
            self.upstreams.news.api_key = Some(key);
        }
    }
}
