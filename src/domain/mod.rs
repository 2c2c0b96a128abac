//! Domain layer - core entities and upstream source traits.
//!
//! This module defines the domain model of the metrics gateway:
//! - Source traits for the external providers (price/market data,
//!   network analytics, news) implemented in `infrastructure`
//! - Time windows and range tokens
//! - Snapshot entities published to consumers
//! - The upstream failure taxonomy

pub mod error;
pub mod models;
pub mod time_window;

pub use error::*;
pub use models::*;
pub use time_window::*;

use async_trait::async_trait;
use std::collections::HashMap;

/// Price/market-data provider.
///
/// # Implementations
///
/// See `infrastructure::coingecko::CoinGeckoClient`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Batched spot quotes for the given asset ids.
    ///
    /// Ids missing from the provider response are simply absent from the map.
    async fn fetch_quotes(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, TokenQuote>, UpstreamError>;

    /// Market-wide totals.
    async fn fetch_market_overview(&self) -> Result<MarketOverview, UpstreamError>;

    /// Historical prices for one asset over the window, ascending.
    async fn fetch_price_history(
        &self,
        id: &str,
        window: &TimeWindow,
    ) -> Result<Vec<PricePoint>, UpstreamError>;
}

/// Transaction / gas / active-address analytics provider.
///
/// # Implementations
///
/// See `infrastructure::analytics::AnalyticsClient`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalyticsSource: Send + Sync {
    /// One dataset over the window. Points may arrive unordered.
    async fn fetch_series(
        &self,
        kind: DatasetKind,
        window: &TimeWindow,
    ) -> Result<Vec<SeriesPoint>, UpstreamError>;
}

/// News provider. Not time-windowed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_news(&self) -> Result<Vec<NewsArticle>, UpstreamError>;
}

/// Repository trait for caching operations.
///
/// Used to archive the last published snapshot so a restarted process can
/// serve stale-but-real data before its first refresh completes.
///
/// # Implementations
///
/// See `infrastructure::redis::RedisRepository`.
#[async_trait]
pub trait CacheRepository: Send + Sync {
    /// Retrieve a cached value by key.
    ///
    /// Returns `Ok(None)` on a miss or when caching is disabled; never errors
    /// on a miss.
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Store a value with a TTL in seconds.
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> anyhow::Result<()>;

    /// Whether a backing store is configured and reachable.
    async fn is_healthy(&self) -> bool;
}
