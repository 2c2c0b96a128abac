pub mod analytics;
pub mod coingecko;
pub mod http;
pub mod news;
pub mod rate_limiter;
pub mod redis;

pub use analytics::AnalyticsClient;
pub use coingecko::CoinGeckoClient;
pub use http::UpstreamHttp;
pub use news::NewsClient;
pub use rate_limiter::{RateLimitStats, RateLimiter};
pub use redis::RedisRepository;
