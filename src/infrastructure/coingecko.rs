//! CoinGecko-compatible price and market-data client.
//!
//! Endpoints used:
//! - `GET /simple/price` batched spot quotes
//! - `GET /global` market-wide totals
//! - `GET /coins/{id}/market_chart` price history

use crate::config::UpstreamConfig;
use crate::domain::{
    MarketDataSource, MarketOverview, PricePoint, TimeWindow, TokenQuote, UpstreamError,
};
use crate::infrastructure::http::UpstreamHttp;
use crate::infrastructure::rate_limiter::RateLimiter;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

const API_KEY_HEADER: &str = "x-cg-demo-api-key";

#[derive(Debug, Deserialize)]
struct SimplePrice {
    usd: Option<f64>,
    usd_24h_change: Option<f64>,
    usd_market_cap: Option<f64>,
    usd_24h_vol: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GlobalResponse {
    data: GlobalData,
}

#[derive(Debug, Deserialize)]
struct GlobalData {
    #[serde(default)]
    total_market_cap: HashMap<String, f64>,
    #[serde(default)]
    total_volume: HashMap<String, f64>,
    #[serde(default)]
    market_cap_change_percentage_24h_usd: f64,
    #[serde(default)]
    market_cap_percentage: HashMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    #[serde(default)]
    prices: Vec<(f64, f64)>,
}

#[derive(Clone)]
pub struct CoinGeckoClient {
    http: UpstreamHttp,
    api_key: Option<String>,
}

impl CoinGeckoClient {
    pub fn new(config: &UpstreamConfig, limiter: RateLimiter) -> anyhow::Result<Self> {
        let http = UpstreamHttp::new("price", config)?.with_limiter(limiter);
        if config.api_key.is_some() {
            info!("CoinGecko API key configured");
        }
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            if let Ok(value) = HeaderValue::from_str(key) {
                headers.insert(API_KEY_HEADER, value);
            }
        }
        headers
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoClient {
    async fn fetch_quotes(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, TokenQuote>, UpstreamError> {
        let query = [
            ("ids", ids.join(",")),
            ("vs_currencies", "usd".to_string()),
            ("include_24hr_change", "true".to_string()),
            ("include_market_cap", "true".to_string()),
            ("include_24hr_vol", "true".to_string()),
        ];
        let raw: HashMap<String, SimplePrice> = self
            .http
            .get_json("/simple/price", &query, self.headers())
            .await?;
        Ok(parse_quotes(raw))
    }

    async fn fetch_market_overview(&self) -> Result<MarketOverview, UpstreamError> {
        let raw: GlobalResponse = self.http.get_json("/global", &[], self.headers()).await?;
        parse_global(raw.data)
    }

    async fn fetch_price_history(
        &self,
        id: &str,
        window: &TimeWindow,
    ) -> Result<Vec<PricePoint>, UpstreamError> {
        let query = [
            ("vs_currency", "usd".to_string()),
            ("days", window.range.days().to_string()),
        ];
        let path = format!("/coins/{}/market_chart", id);
        let raw: MarketChart = self.http.get_json(&path, &query, self.headers()).await?;
        let points = downsample(&raw.prices, window.interval_secs);
        debug!(id, raw = raw.prices.len(), kept = points.len(), "Parsed market chart");
        Ok(points)
    }
}

fn parse_quotes(raw: HashMap<String, SimplePrice>) -> HashMap<String, TokenQuote> {
    raw.into_iter()
        .filter_map(|(id, p)| {
            // an entry without a price is treated as missing
            let price = p.usd?;
            Some((
                id.clone(),
                TokenQuote {
                    id,
                    price,
                    change_24h_pct: p.usd_24h_change.unwrap_or(0.0),
                    market_cap_usd: p.usd_market_cap.unwrap_or(0.0),
                    volume_24h_usd: p.usd_24h_vol.unwrap_or(0.0),
                },
            ))
        })
        .collect()
}

fn parse_global(data: GlobalData) -> Result<MarketOverview, UpstreamError> {
    let total_market_cap_usd = data
        .total_market_cap
        .get("usd")
        .copied()
        .ok_or_else(|| UpstreamError::MalformedResponse("missing total_market_cap.usd".into()))?;

    Ok(MarketOverview {
        total_market_cap_usd,
        total_volume_usd: data.total_volume.get("usd").copied().unwrap_or(0.0),
        market_cap_change_24h_pct: data.market_cap_change_percentage_24h_usd,
        btc_dominance_pct: data.market_cap_percentage.get("btc").copied().unwrap_or(0.0),
    })
}

/// Keep the last sample in each `interval_secs` bucket, ascending.
fn downsample(prices: &[(f64, f64)], interval_secs: i64) -> Vec<PricePoint> {
    let interval = interval_secs.max(1);
    let mut buckets: BTreeMap<i64, PricePoint> = BTreeMap::new();
    for &(ms, price) in prices {
        if !price.is_finite() || price < 0.0 {
            continue;
        }
        let timestamp = (ms / 1000.0) as i64;
        let bucket = timestamp.div_euclid(interval);
        let keep = buckets
            .get(&bucket)
            .is_none_or(|existing| existing.timestamp <= timestamp);
        if keep {
            buckets.insert(bucket, PricePoint { timestamp, price });
        }
    }
    buckets.into_values().collect()
}
