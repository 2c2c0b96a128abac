//! Local stand-ins for the price, analytics and news providers.
//!
//! One axum server hosts all three under `/price`, `/analytics` and `/news`.
//! Switches on [`FakeState`] make individual datasets fail or stall.

#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chainpulse_gateway::application::{Aggregator, RetryPolicy, UpstreamClientSet};
use chainpulse_gateway::config::{AssetConfig, UpstreamConfig};
use chainpulse_gateway::infrastructure::{
    AnalyticsClient, CoinGeckoClient, NewsClient, RateLimiter,
};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Address nothing listens on.
pub const DEAD_URL: &str = "http://127.0.0.1:1";

/// Longer than any client timeout used in the tests.
const STALL: Duration = Duration::from_secs(3);

#[derive(Default)]
pub struct FakeState {
    pub price_calls: AtomicUsize,
    pub price_down: AtomicBool,
    /// Quote and market endpoints answer 429.
    pub price_throttled: AtomicBool,
    /// Market-chart endpoint fails while quotes keep working.
    pub chart_down: AtomicBool,
    pub news_down: AtomicBool,
    /// Analytics endpoints ("transactions", "gas", "addresses") that stall.
    pub slow_analytics: Mutex<HashSet<String>>,
}

impl FakeState {
    pub fn stall(&self, dataset: &str) {
        self.slow_analytics
            .lock()
            .unwrap()
            .insert(dataset.to_string());
    }

    pub fn set_price_down(&self, down: bool) {
        self.price_down.store(down, Ordering::SeqCst);
    }

    pub fn set_price_throttled(&self, throttled: bool) {
        self.price_throttled.store(throttled, Ordering::SeqCst);
    }

    pub fn set_chart_down(&self, down: bool) {
        self.chart_down.store(down, Ordering::SeqCst);
    }

    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }
}

pub struct FakeUpstreams {
    pub addr: SocketAddr,
    pub state: Arc<FakeState>,
}

impl FakeUpstreams {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState::default());
        let app = Router::new()
            .route("/price/simple/price", get(simple_price))
            .route("/price/global", get(global))
            .route("/price/coins/{id}/market_chart", get(market_chart))
            .route("/analytics/{dataset}", get(analytics))
            .route("/news/news/", get(news))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self, prefix: &str) -> String {
        format!("http://{}/{}", self.addr, prefix)
    }

    pub fn price_url(&self) -> String {
        self.url("price")
    }

    pub fn analytics_url(&self) -> String {
        self.url("analytics")
    }

    pub fn news_url(&self) -> String {
        self.url("news")
    }
}

async fn simple_price(State(state): State<Arc<FakeState>>) -> Response {
    state.price_calls.fetch_add(1, Ordering::SeqCst);
    if state.price_throttled.load(Ordering::SeqCst) {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }
    if state.price_down.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    // "joe" is tracked but deliberately absent
    Json(json!({
        "avalanche-2": {
            "usd": 28.45,
            "usd_24h_change": 3.2,
            "usd_market_cap": 9_200_000_000.0,
            "usd_24h_vol": 342_000_000.0
        }
    }))
    .into_response()
}

async fn global(State(state): State<Arc<FakeState>>) -> Response {
    if state.price_throttled.load(Ordering::SeqCst) {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }
    if state.price_down.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!({
        "data": {
            "total_market_cap": {"usd": 2_400_000_000_000.0},
            "total_volume": {"usd": 95_000_000_000.0},
            "market_cap_change_percentage_24h_usd": 1.4,
            "market_cap_percentage": {"btc": 52.3}
        }
    }))
    .into_response()
}

async fn market_chart(State(state): State<Arc<FakeState>>, Path(id): Path<String>) -> Response {
    if state.price_down.load(Ordering::SeqCst)
        || state.chart_down.load(Ordering::SeqCst)
        || id != "avalanche-2"
    {
        return StatusCode::NOT_FOUND.into_response();
    }
    let now_ms = chrono::Utc::now().timestamp_millis();
    let prices: Vec<Value> = (0..7)
        .rev()
        .map(|day| json!([(now_ms - day * 86_400_000 - 3_600_000) as f64, 27.0 + day as f64 * 0.1]))
        .collect();
    Json(json!({ "prices": prices })).into_response()
}

async fn analytics(State(state): State<Arc<FakeState>>, Path(dataset): Path<String>) -> Response {
    let slow = state.slow_analytics.lock().unwrap().contains(&dataset);
    if slow {
        tokio::time::sleep(STALL).await;
    }
    let metric = match dataset.as_str() {
        "transactions" => "transactions",
        "gas" => "averageGas",
        "addresses" => "activeAddresses",
        _ => return StatusCode::NOT_FOUND.into_response(),
    };
    let now = chrono::Utc::now().timestamp();
    let rows: Vec<Value> = (0..7)
        .map(|day| {
            let mut row = Map::new();
            row.insert("timestamp".to_string(), json!(now - day * 86_400));
            row.insert(metric.to_string(), json!(1000 + day * 10));
            Value::Object(row)
        })
        .collect();
    Json(json!({ "data": rows })).into_response()
}

async fn news(State(state): State<Arc<FakeState>>) -> Response {
    if state.news_down.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let now = chrono::Utc::now().timestamp();
    let articles: Vec<Value> = (0..3)
        .map(|i| {
            json!({
                "id": format!("{}", 500 + i),
                "title": format!("Subnet update {}", i),
                "body": "Validators upgraded.",
                "source": "coindesk",
                "published_on": now - i * 600,
                "url": format!("https://news.example/{}", i),
                "tags": "AVAX|Subnets",
                "categories": "AVAX"
            })
        })
        .collect();
    Json(json!({ "Type": 100, "Data": articles })).into_response()
}

pub fn upstream(base_url: String) -> UpstreamConfig {
    UpstreamConfig {
        base_url,
        timeout_secs: 1,
        requests_per_minute: 1000,
        api_key: None,
    }
}

pub fn fast_retry(max_retries: usize) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
    }
}

pub fn tracked_assets() -> Vec<AssetConfig> {
    vec![
        AssetConfig {
            id: "avalanche-2".to_string(),
            symbol: "AVAX".to_string(),
            reference_price: 28.0,
            reference_market_cap_usd: 9_000_000_000.0,
            reference_volume_usd: 350_000_000.0,
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

/// Aggregator wired to real clients pointing at the given base URLs.
pub fn aggregator(price: String, analytics: String, news: String, retry: RetryPolicy) -> Aggregator {
    let market = CoinGeckoClient::new(&upstream(price), RateLimiter::new(1000)).unwrap();
    let analytics = AnalyticsClient::new(&upstream(analytics)).unwrap();
    let news = NewsClient::new(&upstream(news)).unwrap();
    let upstreams = UpstreamClientSet::new(
        Arc::new(market),
        Arc::new(analytics),
        Arc::new(news),
        retry,
    );
    Aggregator::new(upstreams, tracked_assets(), 7)
}

pub fn fake_aggregator(fake: &FakeUpstreams, retry: RetryPolicy) -> Aggregator {
    aggregator(fake.price_url(), fake.analytics_url(), fake.news_url(), retry)
}

pub fn dead_aggregator() -> Aggregator {
    aggregator(
        DEAD_URL.to_string(),
        DEAD_URL.to_string(),
        DEAD_URL.to_string(),
        fast_retry(1),
    )
}
