//! Integration tests for REST API endpoints
//!
//! Each test starts the full router on an ephemeral port, backed by a real
//! aggregator and scheduler talking to local fake upstreams.
//! Run with: `cargo test --test rest_api_test`

mod common;

use chainpulse_gateway::api::routes::create_router;
use chainpulse_gateway::api::state::AppState;
use chainpulse_gateway::application::{
    Aggregator, RefreshScheduler, UpstreamClientSet,
};
use chainpulse_gateway::domain::RangeToken;
use chainpulse_gateway::infrastructure::{
    AnalyticsClient, CoinGeckoClient, NewsClient, RateLimiter, RedisRepository,
};
use common::{fast_retry, tracked_assets, upstream, FakeUpstreams};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const WAIT: Duration = Duration::from_secs(10);

struct TestApp {
    base_url: String,
    client: reqwest::Client,
    aggregator: Arc<Aggregator>,
    fake: FakeUpstreams,
    _shutdown: watch::Sender<bool>,
}

impl TestApp {
    /// Start the gateway. With `stall_analytics` the first cycle takes at
    /// least one client timeout, leaving a window with nothing published.
    async fn spawn(stall_analytics: bool) -> Self {
        let fake = FakeUpstreams::start().await;
        if stall_analytics {
            fake.state.stall("transactions");
        }

        let price_limiter = RateLimiter::new(1000);
        let market = CoinGeckoClient::new(&upstream(fake.price_url()), price_limiter.clone()).unwrap();
        let analytics = AnalyticsClient::new(&upstream(fake.analytics_url())).unwrap();
        let news = NewsClient::new(&upstream(fake.news_url())).unwrap();
        let upstreams = UpstreamClientSet::new(
            Arc::new(market),
            Arc::new(analytics),
            Arc::new(news),
            fast_retry(1),
        );
        let aggregator = Arc::new(Aggregator::new(upstreams, tracked_assets(), 7));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (scheduler, _task) = RefreshScheduler::spawn(
            aggregator.clone(),
            Duration::from_secs(3600),
            RangeToken::Week,
            shutdown_rx,
        );

        let state = AppState {
            aggregator: aggregator.clone(),
            scheduler,
            price_limiter,
            archive: Arc::new(RedisRepository::new(None)),
            metrics: None,
        };
        let app = create_router(state, "*");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            client: reqwest::Client::new(),
            aggregator,
            fake,
            _shutdown: shutdown_tx,
        }
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap()
    }

    async fn post(&self, path: &str, body: Option<Value>) -> reqwest::Response {
        let request = self.client.post(format!("{}{}", self.base_url, path));
        let request = match body {
            Some(body) => request.json(&body),
            None => request,
        };
        request.send().await.unwrap()
    }

    /// Block until a snapshot with at least `sequence` is published.
    async fn wait_for_sequence(&self, sequence: u64) {
        let mut rx = self.aggregator.subscribe();
        tokio::time::timeout(
            WAIT,
            rx.wait_for(|s| s.as_ref().is_some_and(|s| s.sequence >= sequence)),
        )
        .await
        .expect("timed out waiting for snapshot")
        .unwrap();
    }
}

#[tokio::test]
async fn test_snapshot_unavailable_until_first_cycle() {
    let app = TestApp::spawn(true).await;

    let response = app.get("/v1/snapshot").await;
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().is_some());

    let health = app.get("/health").await;
    assert_eq!(health.status(), 503);
    let body: Value = health.json().await.unwrap();
    assert_eq!(body["status"], "starting");

    app.wait_for_sequence(1).await;

    let response = app.get("/v1/snapshot").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["sequence"], 1);
    assert_eq!(body["timeWindow"]["range"], "7d");
    assert_eq!(body["series"]["transactionVolume"]["status"], "synthetic");
    assert_eq!(body["series"]["activeAddresses"]["status"], "real");
    assert_eq!(body["tokenQuotes"]["avalanche-2"]["price"], 28.45);
    assert_eq!(body["tokenQuotes"]["avalanche-2"]["provenance"], "real");
    assert_eq!(body["labels"]["transactionVolume"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn test_health_reports_degraded_datasets() {
    let app = TestApp::spawn(false).await;
    app.wait_for_sequence(1).await;

    let response = app.get("/health").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    // "joe" is never quoted by the fake provider
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["dependencies"]["redis"], "disabled");
    let degraded = body["snapshot"]["degradedDatasets"].as_array().unwrap();
    assert!(degraded.contains(&json!("joe")));
    assert!(body.get("version").is_some());
}

#[tokio::test]
async fn test_refresh_publishes_next_sequence() {
    let app = TestApp::spawn(false).await;
    app.wait_for_sequence(1).await;

    let response = app.post("/v1/refresh", None).await;
    assert_eq!(response.status(), 202);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["range"], "7d");

    app.wait_for_sequence(2).await;
    assert!(app.fake.state.price_calls() >= 2);
}

#[tokio::test]
async fn test_range_change_resolves_new_window() {
    let app = TestApp::spawn(false).await;
    app.wait_for_sequence(1).await;

    let response = app.post("/v1/range", Some(json!({"range": "30d"}))).await;
    assert_eq!(response.status(), 202);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["range"], "30d");

    let mut rx = app.aggregator.subscribe();
    tokio::time::timeout(
        WAIT,
        rx.wait_for(|s| {
            s.as_ref()
                .is_some_and(|s| s.time_window.range == RangeToken::Month)
        }),
    )
    .await
    .expect("timed out waiting for 30d snapshot")
    .unwrap();

    let context: Value = app.get("/v1/context").await.json().await.unwrap();
    assert_eq!(context["range"], "30d");
}

#[tokio::test]
async fn test_range_rejects_unknown_token() {
    let app = TestApp::spawn(false).await;

    let response = app.post("/v1/range", Some(json!({"range": "2w"}))).await;
    assert_eq!(response.status(), 400);

    let response = app.post("/v1/range", Some(json!({"range": "fortnight"}))).await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_context_summarizes_snapshot() {
    let app = TestApp::spawn(false).await;
    app.wait_for_sequence(1).await;

    let response = app.get("/v1/context").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["range"], "7d");
    let summary = body["summary"].as_str().unwrap();
    assert!(!summary.is_empty());
    assert!(summary.contains("avalanche-2") || summary.contains("AVAX"));
}

#[tokio::test]
async fn test_history_endpoint() {
    let app = TestApp::spawn(false).await;
    app.wait_for_sequence(1).await;

    let response = app.get("/v1/history/avalanche-2").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["tokenId"], "avalanche-2");
    assert_eq!(body["provenance"], "real");
    let points = body["points"].as_array().unwrap();
    assert!(!points.is_empty() && points.len() <= 7);

    let response = app.get("/v1/history/dogecoin").await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_rate_limit_and_docs_endpoints() {
    let app = TestApp::spawn(false).await;
    app.wait_for_sequence(1).await;

    let body: Value = app.get("/rate-limit").await.json().await.unwrap();
    assert_eq!(body["resources"]["price"]["limit"], 1000);
    assert!(body["resources"]["price"]["used"].as_u64().unwrap() >= 1);

    let response = app.get("/api-docs/openapi.json").await;
    assert_eq!(response.status(), 200);
    let openapi: Value = response.json().await.unwrap();
    assert!(openapi["paths"]["/v1/snapshot"].is_object());
    assert!(openapi["paths"]["/v1/history/{token_id}"].is_object());

    // no recorder installed in tests
    assert_eq!(app.get("/metrics").await.status(), 503);
}

#[tokio::test]
async fn test_security_headers_are_set() {
    let app = TestApp::spawn(false).await;
    let response = app.get("/v1/snapshot").await;
    assert_eq!(
        response.headers()["x-content-type-options"],
        "nosniff"
    );
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert!(response.headers().contains_key("x-request-id"));
}
