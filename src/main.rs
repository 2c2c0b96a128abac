//! ChainPulse Metrics Gateway
//!
//! Aggregates token quotes, network analytics, news and price history for a
//! blockchain dashboard into one immutable snapshot, refreshed on a timer.
//! Every dataset that cannot be fetched is served as stale or estimated data
//! and flagged in the snapshot, so the dashboard always renders.
//!
//! # Architecture
//!
//! - **Domain**: snapshot model, time windows, provenance and source traits
//! - **Application**: retry policy, fallback generator, history cache,
//!   aggregator and refresh scheduler
//! - **Infrastructure**: upstream HTTP clients, rate limiter, Redis archive
//! - **API**: HTTP handlers, routing, OpenAPI docs and middleware
//!
//! # Configuration
//!
//! The gateway reads `config.yaml` (or `CONFIG_PATH`) and environment variables:
//! - `PRICE_API_KEY`: price provider key (optional)
//! - `NEWS_API_KEY`: news provider key (optional)
//! - `ANALYTICS_BASE_URL`: analytics endpoint override
//! - `REDIS_URL`: snapshot archive (optional, disabled when unset)
//! - `PORT`: listen port override
//! - `RUST_LOG` / `LOG_FORMAT`: logging level and `json` output
//!
//! # Quick Start
//!
//! ```bash
//! cargo run --release
//!
//! curl http://localhost:3010/health
//! curl http://localhost:3010/v1/snapshot
//! curl -X POST http://localhost:3010/v1/range -H 'content-type: application/json' -d '{"range":"30d"}'
//! ```

use anyhow::Context;
use chainpulse_gateway::api::routes::create_router;
use chainpulse_gateway::api::state::AppState;
use chainpulse_gateway::application::{
    Aggregator, RefreshScheduler, RetryPolicy, UpstreamClientSet,
};
use chainpulse_gateway::config::AppConfig;
use chainpulse_gateway::domain::{CacheRepository, RangeToken};
use chainpulse_gateway::infrastructure::{
    AnalyticsClient, CoinGeckoClient, NewsClient, RateLimiter, RedisRepository,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = EnvFilter::new(env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));

    if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    // Load Config
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    let mut config = AppConfig::load_or_default(&config_path)?;
    config.apply_env();
    let redis_url = env::var("REDIS_URL").ok();

    if config.upstreams.price.api_key.is_none() {
        tracing::warn!(
            "PRICE_API_KEY not set - using the public price tier ({} req/min budget)",
            config.upstreams.price.requests_per_minute
        );
    }

    // Infrastructure
    let price_limiter = RateLimiter::new(config.upstreams.price.requests_per_minute);
    tracing::info!(
        "Price rate limiter initialized: {} requests/minute",
        config.upstreams.price.requests_per_minute
    );
    let market = CoinGeckoClient::new(&config.upstreams.price, price_limiter.clone())?;
    let analytics = AnalyticsClient::new(&config.upstreams.analytics)?;
    let news = NewsClient::new(&config.upstreams.news)?;
    let archive = Arc::new(RedisRepository::new(redis_url));

    // Application
    let retry = RetryPolicy::from_config(&config.retry);
    tracing::info!(
        "Price lookups retry up to {} times ({:?} worst-case backoff)",
        retry.max_retries,
        retry.total_backoff()
    );
    let upstreams = UpstreamClientSet::new(
        Arc::new(market),
        Arc::new(analytics),
        Arc::new(news),
        retry,
    );
    let mut aggregator = Aggregator::new(upstreams, config.assets.clone(), config.history.capacity);
    if archive.is_enabled() {
        aggregator = aggregator.with_archive(archive.clone() as Arc<dyn CacheRepository>);
    }
    let aggregator = Arc::new(aggregator);
    aggregator.warm_start().await;
    tracing::info!("Tracking {} assets", aggregator.assets().len());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (scheduler, scheduler_task) = RefreshScheduler::spawn(
        aggregator.clone(),
        Duration::from_secs(config.refresh.interval_secs),
        RangeToken::parse_or_default(&config.refresh.default_range),
        shutdown_rx,
    );

    let state = AppState {
        aggregator,
        scheduler,
        price_limiter,
        archive,
        metrics: Some(metrics_handle),
    };

    let app = create_router(state, &config.server.allowed_origins);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to address {}", addr))?;
    tracing::info!("ChainPulse gateway running at http://{}", addr);

    // Graceful shutdown handling
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error during operation")?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_task.await {
        tracing::warn!("Refresh scheduler exited abnormally: {}", e);
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C) to initiate graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
