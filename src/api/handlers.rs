use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use crate::api::state::AppState;
use crate::domain::CacheRepository;
use crate::infrastructure::RateLimitStats;
use utoipa::ToSchema;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `ok`, `degraded` (some datasets estimated) or `starting`
    pub status: String,
    pub version: String,
    pub snapshot: Option<SnapshotHealth>,
    pub dependencies: HealthDependencies,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotHealth {
    pub sequence: u64,
    pub range: String,
    pub age_secs: i64,
    pub degraded_datasets: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct HealthDependencies {
    pub redis: String,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "A snapshot is being served", body = HealthResponse),
        (status = 503, description = "No snapshot published yet", body = HealthResponse)
    )
)]
#[instrument(skip(state))]
pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let redis_status = if !state.archive.is_enabled() {
        "disabled"
    } else if state.archive.is_healthy().await {
        "healthy"
    } else {
        "unavailable"
    };

    let snapshot = state.aggregator.latest().map(|s| SnapshotHealth {
        sequence: s.sequence,
        range: s.time_window.range.to_string(),
        age_secs: (Utc::now() - s.generated_at).num_seconds().max(0),
        degraded_datasets: s.degraded.iter().map(|d| d.dataset.clone()).collect(),
    });

    let status = match &snapshot {
        None => "starting",
        Some(s) if s.degraded_datasets.is_empty() => "ok",
        Some(_) => "degraded",
    };

    let response = HealthResponse {
        status: status.to_string(),
        version: VERSION.to_string(),
        snapshot,
        dependencies: HealthDependencies {
            redis: redis_status.to_string(),
        },
    };

    if status == "starting" {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    } else {
        Ok(Json(response))
    }
}

#[utoipa::path(
    get,
    path = "/metrics",
    tag = "system",
    responses(
        (status = 200, description = "Prometheus metrics", content_type = "text/plain")
    )
)]
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

#[derive(Serialize, ToSchema)]
pub struct RateLimitResponse {
    pub resources: RateLimitResources,
}

#[derive(Serialize, ToSchema)]
pub struct RateLimitResources {
    /// Outbound budget for the price provider
    pub price: RateLimitStats,
}

/// Get outbound rate limit status.
///
/// Returns how much of the price provider's per-minute budget is in use.
#[utoipa::path(
    get,
    path = "/rate-limit",
    tag = "system",
    responses(
        (status = 200, description = "Rate limit status", body = RateLimitResponse)
    )
)]
#[instrument(skip(state))]
pub async fn rate_limit_handler(State(state): State<AppState>) -> Json<RateLimitResponse> {
    let price = state.price_limiter.stats().await;
    Json(RateLimitResponse {
        resources: RateLimitResources { price },
    })
}
