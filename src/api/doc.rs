use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        // System Handlers
        crate::api::handlers::health_handler,
        crate::api::handlers::metrics_handler,
        crate::api::handlers::rate_limit_handler,
        // Dashboard Handlers
        crate::api::snapshot_handlers::snapshot_handler,
        crate::api::snapshot_handlers::refresh_handler,
        crate::api::snapshot_handlers::range_handler,
        crate::api::snapshot_handlers::context_handler,
        crate::api::snapshot_handlers::history_handler
    ),
    components(
        schemas(
            crate::api::handlers::HealthResponse,
            crate::api::handlers::SnapshotHealth,
            crate::api::handlers::HealthDependencies,
            crate::api::handlers::RateLimitResponse,
            crate::api::handlers::RateLimitResources,
            crate::infrastructure::RateLimitStats,
            crate::api::snapshot_handlers::ErrorResponse,
            crate::api::snapshot_handlers::RefreshAccepted,
            crate::api::snapshot_handlers::RangeRequest,
            crate::api::snapshot_handlers::ContextResponse,
            crate::api::snapshot_handlers::HistoryResponse,
            crate::domain::Provenance,
            crate::domain::PricePoint
        )
    ),
    tags(
        (name = "system", description = "System endpoints for health checks and metrics"),
        (name = "dashboard", description = "Aggregated blockchain dashboard data")
    ),
    info(
        title = "ChainPulse Metrics Gateway",
        version = "0.1.0",
        description = "Resilient aggregation layer for a blockchain metrics dashboard: token quotes, network analytics, news and price history, served as one snapshot with real, stale or estimated provenance."
    )
)]
pub struct ApiDoc;
