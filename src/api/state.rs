use crate::application::{Aggregator, SchedulerHandle};
use crate::infrastructure::{RateLimiter, RedisRepository};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub scheduler: SchedulerHandle,
    pub price_limiter: RateLimiter,
    pub archive: Arc<RedisRepository>,
    /// `None` when no Prometheus recorder was installed (tests).
    pub metrics: Option<PrometheusHandle>,
}
