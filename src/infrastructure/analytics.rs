//! Network analytics client (transactions, gas, active addresses).
//!
//! Each dataset is its own endpoint taking `?range=<token>`. Responses are
//! either a bare array or `{ "data": [...] }` of rows shaped like
//! `{ "timestamp": 1700000000, "transactions": 312000 }`.

use crate::config::UpstreamConfig;
use crate::domain::{AnalyticsSource, DatasetKind, SeriesPoint, TimeWindow, UpstreamError};
use crate::infrastructure::http::UpstreamHttp;
use crate::infrastructure::rate_limiter::RateLimiter;
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Timestamps above this are milliseconds.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeriesPayload {
    Rows(Vec<Map<String, Value>>),
    Wrapped { data: Vec<Map<String, Value>> },
}

impl SeriesPayload {
    fn into_rows(self) -> Vec<Map<String, Value>> {
        match self {
            SeriesPayload::Rows(rows) | SeriesPayload::Wrapped { data: rows } => rows,
        }
    }
}

#[derive(Clone)]
pub struct AnalyticsClient {
    http: UpstreamHttp,
    api_key: Option<String>,
}

impl AnalyticsClient {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: UpstreamHttp::new("analytics", config)?
                .with_limiter(RateLimiter::new(config.requests_per_minute)),
            api_key: config.api_key.clone(),
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            if let Ok(value) = HeaderValue::from_str(key) {
                headers.insert("x-api-key", value);
            }
        }
        headers
    }
}

#[async_trait]
impl AnalyticsSource for AnalyticsClient {
    async fn fetch_series(
        &self,
        kind: DatasetKind,
        window: &TimeWindow,
    ) -> Result<Vec<SeriesPoint>, UpstreamError> {
        let query = [("range", window.range.as_str().to_string())];
        let payload: SeriesPayload = self
            .http
            .get_json(kind.analytics_path(), &query, self.headers())
            .await?;
        parse_series(kind, payload.into_rows())
    }
}

/// Rows missing a timestamp or the primary metric are dropped. If every row
/// was dropped the payload is malformed rather than empty.
fn parse_series(
    kind: DatasetKind,
    rows: Vec<Map<String, Value>>,
) -> Result<Vec<SeriesPoint>, UpstreamError> {
    let total = rows.len();
    let points: Vec<SeriesPoint> = rows.iter().filter_map(|row| parse_row(kind, row)).collect();

    if total > 0 && points.is_empty() {
        return Err(UpstreamError::MalformedResponse(format!(
            "no usable {} rows in {} received",
            kind.primary_metric(),
            total
        )));
    }
    if points.len() < total {
        debug!(
            dataset = kind.key(),
            dropped = total - points.len(),
            "Dropped unusable analytics rows"
        );
    }
    Ok(points)
}

fn parse_row(kind: DatasetKind, row: &Map<String, Value>) -> Option<SeriesPoint> {
    let timestamp = row.get("timestamp").and_then(parse_timestamp)?;
    let mut point = SeriesPoint::new(timestamp);
    for metric in kind.metrics() {
        match row.get(*metric).and_then(parse_number) {
            Some(v) if v.is_finite() && v >= 0.0 => point = point.with(metric, v),
            _ if *metric == kind.primary_metric() => return None,
            _ => {}
        }
    }
    Some(point)
}

fn parse_timestamp(value: &Value) -> Option<i64> {
    let raw = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => match s.parse::<i64>() {
            Ok(n) => n,
            Err(_) => DateTime::parse_from_rfc3339(s).ok()?.timestamp(),
        },
        _ => return None,
    };
    Some(if raw > MILLIS_THRESHOLD { raw / 1000 } else { raw })
}

fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
