//! Aggregated dashboard data: quotes, series, news and the published snapshot.

use crate::domain::{FailureKind, TimeWindow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use utoipa::ToSchema;

// ============================================================================
// Series
// ============================================================================

/// One chart point: a timestamp and one or more named metric values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Unix timestamp (seconds)
    pub timestamp: i64,
    pub values: BTreeMap<String, f64>,
}

impl SeriesPoint {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, metric: &str, value: f64) -> Self {
        self.values.insert(metric.to_string(), value);
        self
    }

    pub fn value(&self, metric: &str) -> Option<f64> {
        self.values.get(metric).copied()
    }
}

/// Analytics datasets rendered as charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DatasetKind {
    TransactionVolume,
    GasFees,
    ActiveAddresses,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 3] = [
        DatasetKind::TransactionVolume,
        DatasetKind::GasFees,
        DatasetKind::ActiveAddresses,
    ];

    /// Key of this dataset in `Snapshot::series`.
    pub fn key(&self) -> &'static str {
        match self {
            DatasetKind::TransactionVolume => "transactionVolume",
            DatasetKind::GasFees => "gasFees",
            DatasetKind::ActiveAddresses => "activeAddresses",
        }
    }

    /// Metric names carried by each point; the first one is required.
    pub fn metrics(&self) -> &'static [&'static str] {
        match self {
            DatasetKind::TransactionVolume => &["transactions"],
            DatasetKind::GasFees => &["averageGas", "maxGas"],
            DatasetKind::ActiveAddresses => &["activeAddresses"],
        }
    }

    pub fn primary_metric(&self) -> &'static str {
        self.metrics()[0]
    }

    /// Endpoint path on the analytics provider.
    pub fn analytics_path(&self) -> &'static str {
        match self {
            DatasetKind::TransactionVolume => "/transactions",
            DatasetKind::GasFees => "/gas",
            DatasetKind::ActiveAddresses => "/addresses",
        }
    }
}

/// Outcome of fetching one dataset.
///
/// Fallback is all-or-nothing: a series is either entirely real or entirely
/// synthetic, never a mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "camelCase")]
pub enum DatasetResult<T> {
    Real(T),
    Synthetic(T),
    Unavailable,
}

impl<T> DatasetResult<T> {
    pub fn is_real(&self) -> bool {
        matches!(self, DatasetResult::Real(_))
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, DatasetResult::Synthetic(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, DatasetResult::Unavailable)
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            DatasetResult::Real(data) | DatasetResult::Synthetic(data) => Some(data),
            DatasetResult::Unavailable => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            DatasetResult::Real(_) => "real",
            DatasetResult::Synthetic(_) => "synthetic",
            DatasetResult::Unavailable => "unavailable",
        }
    }
}

// ============================================================================
// Quotes & market
// ============================================================================

/// Spot quote for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenQuote {
    pub id: String,
    pub price: f64,
    pub change_24h_pct: f64,
    pub market_cap_usd: f64,
    pub volume_24h_usd: f64,
}

/// Market-wide figures from the price provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOverview {
    pub total_market_cap_usd: f64,
    pub total_volume_usd: f64,
    pub market_cap_change_24h_pct: f64,
    pub btc_dominance_pct: f64,
}

/// Where a served value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum Provenance {
    /// Fetched in this cycle.
    Real,
    /// Fetched in an earlier cycle and retained.
    Stale,
    /// Generated; no real value has been seen yet.
    Synthetic,
}

/// A value tagged with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sourced<T> {
    #[serde(flatten)]
    pub value: T,
    pub provenance: Provenance,
}

impl<T> Sourced<T> {
    pub fn real(value: T) -> Self {
        Self {
            value,
            provenance: Provenance::Real,
        }
    }

    pub fn stale(value: T) -> Self {
        Self {
            value,
            provenance: Provenance::Stale,
        }
    }

    pub fn synthetic(value: T) -> Self {
        Self {
            value,
            provenance: Provenance::Synthetic,
        }
    }
}

// ============================================================================
// Price history & news
// ============================================================================

/// One price observation used by sparklines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PricePoint {
    /// Unix timestamp (seconds)
    pub timestamp: i64,
    pub price: f64,
}

/// Read-only copy of a token's rolling history buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sparkline {
    pub provenance: Provenance,
    pub points: Vec<PricePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsArticle {
    pub id: String,
    pub title: String,
    pub body: String,
    pub source: String,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
}

// ============================================================================
// Snapshot
// ============================================================================

/// What a degraded dataset was served as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServedAs {
    Stale,
    Synthetic,
    Missing,
}

/// A dataset that was not served from a fresh upstream response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DegradedNotice {
    pub dataset: String,
    pub failure: FailureKind,
    pub served_as: ServedAs,
    pub message: String,
}

impl DegradedNotice {
    pub fn new(dataset: impl Into<String>, failure: FailureKind, served_as: ServedAs) -> Self {
        Self {
            dataset: dataset.into(),
            failure,
            served_as,
            message: failure.user_message().to_string(),
        }
    }
}

/// One immutable, fully populated aggregation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Refresh cycle that produced this snapshot. `0` marks a snapshot
    /// restored from the archive at startup.
    pub sequence: u64,
    pub time_window: TimeWindow,
    pub token_quotes: BTreeMap<String, Sourced<TokenQuote>>,
    pub market: Sourced<MarketOverview>,
    pub series: BTreeMap<String, DatasetResult<Vec<SeriesPoint>>>,
    /// `Real` also when the list was retained from an earlier cycle; the
    /// retention is reported as a `Stale` entry in `degraded`.
    pub news: DatasetResult<Vec<NewsArticle>>,
    pub history: BTreeMap<String, Sparkline>,
    pub degraded: Vec<DegradedNotice>,
    pub generated_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn series_for(&self, kind: DatasetKind) -> Option<&DatasetResult<Vec<SeriesPoint>>> {
        self.series.get(kind.key())
    }

    pub fn news_count(&self) -> usize {
        self.news.data().map(Vec::len).unwrap_or(0)
    }

    /// Axis labels for one series, formatted for the snapshot's window.
    pub fn labels_for(&self, key: &str) -> Vec<String> {
        self.series
            .get(key)
            .and_then(DatasetResult::data)
            .map(|points| {
                points
                    .iter()
                    .map(|p| self.time_window.format_label(p.timestamp))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Compact plain-text digest handed to the chat assistant as context.
    pub fn context_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Dashboard snapshot #{} ({} window, generated {})",
            self.sequence,
            self.time_window.range,
            self.generated_at.to_rfc3339()
        );

        for (id, quote) in &self.token_quotes {
            let q = &quote.value;
            let _ = writeln!(
                out,
                "- {}: ${:.4} ({:+.2}% 24h), market cap {}, volume {} [{}]",
                id,
                q.price,
                q.change_24h_pct,
                format_usd_compact(q.market_cap_usd),
                format_usd_compact(q.volume_24h_usd),
                provenance_label(quote.provenance)
            );
        }

        let m = &self.market.value;
        let _ = writeln!(
            out,
            "- Market: total cap {} ({:+.2}% 24h), volume {}, BTC dominance {:.1}% [{}]",
            format_usd_compact(m.total_market_cap_usd),
            m.market_cap_change_24h_pct,
            format_usd_compact(m.total_volume_usd),
            m.btc_dominance_pct,
            provenance_label(self.market.provenance)
        );

        for kind in DatasetKind::ALL {
            if let Some(result) = self.series.get(kind.key()) {
                let latest = result
                    .data()
                    .and_then(|points| points.last())
                    .and_then(|p| p.value(kind.primary_metric()));
                match latest {
                    Some(v) => {
                        let _ = writeln!(
                            out,
                            "- {}: latest {} = {:.4} [{}]",
                            kind.key(),
                            kind.primary_metric(),
                            v,
                            result.status()
                        );
                    }
                    None => {
                        let _ = writeln!(out, "- {}: unavailable", kind.key());
                    }
                }
            }
        }

        if let Some(articles) = self.news.data() {
            let headlines: Vec<&str> = articles.iter().take(5).map(|a| a.title.as_str()).collect();
            if !headlines.is_empty() {
                let _ = writeln!(out, "- Headlines: {}", headlines.join(" | "));
            }
        }

        out
    }
}

fn provenance_label(p: Provenance) -> &'static str {
    match p {
        Provenance::Real => "real",
        Provenance::Stale => "stale",
        Provenance::Synthetic => "estimated",
    }
}

/// `$9.20B`, `$342.00M`, `$12.50K`, `$3.10`
pub fn format_usd_compact(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1e12 {
        format!("${:.2}T", value / 1e12)
    } else if abs >= 1e9 {
        format!("${:.2}B", value / 1e9)
    } else if abs >= 1e6 {
        format!("${:.2}M", value / 1e6)
    } else if abs >= 1e3 {
        format!("${:.2}K", value / 1e3)
    } else {
        format!("${:.2}", value)
    }
}
