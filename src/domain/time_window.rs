//! Range tokens and the concrete time windows they resolve to.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// User-selected time range for charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeToken {
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
    #[serde(rename = "1y")]
    Year,
}

impl RangeToken {
    pub const ALL: [RangeToken; 5] = [
        RangeToken::Day,
        RangeToken::Week,
        RangeToken::Month,
        RangeToken::Quarter,
        RangeToken::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RangeToken::Day => "24h",
            RangeToken::Week => "7d",
            RangeToken::Month => "30d",
            RangeToken::Quarter => "90d",
            RangeToken::Year => "1y",
        }
    }

    /// Number of chart points for this range.
    pub fn point_count(&self) -> usize {
        match self {
            RangeToken::Day => 24,
            RangeToken::Week => 7,
            RangeToken::Month => 30,
            RangeToken::Quarter => 90,
            RangeToken::Year => 365,
        }
    }

    /// Spacing between two consecutive points.
    pub fn interval(&self) -> Duration {
        match self {
            RangeToken::Day => Duration::hours(1),
            _ => Duration::days(1),
        }
    }

    pub fn label_granularity(&self) -> LabelGranularity {
        match self {
            RangeToken::Day => LabelGranularity::HourOfDay,
            _ => LabelGranularity::CalendarDate,
        }
    }

    /// `days` parameter understood by the price provider's chart endpoint.
    pub fn days(&self) -> u32 {
        match self {
            RangeToken::Day => 1,
            RangeToken::Week => 7,
            RangeToken::Month => 30,
            RangeToken::Quarter => 90,
            RangeToken::Year => 365,
        }
    }

    /// Parse a token, falling back to `7d` for anything unrecognized.
    pub fn parse_or_default(token: &str) -> Self {
        token.parse().unwrap_or_else(|_| {
            warn!("Unrecognized range token '{}', defaulting to 7d", token);
            RangeToken::default()
        })
    }
}

impl Default for RangeToken {
    fn default() -> Self {
        RangeToken::Week
    }
}

impl fmt::Display for RangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of the supported range tokens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown range token '{0}', expected one of 24h, 7d, 30d, 90d, 1y")]
pub struct UnknownRange(pub String);

impl FromStr for RangeToken {
    type Err = UnknownRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "24h" => Ok(RangeToken::Day),
            "7d" => Ok(RangeToken::Week),
            "30d" => Ok(RangeToken::Month),
            "90d" => Ok(RangeToken::Quarter),
            "1y" => Ok(RangeToken::Year),
            _ => Err(UnknownRange(s.to_string())),
        }
    }
}

/// How axis labels are rendered for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LabelGranularity {
    /// `%H:%M`
    HourOfDay,
    /// `%m/%d`
    CalendarDate,
}

/// Concrete window for one refresh cycle.
///
/// `point_count * interval` spans exactly from `start_time` to `end_time`,
/// where `end_time` is the instant the window was resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub range: RangeToken,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub point_count: usize,
    pub interval_secs: i64,
    pub label_granularity: LabelGranularity,
}

impl TimeWindow {
    pub fn interval(&self) -> Duration {
        Duration::seconds(self.interval_secs)
    }

    /// Unix timestamps (seconds) of every interval boundary, ascending.
    /// The last boundary is `end_time`.
    pub fn point_timestamps(&self) -> Vec<i64> {
        let start = self.start_time.timestamp();
        (1..=self.point_count as i64)
            .map(|i| start + i * self.interval_secs)
            .collect()
    }

    pub fn format_label(&self, timestamp: i64) -> String {
        let Some(at) = DateTime::<Utc>::from_timestamp(timestamp, 0) else {
            return String::new();
        };
        match self.label_granularity {
            LabelGranularity::HourOfDay => at.format("%H:%M").to_string(),
            LabelGranularity::CalendarDate => at.format("%m/%d").to_string(),
        }
    }
}

/// Resolve a range token against the current clock.
///
/// Unknown tokens resolve to the `7d` window and log a warning.
pub fn resolve(token: &str) -> TimeWindow {
    resolve_at(RangeToken::parse_or_default(token), Utc::now())
}

/// Resolve a parsed range against an explicit "now".
pub fn resolve_at(range: RangeToken, now: DateTime<Utc>) -> TimeWindow {
    let interval = range.interval();
    let point_count = range.point_count();
    let span = interval * point_count as i32;

    TimeWindow {
        range,
        start_time: now - span,
        end_time: now,
        point_count,
        interval_secs: interval.num_seconds(),
        label_granularity: range.label_granularity(),
    }
}
