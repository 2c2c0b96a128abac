//! The client-set boundary: typed upstream failures become
//! `DatasetResult::Unavailable` here and go no further.

use crate::application::retry::{with_backoff, RetryPolicy};
use crate::domain::{
    AnalyticsSource, DatasetKind, DatasetResult, FailureKind, MarketDataSource, MarketOverview,
    NewsArticle, NewsSource, PricePoint, SeriesPoint, TimeWindow, TokenQuote, UpstreamError,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const PRICE_UPSTREAM: &str = "price";
pub const ANALYTICS_UPSTREAM: &str = "analytics";
pub const NEWS_UPSTREAM: &str = "news";

/// Result of one dataset fetch plus, when it failed, why.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome<T> {
    pub result: DatasetResult<T>,
    pub failure: Option<FailureKind>,
}

impl<T> FetchOutcome<T> {
    pub fn real(value: T) -> Self {
        Self {
            result: DatasetResult::Real(value),
            failure: None,
        }
    }

    pub fn unavailable(kind: FailureKind) -> Self {
        Self {
            result: DatasetResult::Unavailable,
            failure: Some(kind),
        }
    }
}

/// One client per external dataset, behind a uniform, infallible interface.
#[derive(Clone)]
pub struct UpstreamClientSet {
    market: Arc<dyn MarketDataSource>,
    analytics: Arc<dyn AnalyticsSource>,
    news: Arc<dyn NewsSource>,
    retry: RetryPolicy,
}

impl UpstreamClientSet {
    pub fn new(
        market: Arc<dyn MarketDataSource>,
        analytics: Arc<dyn AnalyticsSource>,
        news: Arc<dyn NewsSource>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            market,
            analytics,
            news,
            retry,
        }
    }

    /// Batched quotes, retried under the backoff policy.
    ///
    /// A failed batch marks every id unavailable with the batch's failure
    /// kind; ids missing from a successful batch are `EmptyResult`.
    pub async fn fetch_quotes(&self, ids: &[String]) -> BTreeMap<String, FetchOutcome<TokenQuote>> {
        let batch = with_backoff(PRICE_UPSTREAM, &self.retry, || self.market.fetch_quotes(ids)).await;

        match settle(PRICE_UPSTREAM, "quotes", batch, |q| q.is_empty()) {
            FetchOutcome {
                result: DatasetResult::Real(mut quotes),
                ..
            } => ids
                .iter()
                .map(|id| {
                    let outcome = match quotes.remove(id) {
                        Some(quote) if quote.price.is_finite() && quote.price >= 0.0 => {
                            FetchOutcome::real(quote)
                        }
                        Some(_) => {
                            warn!(upstream = PRICE_UPSTREAM, id = %id, "Discarding invalid quote");
                            FetchOutcome::unavailable(FailureKind::MalformedResponse)
                        }
                        None => {
                            warn!(upstream = PRICE_UPSTREAM, id = %id, "Quote missing from response");
                            FetchOutcome::unavailable(FailureKind::EmptyResult)
                        }
                    };
                    (id.clone(), outcome)
                })
                .collect(),
            failed => {
                let kind = failed.failure.unwrap_or(FailureKind::EmptyResult);
                ids.iter()
                    .map(|id| (id.clone(), FetchOutcome::unavailable(kind)))
                    .collect()
            }
        }
    }

    /// Market-wide totals, retried under the backoff policy.
    pub async fn fetch_market_overview(&self) -> FetchOutcome<MarketOverview> {
        let result = with_backoff(PRICE_UPSTREAM, &self.retry, || {
            self.market.fetch_market_overview()
        })
        .await;
        settle(PRICE_UPSTREAM, "market", result, |_| false)
    }

    /// One analytics series; single attempt.
    pub async fn fetch_series(
        &self,
        kind: DatasetKind,
        window: &TimeWindow,
    ) -> FetchOutcome<Vec<SeriesPoint>> {
        let result = self
            .analytics
            .fetch_series(kind, window)
            .await
            .map(|mut points| {
                points.sort_by_key(|p| p.timestamp);
                points.dedup_by_key(|p| p.timestamp);
                points
            });
        settle(ANALYTICS_UPSTREAM, kind.key(), result, Vec::is_empty)
    }

    /// Price history for one asset; single attempt.
    pub async fn fetch_price_history(
        &self,
        id: &str,
        window: &TimeWindow,
    ) -> FetchOutcome<Vec<PricePoint>> {
        let result = self.market.fetch_price_history(id, window).await;
        settle(PRICE_UPSTREAM, id, result, Vec::is_empty)
    }

    /// Latest articles; single attempt.
    pub async fn fetch_news(&self) -> FetchOutcome<Vec<NewsArticle>> {
        let result = self.news.fetch_news().await;
        settle(NEWS_UPSTREAM, "news", result, Vec::is_empty)
    }
}

/// Convert a typed upstream result into a `FetchOutcome`, logging and
/// counting the failure cause.
fn settle<T>(
    upstream: &'static str,
    dataset: &str,
    result: Result<T, UpstreamError>,
    is_empty: impl Fn(&T) -> bool,
) -> FetchOutcome<T> {
    let result = result.and_then(|value| {
        if is_empty(&value) {
            Err(UpstreamError::EmptyResult)
        } else {
            Ok(value)
        }
    });

    match result {
        Ok(value) => {
            debug!(upstream, dataset, "Upstream fetch succeeded");
            metrics::counter!("upstream_requests_total", "upstream" => upstream, "outcome" => "success")
                .increment(1);
            FetchOutcome::real(value)
        }
        Err(e) => {
            let kind = e.kind();
            warn!(
                upstream,
                dataset,
                kind = kind.as_str(),
                "Upstream dataset unavailable: {}",
                e
            );
            metrics::counter!("upstream_requests_total", "upstream" => upstream, "outcome" => kind.as_str())
                .increment(1);
            FetchOutcome::unavailable(kind)
        }
    }
}
