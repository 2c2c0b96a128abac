//! End-to-end refresh cycles against local fake upstreams.
//!
//! Run with: `cargo test --test aggregation_test`

mod common;

use chainpulse_gateway::domain::{
    DatasetKind, FailureKind, Provenance, RangeToken, ServedAs, Snapshot,
};
use common::{dead_aggregator, fake_aggregator, fast_retry, FakeUpstreams};
use std::sync::Arc;

fn notice<'a>(snapshot: &'a Snapshot, dataset: &str) -> Option<&'a chainpulse_gateway::domain::DegradedNotice> {
    snapshot.degraded.iter().find(|d| d.dataset == dataset)
}

fn assert_ascending(timestamps: &[i64]) {
    assert!(
        timestamps.windows(2).all(|w| w[0] < w[1]),
        "timestamps not ascending: {:?}",
        timestamps
    );
}

#[tokio::test]
async fn test_slow_analytics_fall_back_while_prices_stay_real() {
    let fake = FakeUpstreams::start().await;
    fake.state.stall("transactions");
    fake.state.stall("gas");
    let aggregator = fake_aggregator(&fake, fast_retry(3));

    let snapshot = aggregator.refresh("7d").await;

    assert_eq!(snapshot.sequence, 1);
    assert_eq!(snapshot.time_window.range, RangeToken::Week);

    let avax = &snapshot.token_quotes["avalanche-2"];
    assert_eq!(avax.provenance, Provenance::Real);
    assert_eq!(avax.value.price, 28.45);

    for kind in [DatasetKind::TransactionVolume, DatasetKind::GasFees] {
        let series = snapshot.series_for(kind).unwrap();
        assert!(series.is_synthetic(), "{} should be synthetic", kind.key());
        let points = series.data().unwrap();
        assert_eq!(points.len(), 7);
        assert_ascending(&points.iter().map(|p| p.timestamp).collect::<Vec<_>>());

        let degraded = notice(&snapshot, kind.key()).unwrap();
        assert_eq!(degraded.failure, FailureKind::Timeout);
        assert_eq!(degraded.served_as, ServedAs::Synthetic);
    }

    let addresses = snapshot.series_for(DatasetKind::ActiveAddresses).unwrap();
    assert!(addresses.is_real());
    assert!(notice(&snapshot, DatasetKind::ActiveAddresses.key()).is_none());

    assert!(snapshot.news.is_real());
    assert_eq!(snapshot.news_count(), 3);
    assert!(snapshot.generated_at <= chrono::Utc::now());
}

#[tokio::test]
async fn test_asset_missing_from_batch_is_estimated_alone() {
    let fake = FakeUpstreams::start().await;
    let aggregator = fake_aggregator(&fake, fast_retry(0));

    let snapshot = aggregator.refresh("7d").await;

    let joe = &snapshot.token_quotes["joe"];
    assert_eq!(joe.provenance, Provenance::Synthetic);
    assert!(joe.value.price > 0.0);
    let degraded = notice(&snapshot, "joe").unwrap();
    assert_eq!(degraded.failure, FailureKind::EmptyResult);

    assert_eq!(
        snapshot.token_quotes["avalanche-2"].provenance,
        Provenance::Real
    );
    assert_eq!(snapshot.market.provenance, Provenance::Real);
    assert_eq!(snapshot.market.value.btc_dominance_pct, 52.3);
}

#[tokio::test]
async fn test_price_outage_is_retried_then_served_stale() {
    let fake = FakeUpstreams::start().await;
    let aggregator = fake_aggregator(&fake, fast_retry(3));

    // no previous value: estimated after 1 attempt + 3 retries
    fake.state.set_price_down(true);
    let first = aggregator.refresh("7d").await;
    assert_eq!(fake.state.price_calls(), 4);
    assert_eq!(
        first.token_quotes["avalanche-2"].provenance,
        Provenance::Synthetic
    );
    assert_eq!(
        notice(&first, "avalanche-2").unwrap().failure,
        FailureKind::HttpStatus
    );
    assert_eq!(first.market.provenance, Provenance::Synthetic);

    // provider recovers
    fake.state.set_price_down(false);
    let second = aggregator.refresh("7d").await;
    assert_eq!(fake.state.price_calls(), 5);
    assert_eq!(second.token_quotes["avalanche-2"].provenance, Provenance::Real);

    // down again: last real quote is kept rather than estimated
    fake.state.set_price_down(true);
    let third = aggregator.refresh("7d").await;
    let avax = &third.token_quotes["avalanche-2"];
    assert_eq!(avax.provenance, Provenance::Stale);
    assert_eq!(avax.value.price, 28.45);
    assert_eq!(notice(&third, "avalanche-2").unwrap().served_as, ServedAs::Stale);
    assert_eq!(third.market.provenance, Provenance::Stale);
}

#[tokio::test]
async fn test_real_history_survives_later_outage() {
    let fake = FakeUpstreams::start().await;
    let aggregator = fake_aggregator(&fake, fast_retry(0));

    aggregator.refresh("7d").await;
    let spark = aggregator.history("avalanche-2").unwrap();
    assert_eq!(spark.provenance, Provenance::Real);
    assert!(spark.points.len() <= 7);
    assert_eq!(spark.points.last().unwrap().price, 28.45);

    fake.state.set_price_down(true);
    let snapshot = aggregator.refresh("7d").await;
    let kept = &snapshot.history["avalanche-2"];
    assert_eq!(kept.provenance, Provenance::Real);
    assert_eq!(kept.points, spark.points);
    assert_eq!(
        notice(&snapshot, "avalanche-2:history").unwrap().served_as,
        ServedAs::Stale
    );

    // never had real history: seeded synthetically
    assert_eq!(snapshot.history["joe"].provenance, Provenance::Synthetic);
}

#[tokio::test]
async fn test_total_outage_still_publishes_complete_snapshot() {
    let aggregator = dead_aggregator();

    let snapshot = aggregator.refresh("30d").await;

    assert_eq!(snapshot.time_window.range, RangeToken::Month);
    for kind in DatasetKind::ALL {
        let series = snapshot.series_for(kind).unwrap();
        assert!(series.is_synthetic());
        assert_eq!(series.data().unwrap().len(), snapshot.time_window.point_count);
    }
    for quote in snapshot.token_quotes.values() {
        assert_eq!(quote.provenance, Provenance::Synthetic);
    }
    assert!(snapshot.news.is_unavailable());
    assert_eq!(notice(&snapshot, "news").unwrap().served_as, ServedAs::Missing);
    assert_eq!(snapshot.history.len(), 2);
    assert_eq!(aggregator.latest().unwrap().sequence, snapshot.sequence);
}

#[tokio::test]
async fn test_unknown_range_resolves_to_default() {
    let aggregator = dead_aggregator();
    let snapshot = aggregator.refresh("fortnight").await;
    assert_eq!(snapshot.time_window.range, RangeToken::Week);
    assert_eq!(snapshot.time_window.point_count, 7);
}

#[tokio::test]
async fn test_overlapping_cycles_publish_newest() {
    let fake = FakeUpstreams::start().await;
    let aggregator = Arc::new(fake_aggregator(&fake, fast_retry(0)));

    let (a, b) = tokio::join!(aggregator.refresh("7d"), aggregator.refresh("24h"));

    let latest = aggregator.latest().unwrap();
    assert_eq!(latest.sequence, 2);
    // whichever finished last, both callers observe a snapshot at least as new as their own
    assert!(a.sequence >= 1 && b.sequence >= 1);
    assert_eq!(a.sequence.max(b.sequence), 2);

    let mut rx = aggregator.subscribe();
    assert_eq!(rx.borrow_and_update().as_ref().unwrap().sequence, 2);
}

#[tokio::test]
async fn test_throttled_price_provider_is_reported_as_rate_limited() {
    let fake = FakeUpstreams::start().await;
    fake.state.set_price_throttled(true);
    let aggregator = fake_aggregator(&fake, fast_retry(3));

    let snapshot = aggregator.refresh("7d").await;

    // 429 follows the same retry schedule as other failures
    assert_eq!(fake.state.price_calls(), 4);
    let degraded = notice(&snapshot, "avalanche-2").unwrap();
    assert_eq!(degraded.failure, FailureKind::RateLimited);
    assert_eq!(degraded.served_as, ServedAs::Synthetic);
    assert_eq!(degraded.message, FailureKind::RateLimited.user_message());
    assert_eq!(
        notice(&snapshot, "market").unwrap().failure,
        FailureKind::RateLimited
    );
}

#[tokio::test]
async fn test_estimated_history_is_not_mixed_with_live_quote() {
    let fake = FakeUpstreams::start().await;
    fake.state.set_chart_down(true);
    let aggregator = fake_aggregator(&fake, fast_retry(0));

    let snapshot = aggregator.refresh("7d").await;

    assert_eq!(
        snapshot.token_quotes["avalanche-2"].provenance,
        Provenance::Real
    );
    let spark = &snapshot.history["avalanche-2"];
    assert_eq!(spark.provenance, Provenance::Synthetic);
    assert_eq!(spark.points.len(), snapshot.time_window.point_count);
    let end = snapshot.time_window.end_time.timestamp();
    assert!(spark.points.iter().all(|p| p.timestamp <= end));
    assert_eq!(spark.points.last().unwrap().price, 28.45);
}
