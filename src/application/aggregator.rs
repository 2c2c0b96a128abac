//! Aggregation orchestrator.
//!
//! One refresh cycle resolves the window, fans out every upstream fetch
//! concurrently, substitutes each unavailable dataset independently, merges
//! prices into the history cache and publishes one immutable snapshot.

use crate::application::fallback::SyntheticGenerator;
use crate::application::history_cache::{HistoryCache, HistoryUpdate};
use crate::application::snapshot_store::SnapshotStore;
use crate::application::upstream_set::{FetchOutcome, UpstreamClientSet};
use crate::config::AssetConfig;
use crate::domain::{
    resolve, CacheRepository, DatasetKind, DatasetResult, DegradedNotice, FailureKind,
    MarketOverview, NewsArticle, PricePoint, Provenance, SeriesPoint, ServedAs, Snapshot, Sourced,
    Sparkline, TimeWindow, TokenQuote,
};
use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Redis key holding the last published snapshot.
pub const SNAPSHOT_ARCHIVE_KEY: &str = "chainpulse:snapshot:latest";
const SNAPSHOT_ARCHIVE_TTL_SECS: u64 = 86_400;

/// Everything one cycle fetched and resolved, ready to be committed.
struct CycleParts {
    sequence: u64,
    window: TimeWindow,
    token_quotes: BTreeMap<String, Sourced<TokenQuote>>,
    market: Sourced<MarketOverview>,
    series: BTreeMap<String, DatasetResult<Vec<SeriesPoint>>>,
    news: DatasetResult<Vec<NewsArticle>>,
    history_updates: Vec<HistoryUpdate>,
    degraded: Vec<DegradedNotice>,
}

pub struct Aggregator {
    upstreams: UpstreamClientSet,
    generator: SyntheticGenerator,
    history: HistoryCache,
    store: SnapshotStore,
    assets: Vec<AssetConfig>,
    sequence: AtomicU64,
    /// Serializes history commit + publication across cycles.
    publish_lock: Mutex<()>,
    archive: Option<Arc<dyn CacheRepository>>,
    /// Highest sequence written to the archive. Held across the write.
    archived_sequence: tokio::sync::Mutex<u64>,
}

impl Aggregator {
    pub fn new(upstreams: UpstreamClientSet, assets: Vec<AssetConfig>, history_capacity: usize) -> Self {
        Self {
            upstreams,
            generator: SyntheticGenerator::new(),
            history: HistoryCache::new(history_capacity),
            store: SnapshotStore::new(),
            assets,
            sequence: AtomicU64::new(0),
            publish_lock: Mutex::new(()),
            archive: None,
            archived_sequence: tokio::sync::Mutex::new(0),
        }
    }

    /// Archive every published snapshot, and allow `warm_start`.
    pub fn with_archive(mut self, archive: Arc<dyn CacheRepository>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn assets(&self) -> &[AssetConfig] {
        &self.assets
    }

    /// Last published snapshot, if any cycle has completed yet.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.store.latest()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.store.subscribe()
    }

    pub fn history(&self, token_id: &str) -> Option<Sparkline> {
        self.history.get(token_id)
    }

    /// Run one refresh cycle.
    ///
    /// Never fails: every unavailable dataset is substituted. If a newer
    /// cycle published while this one was in flight, the newer snapshot is
    /// returned and this cycle's result is dropped.
    pub async fn refresh(&self, range: &str) -> Arc<Snapshot> {
        let started = Instant::now();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let window = resolve(range);
        debug!(sequence, range = %window.range, "Starting refresh cycle");

        let parts = self.collect(sequence, window).await;
        let (snapshot, published) = self.finish(parts);

        let elapsed = started.elapsed();
        metrics::histogram!("refresh_cycle_duration_seconds").record(elapsed.as_secs_f64());

        if published {
            metrics::counter!("refresh_cycles_total", "outcome" => "published").increment(1);
            let degraded: Vec<&str> = snapshot.degraded.iter().map(|d| d.dataset.as_str()).collect();
            if degraded.is_empty() {
                info!(
                    sequence,
                    range = %snapshot.time_window.range,
                    duration_ms = elapsed.as_millis() as u64,
                    "Published snapshot"
                );
            } else {
                warn!(
                    sequence,
                    range = %snapshot.time_window.range,
                    duration_ms = elapsed.as_millis() as u64,
                    degraded = ?degraded,
                    "Published snapshot in degraded mode"
                );
            }
            self.archive_snapshot(&snapshot).await;
        } else {
            metrics::counter!("refresh_cycles_total", "outcome" => "stale").increment(1);
            info!(
                sequence,
                newer = snapshot.sequence,
                "Dropped stale refresh cycle"
            );
        }

        snapshot
    }

    /// Publish the archived snapshot (if any) as sequence 0 so readers have
    /// stale-but-real data before the first cycle completes.
    pub async fn warm_start(&self) -> bool {
        let Some(archive) = &self.archive else {
            return false;
        };

        let raw = match archive.get(SNAPSHOT_ARCHIVE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No archived snapshot to warm start from");
                return false;
            }
            Err(e) => {
                warn!("Failed to read archived snapshot: {}", e);
                return false;
            }
        };

        let mut snapshot: Snapshot = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                warn!("Discarding unreadable archived snapshot: {}", e);
                return false;
            }
        };

        snapshot.sequence = 0;
        for quote in snapshot.token_quotes.values_mut() {
            if quote.provenance == Provenance::Real {
                quote.provenance = Provenance::Stale;
            }
        }
        if snapshot.market.provenance == Provenance::Real {
            snapshot.market.provenance = Provenance::Stale;
        }

        let updates = snapshot
            .history
            .iter()
            .map(|(id, spark)| HistoryUpdate::Seed {
                token_id: id.clone(),
                series: match spark.provenance {
                    Provenance::Synthetic => DatasetResult::Synthetic(spark.points.clone()),
                    _ => DatasetResult::Real(spark.points.clone()),
                },
            })
            .collect();
        self.history.commit(0, updates);

        let installed = self.store.publish(Arc::new(snapshot));
        if installed {
            info!("Warm started from archived snapshot");
        }
        installed
    }

    /// Fan out every fetch, then resolve each dataset independently.
    async fn collect(&self, sequence: u64, window: TimeWindow) -> CycleParts {
        let ids: Vec<String> = self.assets.iter().map(|a| a.id.clone()).collect();
        let window_ref = &window;

        let (mut quotes, market, series, price_histories, news) = tokio::join!(
            self.upstreams.fetch_quotes(&ids),
            self.upstreams.fetch_market_overview(),
            join_all(DatasetKind::ALL.into_iter().map(|kind| async move {
                (kind, self.upstreams.fetch_series(kind, window_ref).await)
            })),
            join_all(
                ids.iter()
                    .map(|id| self.upstreams.fetch_price_history(id, window_ref))
            ),
            self.upstreams.fetch_news(),
        );

        let previous = self.store.latest();
        let mut degraded = Vec::new();
        let now = Utc::now().timestamp();

        // Quotes
        let mut token_quotes = BTreeMap::new();
        let mut history_updates = Vec::new();
        let mut ticks = Vec::new();
        for asset in &self.assets {
            let outcome = quotes
                .remove(&asset.id)
                .unwrap_or_else(|| FetchOutcome::unavailable(FailureKind::EmptyResult));
            let quote = match outcome.result {
                DatasetResult::Real(quote) => {
                    ticks.push(HistoryUpdate::Tick {
                        token_id: asset.id.clone(),
                        point: PricePoint {
                            timestamp: now,
                            price: quote.price,
                        },
                    });
                    Sourced::real(quote)
                }
                _ => {
                    let failure = outcome.failure.unwrap_or(FailureKind::EmptyResult);
                    let retained = previous
                        .as_ref()
                        .and_then(|s| s.token_quotes.get(&asset.id))
                        .filter(|q| q.provenance != Provenance::Synthetic);
                    match retained {
                        Some(prev) => {
                            record_degraded(&mut degraded, &asset.id, failure, ServedAs::Stale);
                            Sourced::stale(prev.value.clone())
                        }
                        None => {
                            record_degraded(&mut degraded, &asset.id, failure, ServedAs::Synthetic);
                            Sourced::synthetic(self.generator.quote(asset))
                        }
                    }
                }
            };
            token_quotes.insert(asset.id.clone(), quote);
        }

        // Market overview
        let market = match market.result {
            DatasetResult::Real(overview) => Sourced::real(overview),
            _ => {
                let failure = market.failure.unwrap_or(FailureKind::EmptyResult);
                let retained = previous
                    .as_ref()
                    .map(|s| &s.market)
                    .filter(|m| m.provenance != Provenance::Synthetic);
                match retained {
                    Some(prev) => {
                        record_degraded(&mut degraded, "market", failure, ServedAs::Stale);
                        Sourced::stale(prev.value.clone())
                    }
                    None => {
                        record_degraded(&mut degraded, "market", failure, ServedAs::Synthetic);
                        Sourced::synthetic(self.generator.market_overview())
                    }
                }
            }
        };

        // Analytics series, each falling back on its own
        let mut series_map = BTreeMap::new();
        for (kind, outcome) in series {
            let resolved = match outcome.result {
                DatasetResult::Real(points) => DatasetResult::Real(points),
                _ => {
                    let failure = outcome.failure.unwrap_or(FailureKind::EmptyResult);
                    record_degraded(&mut degraded, kind.key(), failure, ServedAs::Synthetic);
                    DatasetResult::Synthetic(self.generator.synthesize(kind, &window))
                }
            };
            series_map.insert(kind.key().to_string(), resolved);
        }

        // Price history seeds; ticks go after so they land on top
        for (asset, outcome) in self.assets.iter().zip(price_histories) {
            let series = match outcome.result {
                DatasetResult::Real(points) => DatasetResult::Real(points),
                _ => {
                    let failure = outcome.failure.unwrap_or(FailureKind::EmptyResult);
                    let has_real = self
                        .history
                        .get(&asset.id)
                        .is_some_and(|s| s.provenance == Provenance::Real);
                    let dataset = format!("{}:history", asset.id);
                    if has_real {
                        record_degraded(&mut degraded, &dataset, failure, ServedAs::Stale);
                    } else {
                        record_degraded(&mut degraded, &dataset, failure, ServedAs::Synthetic);
                    }
                    let anchor = token_quotes
                        .get(&asset.id)
                        .map(|q| q.value.price)
                        .unwrap_or(asset.reference_price);
                    DatasetResult::Synthetic(self.generator.price_history(anchor, &window))
                }
            };
            history_updates.push(HistoryUpdate::Seed {
                token_id: asset.id.clone(),
                series,
            });
        }
        history_updates.extend(ticks);

        // News is not synthesized; the last real list is kept instead
        let news = match news.result {
            DatasetResult::Real(articles) => DatasetResult::Real(articles),
            _ => {
                let failure = news.failure.unwrap_or(FailureKind::EmptyResult);
                let retained = previous
                    .as_ref()
                    .and_then(|s| s.news.data())
                    .filter(|articles| !articles.is_empty())
                    .cloned();
                match retained {
                    Some(articles) => {
                        record_degraded(&mut degraded, "news", failure, ServedAs::Stale);
                        DatasetResult::Real(articles)
                    }
                    None => {
                        record_degraded(&mut degraded, "news", failure, ServedAs::Missing);
                        DatasetResult::Unavailable
                    }
                }
            }
        };

        CycleParts {
            sequence,
            window,
            token_quotes,
            market,
            series: series_map,
            news,
            history_updates,
            degraded,
        }
    }

    /// Commit history and publish, atomically with respect to other cycles.
    ///
    /// Returns the snapshot readers now see and whether it is this cycle's.
    fn finish(&self, parts: CycleParts) -> (Arc<Snapshot>, bool) {
        let _guard = self.publish_lock.lock().unwrap_or_else(|poisoned| {
            warn!("Publish lock poisoned, recovering");
            poisoned.into_inner()
        });

        let history = match self.history.commit(parts.sequence, parts.history_updates) {
            Some(view) => view,
            None => self.history.snapshot(),
        };

        let snapshot = Arc::new(Snapshot {
            sequence: parts.sequence,
            time_window: parts.window,
            token_quotes: parts.token_quotes,
            market: parts.market,
            series: parts.series,
            news: parts.news,
            history,
            degraded: parts.degraded,
            generated_at: Utc::now(),
        });

        if self.store.publish(snapshot.clone()) {
            (snapshot, true)
        } else {
            (self.store.latest().unwrap_or(snapshot), false)
        }
    }

    /// Write `snapshot` to the archive unless a newer one is already there.
    async fn archive_snapshot(&self, snapshot: &Snapshot) {
        let Some(archive) = &self.archive else {
            return;
        };
        let mut archived = self.archived_sequence.lock().await;
        if snapshot.sequence <= *archived {
            debug!(
                sequence = snapshot.sequence,
                archived = *archived,
                "Skipping archive of superseded snapshot"
            );
            return;
        }
        match serde_json::to_string(snapshot) {
            Ok(json) => {
                match archive
                    .set(SNAPSHOT_ARCHIVE_KEY, &json, SNAPSHOT_ARCHIVE_TTL_SECS)
                    .await
                {
                    Ok(()) => *archived = snapshot.sequence,
                    Err(e) => warn!("Failed to archive snapshot: {}", e),
                }
            }
            Err(e) => warn!("Failed to serialize snapshot for archive: {}", e),
        }
    }
}

fn record_degraded(
    degraded: &mut Vec<DegradedNotice>,
    dataset: &str,
    failure: FailureKind,
    served_as: ServedAs,
) {
    if served_as == ServedAs::Synthetic {
        metrics::counter!("dataset_fallback_total", "dataset" => dataset.to_string()).increment(1);
    }
    degraded.push(DegradedNotice::new(dataset, failure, served_as));
}
