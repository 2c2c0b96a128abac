//! Rolling per-token price history for sparklines.
//!
//! Buffers are owned here and only mutated through `seed`, `merge` and
//! `commit`. Consumers get copies (`Sparkline`). Every mutation carries the
//! refresh-cycle sequence number; mutations older than the last accepted
//! one are dropped so out-of-order cycle completions cannot rewind history.

use crate::domain::{DatasetResult, PricePoint, Provenance, Sparkline};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Default number of points kept per token.
pub const DEFAULT_CAPACITY: usize = 7;

#[derive(Debug, Clone)]
struct HistoryBuffer {
    points: VecDeque<PricePoint>,
    provenance: Provenance,
}

impl HistoryBuffer {
    fn to_sparkline(&self) -> Sparkline {
        Sparkline {
            provenance: self.provenance,
            points: self.points.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    buffers: HashMap<String, HistoryBuffer>,
    last_sequence: u64,
}

/// One change applied as part of a cycle's commit.
#[derive(Debug, Clone)]
pub enum HistoryUpdate {
    /// Replace the buffer with a freshly fetched series (subject to the
    /// real-over-synthetic rule).
    Seed {
        token_id: String,
        series: DatasetResult<Vec<PricePoint>>,
    },
    /// Append one observed price.
    Tick { token_id: String, point: PricePoint },
}

pub struct HistoryCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl Default for HistoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl HistoryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("History cache mutex poisoned, recovering state");
            poisoned.into_inner()
        })
    }

    /// Replace a token's buffer with a fetched series.
    ///
    /// A `Real` series always wins. A `Synthetic` series only fills an empty
    /// or already synthetic buffer; it never overwrites real history.
    /// `Unavailable` leaves the buffer untouched. Returns `None` when the
    /// sequence number is stale.
    pub fn seed(
        &self,
        token_id: &str,
        series: &DatasetResult<Vec<PricePoint>>,
        sequence: u64,
    ) -> Option<Sparkline> {
        let mut state = self.state();
        if !Self::accept(&mut state, sequence) {
            return None;
        }
        self.apply_seed(&mut state, token_id, series);
        state.buffers.get(token_id).map(HistoryBuffer::to_sparkline)
    }

    /// Append one observed price, evicting the oldest point beyond capacity.
    ///
    /// A point older than the newest buffered one is ignored; a point with
    /// the same timestamp replaces it. Returns the updated series, or `None`
    /// when the sequence number is stale.
    pub fn merge(&self, token_id: &str, point: PricePoint, sequence: u64) -> Option<Vec<PricePoint>> {
        let mut state = self.state();
        if !Self::accept(&mut state, sequence) {
            return None;
        }
        self.apply_tick(&mut state, token_id, point);
        state
            .buffers
            .get(token_id)
            .map(|b| b.points.iter().copied().collect())
    }

    /// Apply all of one cycle's updates under a single lock.
    ///
    /// Returns the full post-commit view, or `None` if a newer cycle has
    /// already committed.
    pub fn commit(
        &self,
        sequence: u64,
        updates: Vec<HistoryUpdate>,
    ) -> Option<BTreeMap<String, Sparkline>> {
        let mut state = self.state();
        if !Self::accept(&mut state, sequence) {
            return None;
        }
        for update in updates {
            match update {
                HistoryUpdate::Seed { token_id, series } => {
                    self.apply_seed(&mut state, &token_id, &series)
                }
                HistoryUpdate::Tick { token_id, point } => {
                    self.apply_tick(&mut state, &token_id, point)
                }
            }
        }
        Some(Self::view(&state))
    }

    pub fn get(&self, token_id: &str) -> Option<Sparkline> {
        self.state()
            .buffers
            .get(token_id)
            .map(HistoryBuffer::to_sparkline)
    }

    /// Copy of every buffer.
    pub fn snapshot(&self) -> BTreeMap<String, Sparkline> {
        Self::view(&self.state())
    }

    pub fn last_sequence(&self) -> u64 {
        self.state().last_sequence
    }

    fn accept(state: &mut CacheState, sequence: u64) -> bool {
        if sequence < state.last_sequence {
            debug!(
                sequence,
                last_sequence = state.last_sequence,
                "Dropping stale history update"
            );
            return false;
        }
        state.last_sequence = sequence;
        true
    }

    fn view(state: &CacheState) -> BTreeMap<String, Sparkline> {
        state
            .buffers
            .iter()
            .map(|(id, buffer)| (id.clone(), buffer.to_sparkline()))
            .collect()
    }

    fn apply_seed(
        &self,
        state: &mut CacheState,
        token_id: &str,
        series: &DatasetResult<Vec<PricePoint>>,
    ) {
        let (points, provenance) = match series {
            DatasetResult::Real(points) => (points, Provenance::Real),
            DatasetResult::Synthetic(points) => {
                let has_real = state
                    .buffers
                    .get(token_id)
                    .is_some_and(|b| b.provenance == Provenance::Real);
                if has_real {
                    debug!(token_id, "Keeping real history over synthetic seed");
                    return;
                }
                (points, Provenance::Synthetic)
            }
            DatasetResult::Unavailable => return,
        };
        if points.is_empty() {
            return;
        }

        let mut sorted = points.clone();
        sorted.sort_by_key(|p| p.timestamp);
        sorted.dedup_by_key(|p| p.timestamp);
        let skip = sorted.len().saturating_sub(self.capacity);

        state.buffers.insert(
            token_id.to_string(),
            HistoryBuffer {
                points: sorted.into_iter().skip(skip).collect(),
                provenance,
            },
        );
    }

    /// Append one observed price, evicting the oldest point beyond capacity.
    ///
    /// A synthetic buffer takes no ticks: a series is either wholly real or
    /// wholly estimated.
    fn apply_tick(&self, state: &mut CacheState, token_id: &str, point: PricePoint) {
        let buffer = state
            .buffers
            .entry(token_id.to_string())
            .or_insert_with(|| HistoryBuffer {
                points: VecDeque::with_capacity(self.capacity),
                provenance: Provenance::Real,
            });

        if buffer.provenance == Provenance::Synthetic {
            debug!(token_id, "Not mixing real tick into synthetic history");
            return;
        }

        match buffer.points.back_mut() {
            Some(last) if point.timestamp < last.timestamp => {
                debug!(token_id, "Ignoring out-of-order price tick");
                return;
            }
            Some(last) if point.timestamp == last.timestamp => {
                *last = point;
                return;
            }
            _ => {}
        }

        buffer.points.push_back(point);
        while buffer.points.len() > self.capacity {
            buffer.points.pop_front();
        }
    }
}
