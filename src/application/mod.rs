pub mod aggregator;
pub mod fallback;
pub mod history_cache;
pub mod retry;
pub mod scheduler;
pub mod snapshot_store;
pub mod upstream_set;

pub use aggregator::Aggregator;
pub use fallback::SyntheticGenerator;
pub use history_cache::HistoryCache;
pub use retry::RetryPolicy;
pub use scheduler::{RefreshScheduler, SchedulerHandle};
pub use snapshot_store::SnapshotStore;
pub use upstream_set::UpstreamClientSet;
