//! Aegis DNS Background Jobs
//!
//! Periodic tasks around the core: the filter refresher, the query-log
//! flusher, and the stats flusher. Each is a single task on a fixed tick,
//! stopped through a shared `CancellationToken`.
pub mod filter_refresh;
pub mod querylog_flush;
pub mod runner;
pub mod stats_flush;

pub use filter_refresh::FilterRefreshJob;
pub use querylog_flush::QueryLogFlushJob;
pub use runner::JobRunner;
pub use stats_flush::StatsFlushJob;
