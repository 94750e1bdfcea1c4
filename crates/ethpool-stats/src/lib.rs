//! # ethpool-stats
//!
//! Read models over the pool keyspace: hashrate windows, luck ratios,
//! dashboard time-series and node heartbeats.
//!
//! Everything here reads the indices the ledger writes without mutating
//! them, except for opportunistically pruning expired stream and chart
//! tails. Snapshot reads go through one atomic batch per call so the
//! returned view is consistent.

mod access;
mod charts;
mod error;
mod hashrate;
mod nodes;
mod stats;

pub use access::AccessLists;
pub use charts::{
    Charts, ClientCharts, LuckCharts, MinerCharts, NetCharts, PaymentCharts, PoolCharts,
    CHART_RETENTION_SECS,
};
pub use error::{StatsError, StatsResult};
pub use hashrate::{effective_window, MinerHashrate, WorkerHashrate, HASHRATE_FLOOR_SECS};
pub use nodes::{NodeRegistry, NodeState};
pub use stats::{Luck, MinerStats, PoolCounters, PoolStats, StatsCollector, WorkersStats};
