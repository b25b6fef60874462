//! Rolling store, online statistics, and metric ingest validation (§4.3, §4.4).

pub mod ingest;
pub mod online_stats;
pub mod rolling_store;

pub use ingest::{IngestOutcome, MetricIngest};
pub use online_stats::OnlineStats;
pub use rolling_store::{RollingStore, RollingWindow, Sample};
