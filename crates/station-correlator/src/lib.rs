//! Alarm correlation and root-cause analysis (§4.8, §4.9).

pub mod alarm_correlator;
pub mod dbscan;
pub mod pattern;
pub mod rca;

pub use alarm_correlator::{AlarmCorrelator, CorrelationResult};
pub use pattern::PatternStore;
pub use rca::RcaEngine;
