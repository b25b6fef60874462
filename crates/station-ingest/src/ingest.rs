//! Metric ingest validation and dispatch (§4.3).
//!
//! Accepts `MetricReading`s from device sessions and push endpoints,
//! validates against the metric dictionary, writes atomically to the
//! rolling store, and reports whether the reading was accepted. Anomaly
//! detection is invoked by the caller (`station-analytics`) after a
//! successful ingest, keeping this crate free of a dependency on analytics.

use station_common::{MetricReading, Result};
use tracing::{debug, warn};

use crate::rolling_store::RollingStore;

/// Outcome of `MetricIngest::ingest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted,
    Rejected,
}

/// Validates and stores metric readings. Rejected readings are counted but
/// never written to the rolling store (§4.3, §7 ValidationError).
pub struct MetricIngest {
    store: RollingStore,
    accepted: std::sync::atomic::AtomicU64,
    rejected: std::sync::atomic::AtomicU64,
}

impl MetricIngest {
    pub fn new(store: RollingStore) -> Self {
        Self {
            store,
            accepted: std::sync::atomic::AtomicU64::new(0),
            rejected: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &RollingStore {
        &self.store
    }

    /// Validate `(unit, range)` against the metric kind table and, if valid,
    /// write the reading atomically to the rolling store. Returns whether
    /// the reading was accepted.
    pub fn ingest(&self, reading: &MetricReading) -> Result<IngestOutcome> {
        if !station_common::validate_station_id(&reading.station_id) {
            self.rejected.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            warn!(station_id = %reading.station_id, "rejected reading: invalid station id");
            return Ok(IngestOutcome::Rejected);
        }

        if !reading.is_in_range() {
            self.rejected.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            let (lo, hi) = reading.metric.valid_range();
            warn!(
                station_id = %reading.station_id,
                metric = ?reading.metric,
                value = reading.value,
                lo,
                hi,
                "rejected reading: out of range"
            );
            return Ok(IngestOutcome::Rejected);
        }

        self.store
            .push(&reading.station_id, reading.metric, reading.timestamp, reading.value);
        self.accepted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        debug!(station_id = %reading.station_id, metric = ?reading.metric, "accepted reading");
        Ok(IngestOutcome::Accepted)
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use station_common::MetricKind;

    fn reading(station: &str, metric: MetricKind, value: f64) -> MetricReading {
        MetricReading {
            station_id: station.to_string(),
            metric,
            value,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn accepts_in_range_reading_and_stores_it() {
        let ingest = MetricIngest::new(RollingStore::new(1000, 7));
        let r = reading("S1", MetricKind::CpuUsage, 42.0);
        assert_eq!(ingest.ingest(&r).unwrap(), IngestOutcome::Accepted);
        assert_eq!(ingest.store().len("S1", MetricKind::CpuUsage), 1);
        assert_eq!(ingest.accepted_count(), 1);
    }

    #[test]
    fn rejects_out_of_range_reading_without_storing() {
        let ingest = MetricIngest::new(RollingStore::new(1000, 7));
        let r = reading("S1", MetricKind::CpuUsage, 250.0);
        assert_eq!(ingest.ingest(&r).unwrap(), IngestOutcome::Rejected);
        assert_eq!(ingest.store().len("S1", MetricKind::CpuUsage), 0);
        assert_eq!(ingest.rejected_count(), 1);
    }

    #[test]
    fn rejects_invalid_station_id() {
        let ingest = MetricIngest::new(RollingStore::new(1000, 7));
        let r = reading("bad station!", MetricKind::CpuUsage, 10.0);
        assert_eq!(ingest.ingest(&r).unwrap(), IngestOutcome::Rejected);
    }
}
