//! Per-`(station_id, metric)` bounded rolling window (§3 RollingWindow, §4.4).

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use station_common::MetricKind;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::online_stats::OnlineStats;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Insertion-ordered, capacity-bounded deque of `(timestamp, value)` samples
/// plus the `OnlineStats` accumulator for the same series.
#[derive(Debug)]
pub struct RollingWindow {
    capacity: usize,
    retention: ChronoDuration,
    samples: VecDeque<Sample>,
    stats: OnlineStats,
}

impl RollingWindow {
    pub fn new(capacity: usize, retention_days: u32) -> Self {
        Self {
            capacity,
            retention: ChronoDuration::days(retention_days as i64),
            samples: VecDeque::with_capacity(capacity.min(4096)),
            stats: OnlineStats::new(),
        }
    }

    /// O(1) append. Evicts oldest-first once capacity is reached. Does not
    /// recompute `OnlineStats` on eviction: stats remain a running summary
    /// over all samples ever observed, per §4.4's Welford recurrence, while
    /// the window itself is the bounded recency buffer for trend/predictor
    /// scans.
    pub fn push(&mut self, timestamp: DateTime<Utc>, value: f64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { timestamp, value });
        self.stats.update(value);
    }

    /// O(1) most-recent read.
    pub fn last(&self) -> Option<Sample> {
        self.samples.back().copied()
    }

    /// O(k) scan of samples not older than the retention window, as of `now`.
    pub fn recent(&self, now: DateTime<Utc>) -> Vec<Sample> {
        let cutoff = now - self.retention;
        self.samples
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .copied()
            .collect()
    }

    /// All samples currently held, ignoring retention age (used by callers
    /// that already filtered, or that want the full bounded buffer).
    pub fn all(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn stats(&self) -> OnlineStats {
        self.stats
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct SeriesKey {
    station_id: String,
    metric: MetricKind,
}

/// Process-wide table of rolling windows, keyed by `(station_id, metric)`.
/// Concurrent map at the table level; each series is behind its own lock so
/// writers to different stations never contend (§5 single-writer-per-station).
#[derive(Clone)]
pub struct RollingStore {
    capacity: usize,
    retention_days: u32,
    series: Arc<DashMap<SeriesKey, Arc<RwLock<RollingWindow>>>>,
}

impl RollingStore {
    pub fn new(capacity: usize, retention_days: u32) -> Self {
        Self {
            capacity,
            retention_days,
            series: Arc::new(DashMap::new()),
        }
    }

    fn entry(&self, station_id: &str, metric: MetricKind) -> Arc<RwLock<RollingWindow>> {
        let key = SeriesKey {
            station_id: station_id.to_string(),
            metric,
        };
        self.series
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(RollingWindow::new(self.capacity, self.retention_days))))
            .clone()
    }

    pub fn push(&self, station_id: &str, metric: MetricKind, timestamp: DateTime<Utc>, value: f64) {
        self.entry(station_id, metric).write().push(timestamp, value);
    }

    pub fn stats(&self, station_id: &str, metric: MetricKind) -> OnlineStats {
        self.entry(station_id, metric).read().stats()
    }

    pub fn recent(&self, station_id: &str, metric: MetricKind, now: DateTime<Utc>) -> Vec<Sample> {
        self.entry(station_id, metric).read().recent(now)
    }

    pub fn len(&self, station_id: &str, metric: MetricKind) -> usize {
        self.entry(station_id, metric).read().len()
    }

    pub fn last(&self, station_id: &str, metric: MetricKind) -> Option<Sample> {
        self.entry(station_id, metric).read().last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_first_at_capacity() {
        let mut window = RollingWindow::new(3, 7);
        let base = Utc::now();
        for i in 0..5 {
            window.push(base + ChronoDuration::seconds(i), i as f64);
        }
        let values: Vec<f64> = window.all().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn recent_filters_by_retention_age() {
        let mut window = RollingWindow::new(100, 1);
        let now = Utc::now();
        window.push(now - ChronoDuration::days(2), 1.0);
        window.push(now - ChronoDuration::hours(1), 2.0);
        let recent = window.recent(now);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].value, 2.0);
    }

    #[test]
    fn store_isolates_series_by_station_and_metric() {
        let store = RollingStore::new(1000, 7);
        let now = Utc::now();
        store.push("S1", MetricKind::FanSpeed, now, 3000.0);
        store.push("S2", MetricKind::FanSpeed, now, 1000.0);
        store.push("S1", MetricKind::Temperature, now, 40.0);

        assert_eq!(store.last("S1", MetricKind::FanSpeed).unwrap().value, 3000.0);
        assert_eq!(store.last("S2", MetricKind::FanSpeed).unwrap().value, 1000.0);
        assert_eq!(store.last("S1", MetricKind::Temperature).unwrap().value, 40.0);
        assert_eq!(store.len("S1", MetricKind::FanSpeed), 1);
    }
}
