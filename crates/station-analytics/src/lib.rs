//! Anomaly detection, trend analysis, and component health prediction (§4.5-4.7).

pub mod isolation_forest;
pub mod predictor;
pub mod trend;
pub mod zscore;

pub use isolation_forest::{IsolationForest, IsolationForestConfig};
pub use predictor::predict;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use station_common::{Anomaly, MetricKind};
use station_ingest::RollingStore;
use std::sync::Arc;

/// The two cooperating anomaly-detection paths (§4.5), composed over a
/// shared rolling store. Owns no mutable station state beyond the
/// per-station Isolation Forest cache, which is refit offline on demand.
pub struct AnomalyDetector {
    store: RollingStore,
    z_threshold: f64,
    forests: DashMap<String, Arc<IsolationForest>>,
    forest_config: IsolationForestConfig,
}

impl AnomalyDetector {
    pub fn new(store: RollingStore, z_threshold: f64, forest_config: IsolationForestConfig) -> Self {
        Self {
            store,
            z_threshold,
            forests: DashMap::new(),
            forest_config,
        }
    }

    /// Univariate path: invoked by ingest on every accepted reading (§4.3).
    pub fn on_reading(&self, station_id: &str, metric: MetricKind, value: f64) -> Option<Anomaly> {
        zscore::detect(&self.store, station_id, metric, value, self.z_threshold)
    }

    /// Refit the multivariate Isolation Forest for a station from `metrics`'
    /// most recent values across the rolling store (one row per historical
    /// alignment index is not attempted here: the forest is fit directly
    /// over the per-metric recent-value vectors supplied by the caller,
    /// which is responsible for assembling aligned feature rows from the
    /// station's rolling windows).
    pub fn refit_station(&self, station_id: &str, feature_rows: &[Vec<f64>], seed: u64) {
        if let Some(forest) = IsolationForest::fit(feature_rows, self.forest_config, seed) {
            self.forests.insert(station_id.to_string(), Arc::new(forest));
        }
    }

    /// Score a feature vector against the station's last-fitted forest, if any.
    pub fn score_multivariate(&self, station_id: &str, features: &[f64]) -> Option<f64> {
        self.forests.get(station_id).map(|f| f.score(features))
    }

    pub fn is_multivariate_anomaly(&self, station_id: &str, features: &[f64]) -> Option<bool> {
        self.forests.get(station_id).map(|f| f.is_anomaly(features))
    }

    pub fn store(&self) -> &RollingStore {
        &self.store
    }
}

/// Trend analysis over a station's rolling window for a given metric,
/// retention-bounded as of `now` (§4.6).
pub fn trend_for(
    store: &RollingStore,
    station_id: &str,
    metric: MetricKind,
    now: DateTime<Utc>,
) -> Option<station_common::TrendAnalysis> {
    let samples = store.recent(station_id, metric, now);
    trend::analyze(&samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn detector_emits_univariate_anomaly_after_spike() {
        let detector = AnomalyDetector::new(
            RollingStore::new(1000, 7),
            3.0,
            IsolationForestConfig::default(),
        );
        let now = Utc::now();
        for i in 0..50 {
            let v = 20.0 + (i as f64) * (20.0 / 49.0);
            detector.store().push("S1", MetricKind::CpuUsage, now + Duration::seconds(i), v);
            detector.on_reading("S1", MetricKind::CpuUsage, v);
        }
        let anomaly = detector.on_reading("S1", MetricKind::CpuUsage, 95.0);
        assert!(anomaly.is_some());
    }

    #[test]
    fn multivariate_score_reflects_fitted_forest() {
        let detector = AnomalyDetector::new(
            RollingStore::new(1000, 7),
            3.0,
            IsolationForestConfig {
                sample_size: 64,
                contamination: 0.05,
                num_trees: 30,
            },
        );
        let rows: Vec<Vec<f64>> = (0..200).map(|i| vec![(i % 10) as f64, ((i * 3) % 7) as f64]).collect();
        detector.refit_station("S1", &rows, 1);
        assert!(detector.score_multivariate("S1", &[5.0, 3.0]).is_some());
        assert!(detector.score_multivariate("S2", &[5.0, 3.0]).is_none());
    }
}
