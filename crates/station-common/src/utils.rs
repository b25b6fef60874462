//! Small helpers shared across crates: id/timestamp generation, id
//! validation, and percentile calculation for telemetry summaries.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub fn new_id() -> Uuid {
    Uuid::new_v4()
}

pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Station ids arrive from devices and must be safe to use as map keys and
/// log fields without further escaping.
pub fn validate_station_id(station_id: &str) -> bool {
    !station_id.is_empty()
        && station_id.len() <= 128
        && station_id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

/// Nearest-rank percentile over a copy of `latencies`; used by telemetry
/// summaries (p95/p99 action durations).
pub fn calculate_percentile(mut values: Vec<u64>, percentile: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.sort_unstable();
    let index = ((values.len() as f64 * percentile / 100.0) - 1.0).max(0.0) as usize;
    values[index.min(values.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn station_id_validation() {
        assert!(validate_station_id("station-001"));
        assert!(!validate_station_id(""));
        assert!(!validate_station_id("station 001"));
    }

    #[test]
    fn percentile_picks_nearest_rank() {
        let latencies = vec![100, 200, 300, 400, 500];
        assert_eq!(calculate_percentile(latencies.clone(), 50.0), 200);
        assert_eq!(calculate_percentile(latencies, 95.0), 400);
        assert_eq!(calculate_percentile(vec![], 95.0), 0);
    }
}
