//! Alarm correlation pipeline (§4.8): temporal DBSCAN, spatial grouping,
//! causal rules, pattern-learning override, and suppression.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use station_common::{Alarm, AlarmCluster, CorrelationType};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::dbscan;
use crate::pattern::PatternStore;

/// Fixed `(cause_type, effect_type)` rule table (§4.8 step 3). The first
/// matching rule — cause present in the cluster alongside one of its listed
/// effects — sets the cluster's root cause.
const CAUSAL_RULES: &[(&str, &[&str])] = &[
    (
        "POWER_FAILURE",
        &["TEMPERATURE_HIGH", "FAN_FAILURE", "SIGNAL_LOSS", "BATTERY_LOW", "SERVICE_DOWN"],
    ),
    ("FAN_FAILURE", &["TEMPERATURE_HIGH", "THERMAL_SHUTDOWN"]),
    ("SIGNAL_LOSS", &["HANDOVER_FAILURE", "DROPPED_CALLS"]),
    ("HARDWARE_FAULT", &["SERVICE_DEGRADED", "PACKET_LOSS"]),
    ("CONFIG_ERROR", &["SERVICE_DEGRADED", "PARAMETER_MISMATCH"]),
    ("FIBER_CUT", &["SIGNAL_LOSS", "SERVICE_DOWN"]),
];

fn recommended_action_for(cause: &str) -> String {
    match cause {
        "POWER_FAILURE" => "dispatch field technician to restore power; verify backup battery".to_string(),
        "FAN_FAILURE" => "schedule fan replacement; monitor temperature closely".to_string(),
        "SIGNAL_LOSS" => "inspect RF feeder and antenna alignment".to_string(),
        "HARDWARE_FAULT" => "schedule hardware diagnostic and replacement".to_string(),
        "CONFIG_ERROR" => "review and revert recent configuration change".to_string(),
        "FIBER_CUT" => "dispatch fiber repair crew; activate failover transport".to_string(),
        other => format!("investigate root alarm: {other}"),
    }
}

/// Result of `AlarmCorrelator::correlate` (§4.8 Output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub clusters: Vec<AlarmCluster>,
    pub uncorrelated: Vec<Alarm>,
    pub total_alarms: usize,
    pub suppression_count: usize,
    pub processing_time_ms: u64,
}

impl CorrelationResult {
    /// `1 - (clusters + uncorrelated) / total` (§4.8 Output).
    pub fn reduction_ratio(&self) -> f64 {
        if self.total_alarms == 0 {
            return 0.0;
        }
        1.0 - (self.clusters.len() + self.uncorrelated.len()) as f64 / self.total_alarms as f64
    }
}

pub struct AlarmCorrelator {
    dbscan_eps_seconds: f64,
    dbscan_min_points: usize,
    suppression_confidence_threshold: f64,
    patterns: PatternStore,
}

impl AlarmCorrelator {
    pub fn new(dbscan_eps_seconds: f64, dbscan_min_points: usize, suppression_confidence_threshold: f64) -> Self {
        Self {
            dbscan_eps_seconds,
            dbscan_min_points,
            suppression_confidence_threshold,
            patterns: PatternStore::new(),
        }
    }

    pub fn patterns(&self) -> &PatternStore {
        &self.patterns
    }

    /// Feed back a confirmed resolution (e.g. from the healing orchestrator's
    /// completion channel) to reinforce the learned-pattern table.
    pub fn reinforce(&self, cluster: &AlarmCluster, confirmed_root_cause: &str, action: Option<String>) {
        let key = pattern_key(&cluster.alarms);
        self.patterns.reinforce(&key, confirmed_root_cause, 0.95, action);
    }

    pub fn correlate(&self, alarms: Vec<Alarm>) -> CorrelationResult {
        let start = Utc::now();
        let total_alarms = alarms.len();

        if alarms.is_empty() {
            return CorrelationResult {
                clusters: vec![],
                uncorrelated: vec![],
                total_alarms: 0,
                suppression_count: 0,
                processing_time_ms: 0,
            };
        }

        let mut sorted = alarms;
        sorted.sort_by_key(|a| a.timestamp);
        let earliest = sorted[0].timestamp;
        let offsets: Vec<f64> = sorted
            .iter()
            .map(|a| (a.timestamp - earliest).num_milliseconds() as f64 / 1000.0)
            .collect();

        let temporal_labels = dbscan::cluster(&offsets, self.dbscan_eps_seconds, self.dbscan_min_points);

        let mut temporal_groups: BTreeMap<usize, Vec<Alarm>> = BTreeMap::new();
        for (alarm, label) in sorted.into_iter().zip(temporal_labels.into_iter()) {
            temporal_groups.entry(label).or_default().push(alarm);
        }

        let mut clusters = Vec::new();
        let mut uncorrelated = Vec::new();
        let mut suppression_count = 0usize;

        for (_, group) in temporal_groups {
            // Spatial grouping: split each temporal cluster by station_id (§4.8 step 2).
            let mut by_station: BTreeMap<String, Vec<Alarm>> = BTreeMap::new();
            for alarm in group {
                by_station.entry(alarm.station_id.clone()).or_default().push(alarm);
            }

            for (_, station_alarms) in by_station {
                if station_alarms.len() < 2 {
                    uncorrelated.extend(station_alarms);
                    continue;
                }

                let mut correlation_types = vec![CorrelationType::Temporal, CorrelationType::Spatial];
                let (mut root_cause, mut confidence, mut action) =
                    self.causal_root_cause(&station_alarms);
                if root_cause.is_some() {
                    correlation_types.push(CorrelationType::Causal);
                }

                let key = pattern_key(&station_alarms);
                if let Some(learned) = self.patterns.lookup(&key) {
                    root_cause = Some(learned.root_cause.clone());
                    confidence = learned.confidence;
                    action = learned.action.clone();
                    correlation_types.push(CorrelationType::Pattern);
                }

                let mut suppressed = false;
                let mut station_alarms = station_alarms;
                if confidence > self.suppression_confidence_threshold {
                    if let Some(ref cause) = root_cause {
                        for alarm in station_alarms.iter_mut() {
                            if &alarm.alarm_type != cause {
                                alarm.suppress();
                                suppressed = true;
                                suppression_count += 1;
                            }
                        }
                    }
                }

                clusters.push(AlarmCluster {
                    cluster_id: Uuid::new_v4(),
                    alarms: station_alarms,
                    correlation_types,
                    root_cause,
                    root_cause_confidence: confidence,
                    recommended_action: action,
                    suppressed,
                    created_at: start,
                });
            }
        }

        let elapsed = Utc::now() - start;
        CorrelationResult {
            clusters,
            uncorrelated,
            total_alarms,
            suppression_count,
            processing_time_ms: elapsed.num_milliseconds().max(0) as u64,
        }
    }

    /// Scan the fixed causal rule table; first match wins. Falls back to the
    /// earliest alarm's type with confidence 0.6 (§4.8 step 3).
    fn causal_root_cause(&self, alarms: &[Alarm]) -> (Option<String>, f64, Option<String>) {
        let types: Vec<&str> = alarms.iter().map(|a| a.alarm_type.as_str()).collect();
        for &(cause, effects) in CAUSAL_RULES {
            if types.contains(&cause) && effects.iter().any(|e| types.contains(e)) {
                return (Some(cause.to_string()), 0.9, Some(recommended_action_for(cause)));
            }
        }
        let earliest_type = alarms
            .iter()
            .min_by_key(|a| a.timestamp)
            .map(|a| a.alarm_type.clone());
        (earliest_type, 0.6, None)
    }
}

fn pattern_key(alarms: &[Alarm]) -> String {
    let mut types: Vec<&str> = alarms.iter().map(|a| a.alarm_type.as_str()).collect();
    types.sort_unstable();
    types.join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use station_common::AlarmSeverity;

    fn alarm(station: &str, alarm_type: &str, severity: AlarmSeverity, t: chrono::DateTime<Utc>) -> Alarm {
        Alarm {
            alarm_id: Uuid::new_v4(),
            station_id: station.to_string(),
            alarm_type: alarm_type.to_string(),
            severity,
            timestamp: t,
            message: format!("{alarm_type} on {station}"),
            metric: None,
            value: None,
            cleared: false,
            cleared_at: None,
            acknowledged: false,
            suppressed: false,
        }
    }

    /// Scenario C (§8).
    #[test]
    fn power_failure_cluster_suppresses_downstream_alarms() {
        let correlator = AlarmCorrelator::new(60.0, 2, 0.7);
        let t0 = Utc::now();
        let alarms = vec![
            alarm("S2", "POWER_FAILURE", AlarmSeverity::Critical, t0),
            alarm("S2", "TEMPERATURE_HIGH", AlarmSeverity::Major, t0 + Duration::seconds(5)),
            alarm("S2", "FAN_FAILURE", AlarmSeverity::Major, t0 + Duration::seconds(10)),
            alarm("S2", "SIGNAL_LOSS", AlarmSeverity::Major, t0 + Duration::seconds(15)),
        ];

        let result = correlator.correlate(alarms);
        assert_eq!(result.clusters.len(), 1);
        let cluster = &result.clusters[0];
        assert_eq!(cluster.root_cause.as_deref(), Some("POWER_FAILURE"));
        assert!(cluster.root_cause_confidence >= 0.9);
        assert!(cluster.suppressed);
        assert_eq!(result.suppression_count, 3);
        assert!(result.clusters.len() + result.uncorrelated.len() <= result.total_alarms);
    }

    #[test]
    fn unrelated_singleton_alarms_are_uncorrelated() {
        let correlator = AlarmCorrelator::new(60.0, 2, 0.7);
        let t0 = Utc::now();
        let alarms = vec![
            alarm("S1", "LINK_FLAP", AlarmSeverity::Warning, t0),
            alarm("S2", "LINK_FLAP", AlarmSeverity::Warning, t0 + Duration::hours(2)),
        ];
        let result = correlator.correlate(alarms);
        assert_eq!(result.clusters.len(), 0);
        assert_eq!(result.uncorrelated.len(), 2);
    }

    #[test]
    fn empty_input_yields_empty_result() {
        let correlator = AlarmCorrelator::new(60.0, 2, 0.7);
        let result = correlator.correlate(vec![]);
        assert_eq!(result.total_alarms, 0);
        assert_eq!(result.reduction_ratio(), 0.0);
    }

    #[test]
    fn pattern_learning_overrides_causal_rule() {
        let correlator = AlarmCorrelator::new(60.0, 2, 0.7);
        let t0 = Utc::now();
        let alarms = vec![
            alarm("S3", "UNKNOWN_A", AlarmSeverity::Major, t0),
            alarm("S3", "UNKNOWN_B", AlarmSeverity::Major, t0 + Duration::seconds(5)),
        ];
        correlator.patterns.reinforce("UNKNOWN_A|UNKNOWN_B", "UNKNOWN_A", 0.95, Some("known fix".to_string()));

        let result = correlator.correlate(alarms);
        let cluster = &result.clusters[0];
        assert_eq!(cluster.root_cause.as_deref(), Some("UNKNOWN_A"));
        assert!(cluster.correlation_types.contains(&CorrelationType::Pattern));
        assert_eq!(cluster.recommended_action.as_deref(), Some("known fix"));
    }
}
