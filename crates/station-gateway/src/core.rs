//! `StationCore`: the façade that composes ingest, analytics, correlation,
//! RCA, and self-healing behind the nine Core API operations named in §6.
//! Device sessions and the HTTP-free wire protocol call through here; none
//! of those crates are reachable directly from `session.rs`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use station_analytics::{predictor, AnomalyDetector};
use station_common::metrics::{ACTIONS_TOTAL, ANOMALIES_TOTAL, RCA_DURATION_SECONDS};
use station_common::{
    Alarm, CausalEvent, Component, ComponentPrediction, Config, ExecutionStatus, HealingAction,
    MetricReading, RcaResult, Result, StationHealthReport,
};
use station_correlator::{AlarmCorrelator, CorrelationResult, RcaEngine};
use station_healing::{ActionComposer, HealingOrchestrator, SubmitResponse};
use station_ingest::{IngestOutcome, MetricIngest, RollingStore};
use tracing::instrument;
use uuid::Uuid;

/// All five predictable components, in a fixed order so
/// `station_health_report` output is deterministic.
const ALL_COMPONENTS: [Component; 5] = [
    Component::CoolingFan,
    Component::ThermalSystem,
    Component::PowerSupply,
    Component::BatterySystem,
    Component::FiberTransport,
];

pub struct StationCore {
    ingest: MetricIngest,
    detector: AnomalyDetector,
    correlator: AlarmCorrelator,
    rca: RcaEngine,
    pub composer: ActionComposer,
    pub orchestrator: HealingOrchestrator,
    predictor_window: usize,
    /// Alarms accepted via `ingest_alarm` awaiting a batch `correlate_alarms`
    /// call, keyed by station (§6: `ingest_alarm(alarm)` is a distinct
    /// operation from `correlate(alarms)`, which still takes an explicit
    /// batch so callers that already have one can bypass buffering).
    pending_alarms: DashMap<String, Vec<Alarm>>,
}

impl StationCore {
    pub fn new(config: &Config) -> Self {
        let store = RollingStore::new(config.ingest.rolling_window_capacity, config.ingest.retention_days);
        let detector_store = store.clone();
        let ingest = MetricIngest::new(store);
        let detector = AnomalyDetector::new(detector_store, config.analytics.z_threshold, config.analytics.isolation_forest.clone());
        let correlator = AlarmCorrelator::new(
            config.correlator.dbscan_eps_seconds,
            config.correlator.dbscan_min_points,
            config.correlator.suppression_confidence_threshold,
        );
        let rca = RcaEngine::new();
        let composer = ActionComposer::new(config.healing.default_action_timeout_seconds);
        let orchestrator = HealingOrchestrator::new(
            config.healing.max_concurrent_per_station,
            config.healing.default_action_timeout_seconds,
            config.healing.result_history_capacity,
        );
        Self {
            ingest,
            detector,
            correlator,
            rca,
            composer,
            orchestrator,
            predictor_window: config.analytics.min_data_points,
            pending_alarms: DashMap::new(),
        }
    }

    /// Buffer a single alarm for the next `correlate_alarms` call against
    /// its station (§6). Distinct from `correlate_alarms`, which still
    /// accepts an explicit batch.
    #[instrument(skip(self, alarm), fields(station_id = %alarm.station_id, alarm_id = %alarm.alarm_id))]
    pub fn ingest_alarm(&self, alarm: Alarm) {
        self.pending_alarms.entry(alarm.station_id.clone()).or_default().push(alarm);
    }

    /// Drain and correlate every alarm buffered via `ingest_alarm` for one
    /// station since the last drain.
    #[instrument(skip(self), fields(station_id = %station_id))]
    pub fn correlate_pending(&self, station_id: &str) -> CorrelationResult {
        let alarms = self.pending_alarms.remove(station_id).map(|(_, v)| v).unwrap_or_default();
        self.correlator.correlate(alarms)
    }

    /// 1. Ingest a metric reading; feeds the rolling store and the
    /// univariate anomaly detector in the same call (§4.3, §4.5).
    #[instrument(skip(self, reading), fields(station_id = %reading.station_id))]
    pub fn ingest_metric(&self, reading: &MetricReading) -> Result<IngestOutcome> {
        let outcome = self.ingest.ingest(reading)?;
        if let Some(anomaly) = self.detector.on_reading(&reading.station_id, reading.metric, reading.value) {
            ANOMALIES_TOTAL.with_label_values(&[severity_label(anomaly.severity)]).inc();
        }
        Ok(outcome)
    }

    /// 2a. Correlate a batch of alarms into clusters (§4.8).
    #[instrument(skip(self, alarms), fields(count = alarms.len()))]
    pub fn correlate_alarms(&self, alarms: Vec<Alarm>) -> CorrelationResult {
        self.correlator.correlate(alarms)
    }

    /// 3. Root-cause analysis over a batch of causal events (§4.9).
    #[instrument(skip(self, events), fields(count = events.len()))]
    pub fn analyze_rca(&self, events: Vec<CausalEvent>) -> Option<RcaResult> {
        let started = std::time::Instant::now();
        let result = self.rca.analyze(events);
        let outcome = if result.is_some() { "found" } else { "none" };
        RCA_DURATION_SECONDS.with_label_values(&[outcome]).observe(started.elapsed().as_secs_f64());
        result
    }

    /// 4. Predict a single component's health for one station (§4.7).
    #[instrument(skip(self), fields(station_id = %station_id, component = ?component))]
    pub fn predict_component(&self, component: Component, station_id: &str, now: DateTime<Utc>) -> Option<ComponentPrediction> {
        predictor::predict(component, self.detector.store(), station_id, now, self.predictor_window)
    }

    /// 5. Aggregate health across every predictable component (§6).
    #[instrument(skip(self), fields(station_id = %station_id))]
    pub fn station_health_report(&self, station_id: &str, now: DateTime<Utc>) -> StationHealthReport {
        let predictions: Vec<ComponentPrediction> = ALL_COMPONENTS
            .iter()
            .filter_map(|&component| self.predict_component(component, station_id, now))
            .collect();
        let overall = StationHealthReport::overall_from(&predictions);
        StationHealthReport {
            station_id: station_id.to_string(),
            generated_at: now,
            predictions,
            overall,
        }
    }

    /// 6. Submit a healing action for execution or approval (§4.10, §4.11).
    #[instrument(skip(self, action), fields(station_id = %action.station_id, action_id = %action.id))]
    pub fn submit_action(&self, action: HealingAction) -> SubmitResponse {
        self.orchestrator.submit(action)
    }

    /// 7. Approve a pending action awaiting manual sign-off.
    #[instrument(skip(self), fields(action_id = %action_id))]
    pub fn approve_action(&self, action_id: Uuid, approver: &str) -> bool {
        self.orchestrator.approve_action(action_id, approver)
    }

    /// 8. Cancel a pending action before it executes.
    #[instrument(skip(self), fields(action_id = %action_id))]
    pub fn cancel_action(&self, action_id: Uuid, reason: &str) -> bool {
        self.orchestrator.cancel_action(action_id, reason)
    }

    /// 9. Read recent execution history, optionally scoped to one station.
    pub fn execution_history(&self, station_id: Option<&str>, limit: usize) -> Vec<station_common::ExecutionResult> {
        self.orchestrator.execution_history(station_id, limit)
    }

    /// Drive the orchestrator's pending/executing queues forward one tick;
    /// called on `config.healing.tick_interval_ms` by the gateway binary.
    /// Newly-terminal results are counted into `station_actions_total` here
    /// rather than inside the orchestrator, which has no metrics dependency.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<station_common::ExecutionResult> {
        let completed = self.orchestrator.tick(now).await;
        for result in &completed {
            ACTIONS_TOTAL.with_label_values(&[status_label(result.status)]).inc();
        }
        completed
    }
}

fn severity_label(severity: station_common::Severity) -> &'static str {
    use station_common::Severity::*;
    match severity {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

fn status_label(status: ExecutionStatus) -> &'static str {
    use ExecutionStatus::*;
    match status {
        Pending => "pending",
        Executing => "executing",
        Success => "success",
        Failed => "failed",
        RolledBack => "rolled_back",
        Timeout => "timeout",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use station_common::{AlarmSeverity, Config};

    fn alarm(station_id: &str, alarm_type: &str) -> Alarm {
        Alarm {
            alarm_id: Uuid::new_v4(),
            station_id: station_id.to_string(),
            alarm_type: alarm_type.to_string(),
            severity: AlarmSeverity::Major,
            timestamp: Utc::now(),
            message: "test".to_string(),
            metric: None,
            value: None,
            cleared: false,
            cleared_at: None,
            acknowledged: false,
            suppressed: false,
        }
    }

    #[test]
    fn ingest_alarm_buffers_per_station_for_correlate_pending() {
        let core = StationCore::new(&Config::default());
        core.ingest_alarm(alarm("S1", "POWER_FAILURE"));
        core.ingest_alarm(alarm("S1", "TEMPERATURE_HIGH"));
        core.ingest_alarm(alarm("S2", "CONFIG_ERROR"));

        let result = core.correlate_pending("S1");
        assert_eq!(result.total_alarms, 2);

        // draining S1 doesn't touch S2's buffer, and a station with no
        // buffered alarms correlates an empty batch rather than erroring.
        let s2 = core.correlate_pending("S2");
        assert_eq!(s2.total_alarms, 1);
        let drained_again = core.correlate_pending("S1");
        assert_eq!(drained_again.total_alarms, 0);
    }
}
