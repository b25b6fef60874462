//! Core data model (§3): the types that flow between every crate in the
//! workspace. These are plain records with enumerated tags, not dynamic
//! dictionaries — every field the spec calls a tagged sum type is a Rust
//! enum here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

pub type StationId = String;
pub type ActionId = Uuid;
pub type AlarmId = Uuid;
pub type AnomalyId = Uuid;
pub type ClusterId = Uuid;
pub type EventId = Uuid;

/// Metric kinds the ingest path accepts, grouped by domain. Each kind has a
/// declared unit and valid range enforced at ingest (`station-ingest`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    // system
    CpuUsage,
    MemoryUsage,
    Temperature,
    PowerConsumption,
    FanSpeed,
    // RF
    SignalStrength,
    Vswr,
    SinrNr700,
    SinrNr3500,
    RsrpNr700,
    RsrpNr3500,
    // 5G throughput
    DlNr700,
    UlNr700,
    DlNr3500,
    UlNr3500,
    // battery
    BatterySoc,
    BatteryDod,
    BatteryTemp,
    BatteryCycles,
    // fiber
    FiberRxPower,
    FiberTxPower,
    FiberBer,
    FiberOsnr,
    // quality
    LatencyPing,
    TxImbalance,
    HandoverSuccessRate,
}

impl MetricKind {
    /// Declared unit string for the wire protocol and for display.
    pub fn unit(self) -> &'static str {
        use MetricKind::*;
        match self {
            CpuUsage | MemoryUsage | BatterySoc | BatteryDod | HandoverSuccessRate => "percent",
            Temperature | BatteryTemp => "celsius",
            PowerConsumption => "watts",
            FanSpeed => "rpm",
            SignalStrength | RsrpNr700 | RsrpNr3500 | FiberRxPower | FiberTxPower => "dbm",
            Vswr => "ratio",
            SinrNr700 | SinrNr3500 | FiberOsnr => "db",
            DlNr700 | UlNr700 | DlNr3500 | UlNr3500 => "mbps",
            BatteryCycles => "count",
            FiberBer => "ratio",
            LatencyPing => "ms",
            TxImbalance => "db",
        }
    }

    /// Inclusive valid range; readings outside are rejected at ingest.
    pub fn valid_range(self) -> (f64, f64) {
        use MetricKind::*;
        match self {
            CpuUsage | MemoryUsage | BatterySoc | BatteryDod | HandoverSuccessRate => (0.0, 100.0),
            Temperature => (-40.0, 125.0),
            BatteryTemp => (-20.0, 80.0),
            PowerConsumption => (0.0, 10_000.0),
            FanSpeed => (0.0, 10_000.0),
            SignalStrength | RsrpNr700 | RsrpNr3500 => (-140.0, 0.0),
            FiberRxPower | FiberTxPower => (-40.0, 10.0),
            Vswr => (1.0, 50.0),
            SinrNr700 | SinrNr3500 => (-20.0, 40.0),
            FiberOsnr => (0.0, 60.0),
            DlNr700 | UlNr700 | DlNr3500 | UlNr3500 => (0.0, 20_000.0),
            BatteryCycles => (0.0, 100_000.0),
            FiberBer => (0.0, 1.0),
            LatencyPing => (0.0, 60_000.0),
            TxImbalance => (0.0, 20.0),
        }
    }

    /// Stable wire code used by the frame codec's metrics payload.
    pub fn code(self) -> u8 {
        use MetricKind::*;
        match self {
            CpuUsage => 0x01,
            MemoryUsage => 0x02,
            Temperature => 0x03,
            PowerConsumption => 0x04,
            FanSpeed => 0x05,
            SignalStrength => 0x10,
            Vswr => 0x11,
            SinrNr700 => 0x12,
            SinrNr3500 => 0x13,
            RsrpNr700 => 0x14,
            RsrpNr3500 => 0x15,
            DlNr700 => 0x20,
            UlNr700 => 0x21,
            DlNr3500 => 0x22,
            UlNr3500 => 0x23,
            BatterySoc => 0x30,
            BatteryDod => 0x31,
            BatteryTemp => 0x32,
            BatteryCycles => 0x33,
            FiberRxPower => 0x40,
            FiberTxPower => 0x41,
            FiberBer => 0x42,
            FiberOsnr => 0x43,
            LatencyPing => 0x50,
            TxImbalance => 0x51,
            HandoverSuccessRate => 0x52,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        use MetricKind::*;
        Some(match code {
            0x01 => CpuUsage,
            0x02 => MemoryUsage,
            0x03 => Temperature,
            0x04 => PowerConsumption,
            0x05 => FanSpeed,
            0x10 => SignalStrength,
            0x11 => Vswr,
            0x12 => SinrNr700,
            0x13 => SinrNr3500,
            0x14 => RsrpNr700,
            0x15 => RsrpNr3500,
            0x20 => DlNr700,
            0x21 => UlNr700,
            0x22 => DlNr3500,
            0x23 => UlNr3500,
            0x30 => BatterySoc,
            0x31 => BatteryDod,
            0x32 => BatteryTemp,
            0x33 => BatteryCycles,
            0x40 => FiberRxPower,
            0x41 => FiberTxPower,
            0x42 => FiberBer,
            0x43 => FiberOsnr,
            0x50 => LatencyPing,
            0x51 => TxImbalance,
            0x52 => HandoverSuccessRate,
            _ => return None,
        })
    }
}

/// A single, immutable telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    pub station_id: StationId,
    pub metric: MetricKind,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl MetricReading {
    pub fn unit(&self) -> &'static str {
        self.metric.unit()
    }

    pub fn is_in_range(&self) -> bool {
        let (lo, hi) = self.metric.valid_range();
        self.value >= lo && self.value <= hi
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyCategory {
    Performance,
    Rf,
    Power,
    Thermal,
    Battery,
    Fiber,
    Quality,
}

/// Output of the anomaly detector (§4.5). Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: AnomalyId,
    pub station_id: StationId,
    pub detected_at: DateTime<Utc>,
    pub severity: Severity,
    pub category: AnomalyCategory,
    pub score: f64,
    pub affected_metrics: Vec<MetricKind>,
    pub values: HashMap<String, f64>,
    pub expected_range: (f64, f64),
    pub hints: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlarmSeverity {
    Info,
    Warning,
    Minor,
    Major,
    Critical,
}

/// An alarm, as reported by a device or synthesized by the predictor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alarm {
    pub alarm_id: AlarmId,
    pub station_id: StationId,
    pub alarm_type: String,
    pub severity: AlarmSeverity,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub metric: Option<MetricKind>,
    pub value: Option<f64>,
    pub cleared: bool,
    pub cleared_at: Option<DateTime<Utc>>,
    pub acknowledged: bool,
    /// Set by the alarm correlator (§4.8 step 5) when this alarm is a
    /// non-root-cause member of a cluster whose root cause confidence
    /// exceeded the suppression threshold. Not part of the minimal §3 entity
    /// list but required for step 5 to mark individual alarms rather than
    /// only the cluster as a whole.
    pub suppressed: bool,
}

impl Alarm {
    /// Clearing is monotonic: `cleared_at` is set and never precedes `timestamp`.
    pub fn clear(&mut self, at: DateTime<Utc>) {
        debug_assert!(at >= self.timestamp);
        self.cleared = true;
        self.cleared_at = Some(at);
    }

    /// Acknowledgement only ever flips false -> true.
    pub fn acknowledge(&mut self) {
        self.acknowledged = true;
    }

    pub fn suppress(&mut self) {
        self.suppressed = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorrelationType {
    Temporal,
    Spatial,
    Causal,
    Pattern,
}

/// A group of alarms the correlator believes share a root cause (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmCluster {
    pub cluster_id: ClusterId,
    pub alarms: Vec<Alarm>,
    pub correlation_types: Vec<CorrelationType>,
    pub root_cause: Option<String>,
    pub root_cause_confidence: f64,
    pub recommended_action: Option<String>,
    pub suppressed: bool,
    pub created_at: DateTime<Utc>,
}

impl AlarmCluster {
    /// Derived severity: the maximum severity among member alarms.
    pub fn severity(&self) -> Option<AlarmSeverity> {
        self.alarms.iter().map(|a| a.severity).max()
    }

    pub fn station_ids(&self) -> Vec<StationId> {
        let mut ids: Vec<StationId> = self
            .alarms
            .iter()
            .map(|a| a.station_id.clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        ids.sort();
        ids
    }
}

/// Generalized event carrying the facts RCA reasons over. May be derived
/// from an alarm cluster or supplied directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub station_id: StationId,
    pub timestamp: DateTime<Utc>,
    pub severity: AlarmSeverity,
    pub metric: Option<MetricKind>,
    pub value: Option<f64>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CausalRelation {
    Direct,
    Indirect,
    CommonCause,
    Correlation,
}

/// Directed edge `(cause, effect)`. Invariant: `cause.timestamp < effect.timestamp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalLink {
    pub cause: CausalEvent,
    pub effect: CausalEvent,
    pub relation: CausalRelation,
    pub confidence: f64,
    pub time_lag_seconds: f64,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > 0.85 {
            ConfidenceLevel::High
        } else if confidence > 0.6 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// Result of root-cause analysis (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RcaResult {
    pub root_cause: CausalEvent,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub chain: Vec<CausalLink>,
    pub affected: Vec<CausalEvent>,
    pub alternatives: Vec<(CausalEvent, f64)>,
    pub evidence: Vec<String>,
    pub recommended_action: Option<String>,
    pub analysis_time_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
    CoolingFan,
    ThermalSystem,
    PowerSupply,
    BatterySystem,
    FiberTransport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionConfidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthBand {
    Healthy,
    Degraded,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Stable,
    Increasing,
    Decreasing,
    Erratic,
}

/// Output of the trend analyzer (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
    pub slope: f64,
    pub r_squared: f64,
    pub direction: TrendDirection,
}

/// Output of the predictor (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentPrediction {
    pub component: Component,
    pub station_id: StationId,
    pub prediction: String,
    pub confidence: PredictionConfidence,
    pub probability: f64,
    pub eta: Option<Duration>,
    pub current_health: HealthBand,
    pub trend: TrendAnalysis,
    pub recommended_action: String,
    pub data_points: usize,
    pub window: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Risk {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    ParameterChange,
    ServiceRestart,
    LoadBalance,
    PowerCycle,
    Failover,
    TrafficRedirect,
    AlarmSuppress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionSource {
    Son,
    Rca,
    Predictive,
    Ai,
}

/// A rollback descriptor: what to do, and with what parameters, if the
/// forward action fails and a rollback is declared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackSpec {
    pub kind: ActionKind,
    pub parameters: HashMap<String, String>,
}

/// A remediation the action composer produced and submitted to the
/// orchestrator (§4.10, §4.11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingAction {
    pub id: ActionId,
    pub station_id: StationId,
    pub kind: ActionKind,
    pub parameters: HashMap<String, String>,
    pub description: String,
    pub risk: Risk,
    pub source: ActionSource,
    pub source_id: String,
    pub auto_execute: bool,
    pub timeout: Duration,
    pub rollback: Option<RollbackSpec>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Pending,
    Executing,
    Success,
    Failed,
    RolledBack,
    Timeout,
}

impl ExecutionStatus {
    /// Once an action reaches one of these, its status never changes again (§8 invariant 10).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success
                | ExecutionStatus::Failed
                | ExecutionStatus::RolledBack
                | ExecutionStatus::Timeout
        )
    }

    /// Whether `self -> next` is a lawful transition per §4.11's state machine.
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Executing)
                | (Executing, Success)
                | (Executing, Failed)
                | (Executing, Timeout)
                | (Failed, RolledBack)
                | (Timeout, RolledBack)
        )
    }
}

/// Outcome of executing (or attempting to execute) a `HealingAction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub action_id: ActionId,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub metrics_before: Option<HashMap<String, f64>>,
    pub metrics_after: Option<HashMap<String, f64>>,
    pub rollback_performed: bool,
}

/// Aggregate per-station health, returned by `station_health_report` (§6).
/// Not part of the minimal §3 entity list but required to give that façade
/// call a concrete return type: one `ComponentPrediction` per component that
/// had enough data to predict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationHealthReport {
    pub station_id: StationId,
    pub generated_at: DateTime<Utc>,
    pub predictions: Vec<ComponentPrediction>,
    pub overall: HealthBand,
}

impl StationHealthReport {
    /// Overall band is the worst band among component predictions; `Healthy`
    /// if there were none to assess.
    pub fn overall_from(predictions: &[ComponentPrediction]) -> HealthBand {
        predictions
            .iter()
            .map(|p| p.current_health)
            .max_by_key(health_band_rank)
            .unwrap_or(HealthBand::Healthy)
    }
}

fn health_band_rank(band: &HealthBand) -> u8 {
    match band {
        HealthBand::Healthy => 0,
        HealthBand::Degraded => 1,
        HealthBand::Warning => 2,
        HealthBand::Critical => 3,
    }
}

/// Per-connection device session state (§3, §4.2).
#[derive(Debug, Clone)]
pub struct DeviceSessionInfo {
    pub remote: std::net::SocketAddr,
    pub connected_at: DateTime<Utc>,
    pub last_rx: Option<DateTime<Utc>>,
    pub last_tx: Option<DateTime<Utc>>,
    pub sequence_counter: u8,
    pub crc_errors: u64,
    pub streaming: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_kind_code_roundtrips() {
        for kind in [
            MetricKind::CpuUsage,
            MetricKind::FanSpeed,
            MetricKind::BatterySoc,
            MetricKind::FiberOsnr,
            MetricKind::HandoverSuccessRate,
        ] {
            assert_eq!(MetricKind::from_code(kind.code()), Some(kind));
        }
    }

    #[test]
    fn execution_status_terminal_transitions_are_final() {
        assert!(ExecutionStatus::Success.is_terminal());
        assert!(!ExecutionStatus::Pending.can_transition_to(ExecutionStatus::Success));
        assert!(ExecutionStatus::Pending.can_transition_to(ExecutionStatus::Executing));
        assert!(ExecutionStatus::Failed.can_transition_to(ExecutionStatus::RolledBack));
        assert!(!ExecutionStatus::Success.can_transition_to(ExecutionStatus::RolledBack));
    }

    #[test]
    fn confidence_level_bands() {
        assert_eq!(ConfidenceLevel::from_confidence(0.9), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_confidence(0.7), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_confidence(0.3), ConfidenceLevel::Low);
    }
}
