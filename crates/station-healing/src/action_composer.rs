//! Action composer (§4.10): maps analyzer outputs to `HealingAction`s using
//! fixed tables, deciding `auto_execute` per source.

use chrono::Utc;
use station_common::{
    ActionKind, ActionSource, Component, ComponentPrediction, HealingAction, RcaResult, Risk,
    RollbackSpec,
};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

fn component_action(component: Component) -> (ActionKind, Risk) {
    use Component::*;
    match component {
        CoolingFan => (ActionKind::ServiceRestart, Risk::Medium),
        ThermalSystem => (ActionKind::LoadBalance, Risk::Medium),
        PowerSupply => (ActionKind::PowerCycle, Risk::High),
        BatterySystem => (ActionKind::AlarmSuppress, Risk::Low),
        FiberTransport => (ActionKind::TrafficRedirect, Risk::Medium),
    }
}

fn rca_action(event_type: &str) -> (ActionKind, Risk) {
    match event_type {
        "POWER_FAILURE" => (ActionKind::Failover, Risk::High),
        "FAN_FAILURE" => (ActionKind::ServiceRestart, Risk::Medium),
        "SIGNAL_LOSS" => (ActionKind::TrafficRedirect, Risk::Medium),
        "HARDWARE_FAULT" => (ActionKind::Failover, Risk::High),
        "CONFIG_ERROR" => (ActionKind::ParameterChange, Risk::Low),
        "FIBER_CUT" => (ActionKind::TrafficRedirect, Risk::High),
        _ => (ActionKind::AlarmSuppress, Risk::Medium),
    }
}

/// An AI-generated remediation payload (external collaborator, §1, §4.10).
/// The composer trusts and respects the caller-supplied risk and confidence
/// rather than deriving them from a fixed table.
#[derive(Debug, Clone)]
pub struct AiSolution {
    pub station_id: String,
    pub source_id: String,
    pub kind: ActionKind,
    pub risk_level: Risk,
    pub confidence: f64,
    pub description: String,
    pub parameters: HashMap<String, String>,
    pub rollback: Option<RollbackSpec>,
}

pub struct ActionComposer {
    default_timeout: Duration,
}

impl ActionComposer {
    pub fn new(default_timeout_seconds: u64) -> Self {
        Self {
            default_timeout: Duration::from_secs(default_timeout_seconds),
        }
    }

    /// From a predictor output (§4.10): auto-execute only when `risk ==
    /// LOW && probability > 0.7`.
    pub fn from_prediction(&self, prediction: &ComponentPrediction) -> HealingAction {
        let (kind, risk) = component_action(prediction.component);
        let auto_execute = risk == Risk::Low && prediction.probability > 0.7;

        let mut parameters = HashMap::new();
        parameters.insert("component".to_string(), format!("{:?}", prediction.component));
        parameters.insert("current_health".to_string(), format!("{:?}", prediction.current_health));

        HealingAction {
            id: Uuid::new_v4(),
            station_id: prediction.station_id.clone(),
            kind,
            parameters,
            description: prediction.recommended_action.clone(),
            risk,
            source: ActionSource::Predictive,
            source_id: format!("{:?}", prediction.component),
            auto_execute,
            timeout: self.default_timeout,
            rollback: None,
            created_at: Utc::now(),
        }
    }

    /// From an RCA result (§4.10): auto-execute when `risk in {LOW, MEDIUM}`.
    pub fn from_rca(&self, rca: &RcaResult) -> HealingAction {
        let (kind, risk) = rca_action(&rca.root_cause.event_type);
        let auto_execute = matches!(risk, Risk::Low | Risk::Medium);

        let mut parameters = HashMap::new();
        parameters.insert("root_cause".to_string(), rca.root_cause.event_type.clone());
        parameters.insert("confidence".to_string(), rca.confidence.to_string());

        HealingAction {
            id: Uuid::new_v4(),
            station_id: rca.root_cause.station_id.clone(),
            kind,
            parameters,
            description: rca
                .recommended_action
                .clone()
                .unwrap_or_else(|| format!("remediate {}", rca.root_cause.event_type)),
            risk,
            source: ActionSource::Rca,
            source_id: rca.root_cause.event_id.to_string(),
            auto_execute,
            timeout: self.default_timeout,
            rollback: None,
            created_at: Utc::now(),
        }
    }

    /// From an AI solution payload (§4.10): auto-execute only if `risk in
    /// {LOW, MEDIUM} && confidence >= 0.8`.
    pub fn from_ai_solution(&self, solution: &AiSolution) -> HealingAction {
        let auto_execute =
            matches!(solution.risk_level, Risk::Low | Risk::Medium) && solution.confidence >= 0.8;

        HealingAction {
            id: Uuid::new_v4(),
            station_id: solution.station_id.clone(),
            kind: solution.kind,
            parameters: solution.parameters.clone(),
            description: solution.description.clone(),
            risk: solution.risk_level,
            source: ActionSource::Ai,
            source_id: solution.source_id.clone(),
            auto_execute,
            timeout: self.default_timeout,
            rollback: solution.rollback.clone(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use station_common::{CausalEvent, ConfidenceLevel, HealthBand, PredictionConfidence, TrendAnalysis, TrendDirection};

    fn trend() -> TrendAnalysis {
        TrendAnalysis {
            mean: 0.0,
            std: 0.0,
            min: 0.0,
            max: 0.0,
            count: 0,
            slope: 0.0,
            r_squared: 0.0,
            direction: TrendDirection::Stable,
        }
    }

    #[test]
    fn low_risk_high_probability_prediction_auto_executes() {
        let composer = ActionComposer::new(300);
        let prediction = ComponentPrediction {
            component: Component::BatterySystem,
            station_id: "S1".to_string(),
            prediction: "CRITICAL".to_string(),
            confidence: PredictionConfidence::High,
            probability: 0.85,
            eta: None,
            current_health: HealthBand::Critical,
            trend: trend(),
            recommended_action: "schedule battery replacement".to_string(),
            data_points: 50,
            window: 50,
        };
        let action = composer.from_prediction(&prediction);
        assert_eq!(action.risk, Risk::Low);
        assert!(action.auto_execute);
    }

    #[test]
    fn high_risk_prediction_never_auto_executes() {
        let composer = ActionComposer::new(300);
        let prediction = ComponentPrediction {
            component: Component::PowerSupply,
            station_id: "S1".to_string(),
            prediction: "CRITICAL".to_string(),
            confidence: PredictionConfidence::High,
            probability: 0.95,
            eta: None,
            current_health: HealthBand::Critical,
            trend: trend(),
            recommended_action: "URGENT".to_string(),
            data_points: 50,
            window: 50,
        };
        let action = composer.from_prediction(&prediction);
        assert_eq!(action.risk, Risk::High);
        assert!(!action.auto_execute);
    }

    #[test]
    fn rca_medium_risk_auto_executes() {
        let composer = ActionComposer::new(300);
        let event = CausalEvent {
            event_id: Uuid::new_v4(),
            event_type: "FAN_FAILURE".to_string(),
            station_id: "S1".to_string(),
            timestamp: Utc::now(),
            severity: station_common::AlarmSeverity::Major,
            metric: None,
            value: None,
            metadata: HashMap::new(),
        };
        let rca = RcaResult {
            root_cause: event,
            confidence: 0.9,
            confidence_level: ConfidenceLevel::High,
            chain: vec![],
            affected: vec![],
            alternatives: vec![],
            evidence: vec![],
            recommended_action: Some("replace fan".to_string()),
            analysis_time_ms: 1,
        };
        let action = composer.from_rca(&rca);
        assert_eq!(action.risk, Risk::Medium);
        assert!(action.auto_execute);
    }

    #[test]
    fn ai_solution_requires_confidence_floor() {
        let composer = ActionComposer::new(300);
        let solution = AiSolution {
            station_id: "S1".to_string(),
            source_id: "ai-1".to_string(),
            kind: ActionKind::ParameterChange,
            risk_level: Risk::Medium,
            confidence: 0.79,
            description: "tune parameter".to_string(),
            parameters: HashMap::new(),
            rollback: None,
        };
        let action = composer.from_ai_solution(&solution);
        assert!(!action.auto_execute);

        let mut high_confidence = solution;
        high_confidence.confidence = 0.81;
        let action = composer.from_ai_solution(&high_confidence);
        assert!(action.auto_execute);
    }
}
