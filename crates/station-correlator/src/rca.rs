//! Root-cause analysis engine (§4.9).

use chrono::Utc;
use station_common::{CausalEvent, CausalLink, CausalRelation, ConfidenceLevel, RcaResult};

use crate::pattern::PatternStore;

/// Fixed domain rules: `(cause_type, effect_type, max_lag_seconds)` (§4.9 step 2).
const DOMAIN_RULES: &[(&str, &str, f64)] = &[
    ("POWER_FAILURE", "TEMPERATURE_HIGH", 300.0),
    ("POWER_FAILURE", "FAN_FAILURE", 300.0),
    ("POWER_FAILURE", "SIGNAL_LOSS", 300.0),
    ("POWER_FAILURE", "BATTERY_LOW", 300.0),
    ("FAN_FAILURE", "TEMPERATURE_HIGH", 600.0),
    ("FAN_FAILURE", "THERMAL_SHUTDOWN", 900.0),
    ("SIGNAL_LOSS", "HANDOVER_FAILURE", 120.0),
    ("SIGNAL_LOSS", "DROPPED_CALLS", 120.0),
    ("HARDWARE_FAULT", "SERVICE_DEGRADED", 180.0),
    ("FIBER_CUT", "SIGNAL_LOSS", 60.0),
];

fn max_lag_for(cause_type: &str) -> f64 {
    DOMAIN_RULES
        .iter()
        .find(|(cause, _, _)| *cause == cause_type)
        .map(|(_, _, lag)| *lag)
        .unwrap_or(300.0)
}

fn domain_rule_matches(cause_type: &str, effect_type: &str) -> Option<f64> {
    DOMAIN_RULES
        .iter()
        .find(|(c, e, _)| *c == cause_type && *e == effect_type)
        .map(|(_, _, lag)| *lag)
}

pub struct RcaEngine {
    patterns: PatternStore,
}

impl RcaEngine {
    pub fn new() -> Self {
        Self {
            patterns: PatternStore::new(),
        }
    }

    pub fn patterns(&self) -> &PatternStore {
        &self.patterns
    }

    /// Run the full pipeline (§4.9 steps 1-5). Returns `None` only for an
    /// empty input; a single event is trivially its own root cause.
    pub fn analyze(&self, events: Vec<CausalEvent>) -> Option<RcaResult> {
        let start = Utc::now();
        if events.is_empty() {
            return None;
        }

        let mut sorted = events;
        sorted.sort_by_key(|e| e.timestamp);

        if sorted.len() == 1 {
            let event = sorted.into_iter().next().unwrap();
            return Some(RcaResult {
                root_cause: event.clone(),
                confidence: 0.95,
                confidence_level: ConfidenceLevel::High,
                chain: vec![],
                affected: vec![],
                alternatives: vec![],
                evidence: vec![format!(
                    "single event reported: {} at station {}",
                    event.event_type, event.station_id
                )],
                recommended_action: None,
                analysis_time_ms: (Utc::now() - start).num_milliseconds().max(0) as u64,
            });
        }

        let mut links = Vec::new();
        for i in 0..sorted.len() {
            for j in (i + 1)..sorted.len() {
                let cause = &sorted[i];
                let effect = &sorted[j];
                if cause.timestamp >= effect.timestamp {
                    continue;
                }
                let lag = (effect.timestamp - cause.timestamp).num_milliseconds() as f64 / 1000.0;

                if let Some(max_lag) = domain_rule_matches(&cause.event_type, &effect.event_type) {
                    if lag <= max_lag {
                        let mut confidence = 0.9;
                        let mut evidence = vec![format!(
                            "known rule: {} -> {} within {:.0}s (lag {:.0}s)",
                            cause.event_type, effect.event_type, max_lag, lag
                        )];
                        if cause.station_id == effect.station_id {
                            confidence += 0.05;
                            evidence.push("same station".to_string());
                        }
                        if lag <= max_lag / 2.0 {
                            confidence += 0.03;
                            evidence.push("lag within half the domain bound".to_string());
                        }
                        links.push(CausalLink {
                            cause: cause.clone(),
                            effect: effect.clone(),
                            relation: CausalRelation::Direct,
                            confidence: confidence.min(0.99),
                            time_lag_seconds: lag,
                            evidence,
                        });
                        continue;
                    }
                }

                let key = format!("{}->{}", cause.event_type, effect.event_type);
                if let Some(learned) = self.patterns.lookup(&key) {
                    links.push(CausalLink {
                        cause: cause.clone(),
                        effect: effect.clone(),
                        relation: CausalRelation::Direct,
                        confidence: learned.confidence,
                        time_lag_seconds: lag,
                        evidence: vec![format!("learned pattern: {key}")],
                    });
                    continue;
                }

                if cause.station_id == effect.station_id
                    && lag <= 120.0
                    && effect.severity >= cause.severity
                {
                    links.push(CausalLink {
                        cause: cause.clone(),
                        effect: effect.clone(),
                        relation: CausalRelation::Correlation,
                        confidence: 0.5,
                        time_lag_seconds: lag,
                        evidence: vec![format!(
                            "same station, lag {:.0}s, non-decreasing severity",
                            lag
                        )],
                    });
                }
            }
        }

        let n = sorted.len();
        let max_out_degree = sorted
            .iter()
            .map(|e| links.iter().filter(|l| l.cause.event_id == e.event_id).count())
            .max()
            .unwrap_or(0)
            .max(1);

        let mut scored: Vec<(usize, f64)> = sorted
            .iter()
            .enumerate()
            .map(|(idx, event)| {
                let earliness = if n > 1 { 1.0 - idx as f64 / (n - 1) as f64 } else { 1.0 };

                let out_links: Vec<&CausalLink> = links
                    .iter()
                    .filter(|l| l.cause.event_id == event.event_id)
                    .collect();
                let out_degree = out_links.len();
                let mean_confidence = if out_degree > 0 {
                    out_links.iter().map(|l| l.confidence).sum::<f64>() / out_degree as f64
                } else {
                    0.0
                };
                let out_degree_term = (out_degree as f64 / max_out_degree as f64) * 0.4 + mean_confidence * 0.2;

                let domain_known = DOMAIN_RULES.iter().any(|(c, _, _)| *c == event.event_type);
                let severity_boost = severity_weight(event.severity);
                let domain_term = if domain_known { 0.1 * severity_boost } else { 0.0 };

                let in_degree = links.iter().filter(|l| l.effect.event_id == event.event_id).count();
                let in_degree_bonus = if in_degree == 0 { 0.15 } else { 0.0 };

                let score = earliness * 0.3 + out_degree_term + domain_term + in_degree_bonus;
                (idx, score.min(0.99))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

        let (root_idx, root_confidence) = scored[0];
        let root_cause = sorted[root_idx].clone();
        let confidence_level = ConfidenceLevel::from_confidence(root_confidence);

        let alternatives: Vec<(CausalEvent, f64)> = scored
            .iter()
            .skip(1)
            .take(3)
            .map(|&(idx, score)| (sorted[idx].clone(), score))
            .collect();

        let chain: Vec<CausalLink> = links
            .iter()
            .filter(|l| l.cause.event_id == root_cause.event_id)
            .cloned()
            .collect();

        let affected: Vec<CausalEvent> = sorted
            .iter()
            .filter(|e| e.event_id != root_cause.event_id)
            .cloned()
            .collect();

        let mut evidence = vec![format!(
            "{} events analyzed; root cause occurred earliest-weighted at position {}/{}",
            n,
            root_idx + 1,
            n
        )];
        if DOMAIN_RULES.iter().any(|(c, _, _)| *c == root_cause.event_type) {
            evidence.push(format!("{} matches a known domain rule as a cause", root_cause.event_type));
        }
        evidence.push(format!(
            "{} stations involved across the event set",
            sorted
                .iter()
                .map(|e| e.station_id.clone())
                .collect::<std::collections::BTreeSet<_>>()
                .len()
        ));
        evidence.push(format!("{} causal link(s) traced from the root cause", chain.len()));

        let recommended_action = chain
            .first()
            .map(|_| format!("address {} before downstream symptoms recur", root_cause.event_type));

        Some(RcaResult {
            root_cause,
            confidence: root_confidence,
            confidence_level,
            chain,
            affected,
            alternatives,
            evidence,
            recommended_action,
            analysis_time_ms: (Utc::now() - start).num_milliseconds().max(0) as u64,
        })
    }
}

impl Default for RcaEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn severity_weight(severity: station_common::AlarmSeverity) -> f64 {
    use station_common::AlarmSeverity::*;
    match severity {
        Critical => 1.0,
        Major => 0.75,
        Minor => 0.5,
        Warning => 0.25,
        Info => 0.1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use station_common::AlarmSeverity;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn event(event_type: &str, station: &str, severity: AlarmSeverity, t: chrono::DateTime<Utc>) -> CausalEvent {
        CausalEvent {
            event_id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            station_id: station.to_string(),
            timestamp: t,
            severity,
            metric: None,
            value: None,
            metadata: HashMap::new(),
        }
    }

    /// Scenario D (§8): same four events as scenario C's alarm cluster.
    #[test]
    fn power_failure_is_root_cause_with_high_confidence() {
        let engine = RcaEngine::new();
        let t0 = Utc::now();
        let events = vec![
            event("POWER_FAILURE", "S2", AlarmSeverity::Critical, t0),
            event("TEMPERATURE_HIGH", "S2", AlarmSeverity::Major, t0 + Duration::seconds(5)),
            event("FAN_FAILURE", "S2", AlarmSeverity::Major, t0 + Duration::seconds(10)),
            event("SIGNAL_LOSS", "S2", AlarmSeverity::Major, t0 + Duration::seconds(15)),
        ];

        let result = engine.analyze(events).unwrap();
        assert_eq!(result.root_cause.event_type, "POWER_FAILURE");
        assert_eq!(result.confidence_level, ConfidenceLevel::High);
        assert_eq!(result.chain.len(), 3);
        for link in &result.chain {
            assert!(link.cause.timestamp < link.effect.timestamp);
        }
    }

    #[test]
    fn single_event_is_its_own_root_cause() {
        let engine = RcaEngine::new();
        let events = vec![event("POWER_FAILURE", "S1", AlarmSeverity::Critical, Utc::now())];
        let result = engine.analyze(events).unwrap();
        assert_eq!(result.confidence, 0.95);
        assert_eq!(result.confidence_level, ConfidenceLevel::High);
        assert!(result.chain.is_empty());
    }

    #[test]
    fn empty_input_yields_no_result() {
        let engine = RcaEngine::new();
        assert!(engine.analyze(vec![]).is_none());
    }

    #[test]
    fn every_link_respects_temporal_precedence() {
        let engine = RcaEngine::new();
        let t0 = Utc::now();
        let events = vec![
            event("HARDWARE_FAULT", "S4", AlarmSeverity::Major, t0),
            event("SERVICE_DEGRADED", "S4", AlarmSeverity::Major, t0 + Duration::seconds(30)),
            event("PACKET_LOSS", "S4", AlarmSeverity::Minor, t0 + Duration::seconds(60)),
        ];
        let result = engine.analyze(events).unwrap();
        for link in &result.chain {
            assert!(link.cause.timestamp < link.effect.timestamp);
        }
    }
}
