//! Health reporting types and process-wide Prometheus counters.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health status of the whole core, aggregated from per-component checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub overall_health: HealthLevel,
    pub components: HashMap<String, ComponentHealth>,
    pub last_check: DateTime<Utc>,
    pub uptime_seconds: u64,
}

/// Health levels for components and the aggregate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Critical,
    Unknown,
}

/// Component health information, also used as the body of `ComponentPrediction.current_health`
/// rendering in `station_health_report`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthLevel,
    pub message: String,
    pub last_check: DateTime<Utc>,
    pub metrics: HashMap<String, f32>,
}

impl HealthLevel {
    pub fn as_score(&self) -> u8 {
        match self {
            HealthLevel::Healthy => 100,
            HealthLevel::Degraded => 50,
            HealthLevel::Critical => 10,
            HealthLevel::Unknown => 0,
        }
    }
}

impl HealthStatus {
    /// Recompute `overall_health` from the worst component status present.
    pub fn calculate_overall_health(&mut self) {
        if self.components.is_empty() {
            self.overall_health = HealthLevel::Unknown;
            return;
        }

        let critical_count = self
            .components
            .values()
            .filter(|c| c.status == HealthLevel::Critical)
            .count();
        let degraded_count = self
            .components
            .values()
            .filter(|c| c.status == HealthLevel::Degraded)
            .count();

        self.overall_health = if critical_count > 0 {
            HealthLevel::Critical
        } else if degraded_count > 0 {
            HealthLevel::Degraded
        } else {
            HealthLevel::Healthy
        };
    }
}

/// Process-wide Prometheus counters, shared across all crates in the workspace.
/// Registered lazily on first access against the default registry.
pub static FRAMES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "station_frames_total",
        "Device frames processed by the codec, labeled by outcome",
        &["result"]
    )
    .expect("station_frames_total registration")
});

pub static ANOMALIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "station_anomalies_total",
        "Anomalies emitted by the detector, labeled by severity",
        &["severity"]
    )
    .expect("station_anomalies_total registration")
});

pub static ACTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "station_actions_total",
        "Healing actions, labeled by terminal status",
        &["status"]
    )
    .expect("station_actions_total registration")
});

pub static RCA_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "station_rca_duration_seconds",
        "Time spent inside analyze_rca",
        &["outcome"]
    )
    .expect("station_rca_duration_seconds registration")
});
