//! Component-specific predictive health scoring (§4.7).
//!
//! Each predictor reads the relevant rolling windows, requires at least
//! `MIN_DATA_POINTS` samples, fits a trend, combines banded sub-factors into
//! a health score in `[0, 1]`, and derives health band / probability / ETA
//! from it.
//!
//! Sub-factor combination: the spec's prose describes both an "arithmetic
//! mean of per-factor sub-scores" and a flat "penalty... added" for
//! degradation trends, which are not simultaneously consistent (averaging
//! vs. additive penalty). This implementation resolves the ambiguity by
//! taking the *minimum* across applicable sub-factor scores — the worst
//! symptom dominates the health verdict, which matches the failure
//! semantics of every concrete threshold table in §4.7 better than
//! averaging would (a single critical-band reading should not be diluted by
//! two still-healthy ones). Recorded as an Open Question resolution per §9.

use station_common::{Component, ComponentPrediction, HealthBand, MetricKind, PredictionConfidence};
use station_ingest::RollingStore;
use std::time::Duration;

use crate::trend::{self};

/// Minimum sample count before a predictor produces a result (§4.7).
pub const MIN_DATA_POINTS: usize = 10;

fn health_band(score: f64) -> HealthBand {
    if score < 0.4 {
        HealthBand::Critical
    } else if score < 0.6 {
        HealthBand::Warning
    } else if score < 0.8 {
        HealthBand::Degraded
    } else {
        HealthBand::Healthy
    }
}

fn confidence_for(data_points: usize) -> PredictionConfidence {
    if data_points >= 100 {
        PredictionConfidence::High
    } else if data_points >= 30 {
        PredictionConfidence::Medium
    } else {
        PredictionConfidence::Low
    }
}

/// Banded sub-score where a *higher* value is healthier (e.g. fan RPM, OSNR).
fn band_high_is_good(value: f64, healthy: f64, warning: f64, critical: f64) -> f64 {
    if value >= healthy {
        1.0
    } else if value >= warning {
        0.8
    } else if value >= critical {
        0.6
    } else {
        0.2
    }
}

/// Banded sub-score where a *lower* value is healthier (e.g. temperature, BER).
fn band_low_is_good(value: f64, healthy: f64, warning: f64, critical: f64) -> f64 {
    if value <= healthy {
        1.0
    } else if value <= warning {
        0.8
    } else if value <= critical {
        0.6
    } else {
        0.2
    }
}

fn combine(factors: &[f64]) -> f64 {
    factors.iter().cloned().fold(1.0_f64, f64::min)
}

/// Project, along a fitted trend, the ETA until a metric reaches
/// `critical_threshold`. `declining` selects whether the metric is expected
/// to fall toward the threshold (fan RPM) or rise toward it (temperature).
/// Already-crossed thresholds report `Duration::ZERO`.
fn eta_to_threshold(
    slope_per_hour: f64,
    current_value: f64,
    critical_threshold: f64,
    declining: bool,
) -> Option<Duration> {
    if declining {
        if current_value <= critical_threshold {
            return Some(Duration::ZERO);
        }
        if slope_per_hour >= 0.0 {
            return None;
        }
        let hours = (current_value - critical_threshold) / (-slope_per_hour);
        Some(Duration::from_secs_f64((hours * 3600.0).max(0.0)))
    } else {
        if current_value >= critical_threshold {
            return Some(Duration::ZERO);
        }
        if slope_per_hour <= 0.0 {
            return None;
        }
        let hours = (critical_threshold - current_value) / slope_per_hour;
        Some(Duration::from_secs_f64((hours * 3600.0).max(0.0)))
    }
}

fn recommended_action(component: Component, health: HealthBand) -> String {
    use Component::*;
    use HealthBand::*;
    match (component, health) {
        (CoolingFan, Critical) => {
            "URGENT: schedule fan replacement before thermal shutdown".to_string()
        }
        (CoolingFan, Warning) => "plan fan replacement within the next maintenance window".to_string(),
        (CoolingFan, Degraded) => "monitor fan RPM trend; inspect bearing wear".to_string(),
        (CoolingFan, Healthy) => "no action required".to_string(),
        (ThermalSystem, Critical) => "URGENT: investigate cooling failure, risk of thermal shutdown".to_string(),
        (ThermalSystem, Warning) => "inspect airflow and ambient temperature".to_string(),
        (ThermalSystem, Degraded) => "monitor temperature trend".to_string(),
        (ThermalSystem, Healthy) => "no action required".to_string(),
        (PowerSupply, Critical) => "URGENT: schedule power supply replacement".to_string(),
        (PowerSupply, Warning) => "inspect power supply voltage regulation".to_string(),
        (PowerSupply, Degraded) => "monitor power consumption variance".to_string(),
        (PowerSupply, Healthy) => "no action required".to_string(),
        (BatterySystem, Critical) => "URGENT: schedule battery replacement, capacity critically degraded".to_string(),
        (BatterySystem, Warning) => "plan battery replacement, capacity fade detected".to_string(),
        (BatterySystem, Degraded) => "monitor state of charge and cycle count".to_string(),
        (BatterySystem, Healthy) => "no action required".to_string(),
        (FiberTransport, Critical) => "URGENT: inspect fiber link, optical budget critically low".to_string(),
        (FiberTransport, Warning) => "inspect fiber connectors and optical attenuation".to_string(),
        (FiberTransport, Degraded) => "monitor optical power trend".to_string(),
        (FiberTransport, Healthy) => "no action required".to_string(),
        (_, Failed) => "URGENT: component failed, dispatch field replacement".to_string(),
    }
}

fn build_prediction(
    component: Component,
    station_id: &str,
    score: f64,
    trend: station_common::TrendAnalysis,
    eta: Option<Duration>,
    data_points: usize,
    window: usize,
) -> ComponentPrediction {
    let health = health_band(score);
    let probability = (1.0 - score).clamp(0.0, 1.0);
    ComponentPrediction {
        component,
        station_id: station_id.to_string(),
        prediction: format!("{health:?}"),
        confidence: confidence_for(data_points),
        probability,
        eta,
        current_health: health,
        trend,
        recommended_action: recommended_action(component, health),
        data_points,
        window,
    }
}

/// Fan RPM thresholds (§4.7).
const FAN_HEALTHY: f64 = 2000.0;
const FAN_WARNING: f64 = 1500.0;
const FAN_CRITICAL: f64 = 1000.0;
const FAN_CV_DEGRADED: f64 = 0.15;
const FAN_SLOPE_DEGRADED: f64 = -10.0;

pub fn predict_cooling_fan(
    store: &RollingStore,
    station_id: &str,
    now: chrono::DateTime<chrono::Utc>,
    window: usize,
) -> Option<ComponentPrediction> {
    let samples = store.recent(station_id, MetricKind::FanSpeed, now);
    if samples.len() < MIN_DATA_POINTS {
        return None;
    }
    let trend = trend::analyze(&samples)?;
    let current = samples.last()?.value;

    let value_factor = band_high_is_good(current, FAN_HEALTHY, FAN_WARNING, FAN_CRITICAL);
    let cv = if trend.mean.abs() > 1e-10 { trend.std / trend.mean.abs() } else { 0.0 };
    let mut factors = vec![value_factor];
    if cv > FAN_CV_DEGRADED {
        factors.push(0.6);
    }
    if trend.slope < FAN_SLOPE_DEGRADED {
        factors.push(0.6);
    }
    let score = combine(&factors);
    let eta = eta_to_threshold(trend.slope, current, FAN_CRITICAL, true);

    Some(build_prediction(
        Component::CoolingFan,
        station_id,
        score,
        trend,
        eta,
        samples.len(),
        window,
    ))
}

/// Temperature thresholds (°C, §4.7).
const TEMP_HEALTHY: f64 = 55.0;
const TEMP_WARNING: f64 = 65.0;
const TEMP_CRITICAL: f64 = 75.0;
const TEMP_RISING_SLOPE: f64 = 0.5;

pub fn predict_thermal_system(
    store: &RollingStore,
    station_id: &str,
    now: chrono::DateTime<chrono::Utc>,
    window: usize,
) -> Option<ComponentPrediction> {
    let samples = store.recent(station_id, MetricKind::Temperature, now);
    if samples.len() < MIN_DATA_POINTS {
        return None;
    }
    let trend = trend::analyze(&samples)?;
    let current = samples.last()?.value;

    let value_factor = band_low_is_good(current, TEMP_HEALTHY, TEMP_WARNING, TEMP_CRITICAL);
    let mut factors = vec![value_factor];
    if trend.slope > TEMP_RISING_SLOPE {
        factors.push(0.6);
    }
    let score = combine(&factors);
    let eta = eta_to_threshold(trend.slope, current, TEMP_CRITICAL, false);

    Some(build_prediction(
        Component::ThermalSystem,
        station_id,
        score,
        trend,
        eta,
        samples.len(),
        window,
    ))
}

/// Power supply predictor uses `PowerConsumption`'s coefficient of variation
/// as a stand-in for "voltage variation" (§4.7): the metric dictionary (§3)
/// has no dedicated voltage reading, and consumption variance is the closest
/// observable proxy for supply instability.
const POWER_CV_WARNING: f64 = 0.05;
const POWER_SLOPE_DEGRADED: f64 = -0.01;

pub fn predict_power_supply(
    store: &RollingStore,
    station_id: &str,
    now: chrono::DateTime<chrono::Utc>,
    window: usize,
) -> Option<ComponentPrediction> {
    let samples = store.recent(station_id, MetricKind::PowerConsumption, now);
    if samples.len() < MIN_DATA_POINTS {
        return None;
    }
    let trend = trend::analyze(&samples)?;

    let cv = if trend.mean.abs() > 1e-10 { trend.std / trend.mean.abs() } else { 0.0 };
    let value_factor = if cv <= POWER_CV_WARNING { 1.0 } else { 0.6 };
    let mut factors = vec![value_factor];
    if trend.slope < POWER_SLOPE_DEGRADED {
        factors.push(0.6);
    }
    let score = combine(&factors);

    Some(build_prediction(
        Component::PowerSupply,
        station_id,
        score,
        trend,
        None,
        samples.len(),
        window,
    ))
}

/// Battery thresholds (§4.7).
const SOC_HEALTHY: f64 = 80.0;
const SOC_WARNING: f64 = 50.0;
const SOC_CRITICAL: f64 = 20.0;
const DOD_HEALTHY: f64 = 50.0;
const DOD_WARNING: f64 = 70.0;
const DOD_CRITICAL: f64 = 85.0;
const BATTERY_TEMP_HEALTHY: f64 = 35.0;
const BATTERY_TEMP_WARNING: f64 = 45.0;
const BATTERY_TEMP_CRITICAL: f64 = 55.0;
const CYCLES_HEALTHY: f64 = 500.0;
const CYCLES_WARNING: f64 = 800.0;
const CYCLES_CRITICAL: f64 = 1000.0;
const SOC_DECLINE_WARNING: f64 = -0.5;

pub fn predict_battery_system(
    store: &RollingStore,
    station_id: &str,
    now: chrono::DateTime<chrono::Utc>,
    window: usize,
) -> Option<ComponentPrediction> {
    let soc_samples = store.recent(station_id, MetricKind::BatterySoc, now);
    if soc_samples.len() < MIN_DATA_POINTS {
        return None;
    }
    let soc_trend = trend::analyze(&soc_samples)?;
    let soc = soc_samples.last()?.value;

    let mut factors = vec![band_high_is_good(soc, SOC_HEALTHY, SOC_WARNING, SOC_CRITICAL)];

    if let Some(dod) = store.last(station_id, MetricKind::BatteryDod) {
        factors.push(band_low_is_good(dod.value, DOD_HEALTHY, DOD_WARNING, DOD_CRITICAL));
    }
    if let Some(temp) = store.last(station_id, MetricKind::BatteryTemp) {
        factors.push(band_low_is_good(
            temp.value,
            BATTERY_TEMP_HEALTHY,
            BATTERY_TEMP_WARNING,
            BATTERY_TEMP_CRITICAL,
        ));
    }
    if let Some(cycles) = store.last(station_id, MetricKind::BatteryCycles) {
        factors.push(band_low_is_good(
            cycles.value,
            CYCLES_HEALTHY,
            CYCLES_WARNING,
            CYCLES_CRITICAL,
        ));
    }
    if soc_trend.slope < SOC_DECLINE_WARNING {
        factors.push(0.6);
    }

    let score = combine(&factors);
    let eta = eta_to_threshold(soc_trend.slope, soc, SOC_CRITICAL, true);

    Some(build_prediction(
        Component::BatterySystem,
        station_id,
        score,
        soc_trend,
        eta,
        soc_samples.len(),
        window,
    ))
}

/// Fiber thresholds (dBm / dB / ratio, §4.7).
const FIBER_RX_HEALTHY: f64 = -20.0;
const FIBER_RX_WARNING: f64 = -25.0;
const FIBER_RX_CRITICAL: f64 = -30.0;
const FIBER_TX_HEALTHY: f64 = -5.0;
const FIBER_TX_WARNING: f64 = -8.0;
const FIBER_TX_CRITICAL: f64 = -10.0;
const FIBER_BER_HEALTHY: f64 = 1e-12;
const FIBER_BER_WARNING: f64 = 1e-9;
const FIBER_BER_CRITICAL: f64 = 1e-6;
const FIBER_OSNR_HEALTHY: f64 = 25.0;
const FIBER_OSNR_WARNING: f64 = 18.0;
const FIBER_OSNR_CRITICAL: f64 = 12.0;

pub fn predict_fiber_transport(
    store: &RollingStore,
    station_id: &str,
    now: chrono::DateTime<chrono::Utc>,
    window: usize,
) -> Option<ComponentPrediction> {
    let rx_samples = store.recent(station_id, MetricKind::FiberRxPower, now);
    if rx_samples.len() < MIN_DATA_POINTS {
        return None;
    }
    let rx_trend = trend::analyze(&rx_samples)?;
    let rx = rx_samples.last()?.value;

    let mut factors = vec![band_high_is_good(
        rx,
        FIBER_RX_HEALTHY,
        FIBER_RX_WARNING,
        FIBER_RX_CRITICAL,
    )];
    if let Some(tx) = store.last(station_id, MetricKind::FiberTxPower) {
        factors.push(band_high_is_good(
            tx.value,
            FIBER_TX_HEALTHY,
            FIBER_TX_WARNING,
            FIBER_TX_CRITICAL,
        ));
    }
    if let Some(ber) = store.last(station_id, MetricKind::FiberBer) {
        factors.push(band_low_is_good(
            ber.value,
            FIBER_BER_HEALTHY,
            FIBER_BER_WARNING,
            FIBER_BER_CRITICAL,
        ));
    }
    if let Some(osnr) = store.last(station_id, MetricKind::FiberOsnr) {
        factors.push(band_high_is_good(
            osnr.value,
            FIBER_OSNR_HEALTHY,
            FIBER_OSNR_WARNING,
            FIBER_OSNR_CRITICAL,
        ));
    }

    let score = combine(&factors);
    let eta = eta_to_threshold(rx_trend.slope, rx, FIBER_RX_CRITICAL, true);

    Some(build_prediction(
        Component::FiberTransport,
        station_id,
        score,
        rx_trend,
        eta,
        rx_samples.len(),
        window,
    ))
}

/// Dispatch by component to the matching predictor.
pub fn predict(
    component: Component,
    store: &RollingStore,
    station_id: &str,
    now: chrono::DateTime<chrono::Utc>,
    window: usize,
) -> Option<ComponentPrediction> {
    match component {
        Component::CoolingFan => predict_cooling_fan(store, station_id, now, window),
        Component::ThermalSystem => predict_thermal_system(store, station_id, now, window),
        Component::PowerSupply => predict_power_supply(store, station_id, now, window),
        Component::BatterySystem => predict_battery_system(store, station_id, now, window),
        Component::FiberTransport => predict_fiber_transport(store, station_id, now, window),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn fan_health_bands_by_current_value() {
        assert_eq!(health_band(0.2), HealthBand::Critical);
        assert_eq!(health_band(0.5), HealthBand::Warning);
        assert_eq!(health_band(0.7), HealthBand::Degraded);
        assert_eq!(health_band(0.9), HealthBand::Healthy);
    }

    /// Scenario A (§8): 200 FAN_SPEED samples declining linearly from 3000
    /// to 900 RPM over 24h.
    #[test]
    fn fan_failure_prediction_is_critical_with_high_probability() {
        let store = RollingStore::new(1000, 7);
        let now = chrono::Utc::now() - ChronoDuration::hours(24);
        let n = 200;
        let total_seconds = 24.0 * 3600.0;
        let mut last_hours = 0.0;
        let mut last_value = 3000.0;
        for i in 0..n {
            let frac = i as f64 / (n - 1) as f64;
            let value = 3000.0 - frac * (3000.0 - 900.0);
            let ts = now + ChronoDuration::milliseconds((frac * total_seconds * 1000.0) as i64);
            store.push("S1", MetricKind::FanSpeed, ts, value);
            last_hours = frac * 24.0;
            last_value = value;
        }
        let current_time = now + ChronoDuration::milliseconds((total_seconds * 1000.0) as i64);

        let prediction = predict_cooling_fan(&store, "S1", current_time, 200).unwrap();
        assert_eq!(prediction.current_health, HealthBand::Critical);
        assert!(prediction.probability >= 0.8, "probability={}", prediction.probability);
        assert!(
            prediction.recommended_action.contains("replacement")
                || prediction.recommended_action.contains("URGENT")
        );

        // Independently computed linear-projection ETA: using the fitted
        // slope (~ -87.5 RPM/hr) and the last observed value, already below
        // the 1000 RPM critical threshold.
        assert!(last_value <= FAN_CRITICAL);
        assert_eq!(prediction.eta, Some(Duration::ZERO));
        let _ = last_hours;
    }

    #[test]
    fn insufficient_samples_yields_no_prediction() {
        let store = RollingStore::new(1000, 7);
        let now = chrono::Utc::now();
        for i in 0..5 {
            store.push("S1", MetricKind::FanSpeed, now + ChronoDuration::seconds(i), 3000.0);
        }
        assert!(predict_cooling_fan(&store, "S1", now, 100).is_none());
    }

    #[test]
    fn healthy_fan_yields_healthy_band() {
        let store = RollingStore::new(1000, 7);
        let now = chrono::Utc::now();
        for i in 0..50 {
            store.push("S1", MetricKind::FanSpeed, now + ChronoDuration::seconds(i), 3000.0);
        }
        let prediction = predict_cooling_fan(&store, "S1", now + ChronoDuration::seconds(60), 100).unwrap();
        assert_eq!(prediction.current_health, HealthBand::Healthy);
        assert!(prediction.probability < 0.1);
    }
}
