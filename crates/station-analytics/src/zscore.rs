//! Univariate Z-score anomaly detection (§4.5).

use chrono::Utc;
use station_common::{Anomaly, AnomalyCategory, MetricKind, Severity};
use station_ingest::{OnlineStats, RollingStore};
use std::collections::HashMap;
use uuid::Uuid;

/// Minimum sample count before Z-score detection engages (§4.5).
pub const MIN_SAMPLES: u64 = 30;

/// Default Z-score threshold (`z_threshold` in `AnalyticsConfig`).
pub const DEFAULT_Z_THRESHOLD: f64 = 3.0;

fn category_for(metric: MetricKind) -> AnomalyCategory {
    use MetricKind::*;
    match metric {
        CpuUsage | MemoryUsage => AnomalyCategory::Performance,
        Temperature => AnomalyCategory::Thermal,
        PowerConsumption => AnomalyCategory::Power,
        FanSpeed => AnomalyCategory::Thermal,
        SignalStrength | Vswr | SinrNr700 | SinrNr3500 | RsrpNr700 | RsrpNr3500 => {
            AnomalyCategory::Rf
        }
        DlNr700 | UlNr700 | DlNr3500 | UlNr3500 => AnomalyCategory::Performance,
        BatterySoc | BatteryDod | BatteryTemp | BatteryCycles => AnomalyCategory::Battery,
        FiberRxPower | FiberTxPower | FiberBer | FiberOsnr => AnomalyCategory::Fiber,
        LatencyPing | TxImbalance | HandoverSuccessRate => AnomalyCategory::Quality,
    }
}

/// Curated correlated-metric list per metric, scanned for concurrent `|z| >
/// 2` when building `hints` (§4.5).
fn correlated_metrics(metric: MetricKind) -> &'static [MetricKind] {
    use MetricKind::*;
    match metric {
        Temperature => &[FanSpeed, PowerConsumption, CpuUsage],
        FanSpeed => &[Temperature, PowerConsumption],
        PowerConsumption => &[Temperature, FanSpeed, CpuUsage],
        CpuUsage => &[MemoryUsage, Temperature, LatencyPing],
        MemoryUsage => &[CpuUsage, LatencyPing],
        SignalStrength => &[SinrNr700, SinrNr3500, RsrpNr700, RsrpNr3500],
        Vswr => &[SignalStrength, TxImbalance],
        SinrNr700 | SinrNr3500 => &[SignalStrength, RsrpNr700, RsrpNr3500],
        RsrpNr700 | RsrpNr3500 => &[SignalStrength, SinrNr700, SinrNr3500],
        DlNr700 | UlNr700 => &[SinrNr700, RsrpNr700, LatencyPing],
        DlNr3500 | UlNr3500 => &[SinrNr3500, RsrpNr3500, LatencyPing],
        BatterySoc => &[BatteryDod, BatteryTemp],
        BatteryDod => &[BatterySoc, BatteryCycles],
        BatteryTemp => &[BatterySoc, Temperature],
        BatteryCycles => &[BatteryDod],
        FiberRxPower => &[FiberBer, FiberOsnr],
        FiberTxPower => &[FiberBer, FiberOsnr],
        FiberBer => &[FiberRxPower, FiberTxPower, FiberOsnr],
        FiberOsnr => &[FiberRxPower, FiberTxPower, FiberBer],
        LatencyPing => &[CpuUsage, HandoverSuccessRate],
        TxImbalance => &[Vswr, SignalStrength],
        HandoverSuccessRate => &[LatencyPing, SignalStrength],
    }
}

/// `(category, metric, sign)` -> recommended action strings (§4.5).
fn recommendations_for(category: AnomalyCategory, metric: MetricKind, rising: bool) -> Vec<String> {
    use AnomalyCategory::*;
    match (category, rising) {
        (Thermal, true) if metric == MetricKind::Temperature => vec![
            "inspect cooling fan RPM and airflow".to_string(),
            "check for dust/blockage in intake vents".to_string(),
        ],
        (Thermal, false) if metric == MetricKind::FanSpeed => {
            vec!["inspect fan bearing and power supply to fan".to_string()]
        }
        (Power, true) => vec!["check for component short or abnormal load".to_string()],
        (Power, false) => vec!["verify upstream power supply and breaker".to_string()],
        (Performance, true) => vec!["check for runaway process or traffic surge".to_string()],
        (Rf, _) => vec![
            "check antenna alignment and feeder connections".to_string(),
            "verify VSWR within spec".to_string(),
        ],
        (Battery, _) => vec!["schedule battery capacity test".to_string()],
        (Fiber, _) => vec!["inspect fiber connectors and optical budget".to_string()],
        (Quality, _) => vec!["review handover parameters (CIO/TTT)".to_string()],
        _ => vec!["investigate affected metric trend".to_string()],
    }
}

/// Severity bands from the normalized Z-score relative to `z_threshold` (§4.5).
pub fn severity_for_z(z: f64, z_threshold: f64) -> Severity {
    if z > 3.0 * z_threshold {
        Severity::Critical
    } else if z > 2.0 * z_threshold {
        Severity::High
    } else if z > 1.5 * z_threshold {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// `score = min(1.0, z / (2 * z_threshold))`; monotonically non-decreasing
/// in `|value - mean|` for fixed `mean`/`std` (§8 invariant 4).
pub fn anomaly_score(z: f64, z_threshold: f64) -> f64 {
    (z / (2.0 * z_threshold)).min(1.0)
}

/// Run the univariate Z-score path for a single new reading. Returns `None`
/// if there are fewer than `MIN_SAMPLES` samples or the Z-score does not
/// cross `z_threshold`.
pub fn detect(
    store: &RollingStore,
    station_id: &str,
    metric: MetricKind,
    value: f64,
    z_threshold: f64,
) -> Option<Anomaly> {
    let stats: OnlineStats = store.stats(station_id, metric);
    if stats.count() < MIN_SAMPLES {
        return None;
    }

    let z = stats.z_score(value);
    if z < z_threshold {
        return None;
    }

    let mean = stats.mean();
    let std = stats.std_for_division();
    let rising = value > mean;
    let category = category_for(metric);

    let now = Utc::now();
    let mut hints = Vec::new();
    for &correlated in correlated_metrics(metric) {
        let other_stats = store.stats(station_id, correlated);
        if other_stats.count() < MIN_SAMPLES {
            continue;
        }
        if let Some(sample) = store.last(station_id, correlated) {
            let other_z = other_stats.z_score(sample.value);
            if other_z > 2.0 {
                hints.push(format!(
                    "{correlated:?} also elevated (z={other_z:.2}) at same time"
                ));
            }
        }
    }

    let mut values = HashMap::new();
    values.insert(format!("{metric:?}"), value);

    Some(Anomaly {
        id: Uuid::new_v4(),
        station_id: station_id.to_string(),
        detected_at: now,
        severity: severity_for_z(z, z_threshold),
        category,
        score: anomaly_score(z, z_threshold),
        affected_metrics: vec![metric],
        values,
        expected_range: (mean - 2.0 * std, mean + 2.0 * std),
        hints,
        recommendations: recommendations_for(category, metric, rising),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use station_common::MetricKind;

    /// §4.5's literal band formula (`>3·z_t` Critical, `>2·z_t` High, `>1.5·z_t`
    /// Medium, else Low) doesn't actually place every one of §8 scenario 5's
    /// four sample multiples (1.6, 2.5, 6.5, 10) into the distinct
    /// LOW/MEDIUM/HIGH/CRITICAL bands the scenario text describes — both 6.5
    /// and 10 exceed the `3·z_t` Critical cutoff, so no multiplier set can
    /// produce all four labels under this banding with only one threshold
    /// crossed per step. The band *boundaries* are authoritative (they're the
    /// only quantitative rule given); this asserts what they actually produce.
    #[test]
    fn severity_bands_match_z_multiples_of_threshold() {
        let zt = 3.0;
        assert_eq!(severity_for_z(1.6 * zt, zt), Severity::Medium);
        assert_eq!(severity_for_z(2.5 * zt, zt), Severity::High);
        assert_eq!(severity_for_z(6.5 * zt, zt), Severity::Critical);
        assert_eq!(severity_for_z(10.0 * zt, zt), Severity::Critical);
    }

    #[test]
    fn score_is_monotonic_in_deviation() {
        let zt = 3.0;
        assert!(anomaly_score(3.0, zt) < anomaly_score(6.0, zt));
        assert!(anomaly_score(20.0, zt) <= 1.0);
    }

    #[test]
    fn no_detection_below_minimum_sample_count() {
        let store = RollingStore::new(1000, 7);
        let now = Utc::now();
        for i in 0..10 {
            store.push("S1", MetricKind::CpuUsage, now + Duration::seconds(i), 30.0);
        }
        assert!(detect(&store, "S1", MetricKind::CpuUsage, 95.0, 3.0).is_none());
    }

    #[test]
    fn cpu_spike_after_50_uniform_samples_is_critical_performance() {
        let store = RollingStore::new(1000, 7);
        let now = Utc::now();
        // 50 samples spread evenly across [20, 40], approximating a uniform draw.
        for i in 0..50 {
            let v = 20.0 + (i as f64) * (20.0 / 49.0);
            store.push("S1", MetricKind::CpuUsage, now + Duration::seconds(i), v);
        }
        let anomaly = detect(&store, "S1", MetricKind::CpuUsage, 95.0, 3.0).expect("anomaly");
        assert_eq!(anomaly.severity, Severity::Critical);
        assert_eq!(anomaly.category, AnomalyCategory::Performance);
        assert!(anomaly.score >= 0.9);
        let (lo, hi) = anomaly.expected_range;
        assert!(lo < hi);
    }
}
