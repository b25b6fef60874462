//! Trend analysis: linear regression, variance, and direction classification (§4.6).

use station_common::{TrendAnalysis, TrendDirection};
use station_ingest::Sample;

/// Build a `TrendAnalysis` from a time-ordered window of samples. Returns
/// `None` for an empty window (callers should treat this the same as
/// `DataInsufficient`).
pub fn analyze(samples: &[Sample]) -> Option<TrendAnalysis> {
    if samples.is_empty() {
        return None;
    }

    let count = samples.len();
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    let mean = values.iter().sum::<f64>() / count as f64;
    let variance = if count > 1 {
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64
    } else {
        0.0
    };
    let std = variance.sqrt();
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let first_ts = samples[0].timestamp;
    let hours: Vec<f64> = samples
        .iter()
        .map(|s| (s.timestamp - first_ts).num_milliseconds() as f64 / 3_600_000.0)
        .collect();

    let (slope, r_squared) = least_squares(&hours, &values);

    let cv = if mean.abs() > 1e-10 { std / mean.abs() } else { 0.0 };
    let direction = if cv > 0.2 {
        TrendDirection::Erratic
    } else if slope.abs() < 0.1 {
        TrendDirection::Stable
    } else if slope > 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    };

    Some(TrendAnalysis {
        mean,
        std,
        min,
        max,
        count,
        slope,
        r_squared,
        direction,
    })
}

/// Ordinary least squares fit of `y` against `x`. Returns `(slope, r_squared)`.
fn least_squares(x: &[f64], y: &[f64]) -> (f64, f64) {
    let n = x.len() as f64;
    if x.len() < 2 {
        return (0.0, 0.0);
    }

    let x_mean = x.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;

    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        ss_xy += (xi - x_mean) * (yi - y_mean);
        ss_xx += (xi - x_mean).powi(2);
    }

    if ss_xx.abs() < 1e-12 {
        return (0.0, 0.0);
    }

    let slope = ss_xy / ss_xx;
    let intercept = y_mean - slope * x_mean;

    let ss_tot: f64 = y.iter().map(|yi| (yi - y_mean).powi(2)).sum();
    let ss_res: f64 = x
        .iter()
        .zip(y.iter())
        .map(|(xi, yi)| {
            let predicted = slope * xi + intercept;
            (yi - predicted).powi(2)
        })
        .sum();

    let r_squared = if ss_tot.abs() < 1e-12 {
        1.0
    } else {
        1.0 - ss_res / ss_tot
    };

    (slope, r_squared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn samples_with_values(values: &[f64]) -> Vec<Sample> {
        let base = Utc::now();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample {
                timestamp: base + Duration::hours(i as i64),
                value: v,
            })
            .collect()
    }

    #[test]
    fn empty_window_yields_no_trend() {
        assert!(analyze(&[]).is_none());
    }

    #[test]
    fn linearly_declining_series_is_decreasing_with_fitted_slope() {
        let values: Vec<f64> = (0..24).map(|i| 3000.0 - i as f64 * 87.5).collect();
        let trend = analyze(&samples_with_values(&values)).unwrap();
        assert_eq!(trend.direction, TrendDirection::Decreasing);
        assert!((trend.slope - (-87.5)).abs() < 1.0);
        assert!(trend.r_squared > 0.99);
    }

    #[test]
    fn flat_series_is_stable() {
        let values = vec![50.0; 40];
        let trend = analyze(&samples_with_values(&values)).unwrap();
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert!(trend.slope.abs() < 0.1);
    }

    #[test]
    fn high_coefficient_of_variation_is_erratic() {
        let values = vec![10.0, 90.0, 5.0, 95.0, 2.0, 88.0, 12.0, 91.0];
        let trend = analyze(&samples_with_values(&values)).unwrap();
        assert_eq!(trend.direction, TrendDirection::Erratic);
    }
}
