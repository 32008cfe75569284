//! Sample statistics
//!
//! Pure functions over score sequences plus the on-demand [`Summary`] view of
//! a sample log. Summaries are never persisted.

use crate::models::{MeasurementSample, MetricKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// z-value for a two-sided 95% interval
pub const Z_95: f64 = 1.96;

/// Arithmetic mean, `0.0` for empty input
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Bessel-corrected standard deviation, `0.0` for fewer than two values
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let average = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - average).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Half-width of the 95% confidence interval around the mean
pub fn ci95_half_width(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let standard_error = sample_std_dev(values) / (values.len() as f64).sqrt();
    Some(Z_95 * standard_error)
}

/// Mean-rank percentile of `value` within `population` (ties split evenly)
///
/// Returns `0` for an empty population and `100` for a singleton.
pub fn percentile_rank(population: &[f64], value: f64) -> f64 {
    match population.len() {
        0 => return 0.0,
        1 => return 100.0,
        _ => {}
    }

    let (lower, equal) = population.iter().fold((0usize, 0usize), |(lower, equal), &p| {
        if p < value {
            (lower + 1, equal)
        } else if p == value {
            (lower, equal + 1)
        } else {
            (lower, equal)
        }
    });

    (lower as f64 + 0.5 * equal as f64) / population.len() as f64 * 100.0
}

/// Mean raw value and mean upstream score for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub mean_value: f64,
    pub mean_score: f64,
}

/// Statistical snapshot of a sample log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub samples: usize,
    pub mean_score: f64,
    pub std_dev: f64,
    pub ci95_half_width: Option<f64>,
    pub latest_timestamp: DateTime<Utc>,
    pub metrics: BTreeMap<MetricKey, MetricSummary>,
}

/// Summarize a slice of samples; `None` when empty
pub fn summarize(samples: &[MeasurementSample]) -> Option<Summary> {
    let latest = samples.last()?;
    let scores: Vec<f64> = samples.iter().map(|s| s.performance_score).collect();

    let metrics = MetricKey::ALL
        .into_iter()
        .map(|key| {
            let (values, metric_scores): (Vec<f64>, Vec<f64>) = samples
                .iter()
                .filter_map(|s| s.metric(key))
                .map(|reading| (reading.value, reading.score))
                .unzip();
            (
                key,
                MetricSummary {
                    mean_value: mean(&values),
                    mean_score: mean(&metric_scores),
                },
            )
        })
        .collect();

    Some(Summary {
        samples: samples.len(),
        mean_score: mean(&scores),
        std_dev: sample_std_dev(&scores),
        ci95_half_width: ci95_half_width(&scores),
        latest_timestamp: latest.timestamp,
        metrics,
    })
}
