//! Metric scoring
//!
//! Converts raw metric values into Lighthouse-style scores and weighted
//! point contributions using per-strategy log-normal curves.

mod curves;
mod lognormal;

pub use curves::{default_curves, CurveControl, MetricCurve};
pub use lognormal::{complementary_percentile, derive_podr, shape_from_podr, VALUE_FLOOR};

use crate::models::{MetricKey, Strategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Score and weighted points for one metric value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    /// 0-100
    pub score: f64,
    pub points: f64,
    pub max_points: f64,
}

/// Scoring curves keyed by (strategy, metric)
#[derive(Debug, Clone)]
pub struct ScoringModel {
    curves: HashMap<(Strategy, MetricKey), MetricCurve>,
}

impl Default for ScoringModel {
    fn default() -> Self {
        let curves = Strategy::ALL
            .into_iter()
            .flat_map(|strategy| {
                default_curves(strategy).map(move |(key, curve)| ((strategy, key), curve))
            })
            .collect();
        Self { curves }
    }
}

impl ScoringModel {
    /// A model with no curves
    pub fn empty() -> Self {
        Self {
            curves: HashMap::new(),
        }
    }

    /// Replace or add the curve for (strategy, metric)
    pub fn with_curve(mut self, strategy: Strategy, key: MetricKey, curve: MetricCurve) -> Self {
        self.curves.insert((strategy, key), curve);
        self
    }

    pub fn curve(&self, strategy: Strategy, key: MetricKey) -> Option<&MetricCurve> {
        self.curves.get(&(strategy, key))
    }

    /// Sum of the configured weights for a strategy
    pub fn total_weight(&self, strategy: Strategy) -> f64 {
        self.curves
            .iter()
            .filter(|((s, _), _)| *s == strategy)
            .map(|(_, curve)| curve.weight)
            .sum()
    }

    /// Score contribution of `value`; `None` without a curve or for non-finite values
    pub fn contribution(&self, strategy: Strategy, key: MetricKey, value: f64) -> Option<Contribution> {
        let curve = self.curve(strategy, key)?;
        if !value.is_finite() {
            return None;
        }

        let value = value.max(VALUE_FLOOR);
        let score = 100.0 * complementary_percentile(curve.median, curve.podr(), value);
        let max_points = curve.weight * 100.0;

        Some(Contribution {
            score,
            points: score / 100.0 * max_points,
            max_points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_values_score_higher() {
        let model = ScoringModel::default();
        let fast = model.contribution(Strategy::Mobile, MetricKey::Lcp, 1200.0).unwrap();
        let slow = model.contribution(Strategy::Mobile, MetricKey::Lcp, 4000.0).unwrap();
        assert!(fast.score >= slow.score);
        assert!((slow.score - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_contribution_monotone_for_all_metrics() {
        let model = ScoringModel::default();
        for strategy in Strategy::ALL {
            for key in MetricKey::ALL {
                let median = model.curve(strategy, key).unwrap().median;
                let mut previous = f64::INFINITY;
                for step in 0..40 {
                    let value = median * step as f64 / 10.0;
                    let score = model.contribution(strategy, key, value).unwrap().score;
                    assert!(score <= previous + 1e-12, "{strategy}/{key} at {value}");
                    previous = score;
                }
            }
        }
    }

    #[test]
    fn test_points_scale_with_weight() {
        let model = ScoringModel::default();
        let tbt = model.contribution(Strategy::Desktop, MetricKey::Tbt, 350.0).unwrap();
        assert!((tbt.max_points - 30.0).abs() < 1e-9);
        assert!((tbt.points - 15.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_is_floored_not_rejected() {
        let model = ScoringModel::default();
        let cls = model.contribution(Strategy::Mobile, MetricKey::Cls, 0.0).unwrap();
        assert!((cls.score - 100.0).abs() < 1e-9);
        assert!((cls.points - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_and_missing_curve() {
        let model = ScoringModel::default();
        assert!(model.contribution(Strategy::Mobile, MetricKey::Fcp, f64::NAN).is_none());
        assert!(model.contribution(Strategy::Mobile, MetricKey::Fcp, f64::INFINITY).is_none());

        let empty = ScoringModel::empty();
        assert!(empty.contribution(Strategy::Mobile, MetricKey::Fcp, 1000.0).is_none());
    }

    #[test]
    fn test_default_weights_per_strategy() {
        let model = ScoringModel::default();
        for strategy in Strategy::ALL {
            assert!((model.total_weight(strategy) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_custom_curve_replaces_default() {
        let model = ScoringModel::default().with_curve(
            Strategy::Mobile,
            MetricKey::Fcp,
            MetricCurve::with_p10(0.10, 2000.0, 1000.0),
        );
        let at_median = model.contribution(Strategy::Mobile, MetricKey::Fcp, 2000.0).unwrap();
        assert!((at_median.score - 50.0).abs() < 1e-6);
    }
}
