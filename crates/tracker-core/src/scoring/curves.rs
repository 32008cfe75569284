//! Scoring curve table
//!
//! Weights, medians and 10th percentiles follow the Lighthouse 10 scoring
//! calibration for each strategy.

use crate::models::{MetricKey, Strategy};
use serde::{Deserialize, Serialize};

/// Second parameter of a log-normal curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveControl {
    /// Value that scores 90
    P10(f64),
    /// Precomputed point of diminishing returns
    Podr(f64),
}

/// Log-normal scoring parameters for one (strategy, metric)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricCurve {
    /// Fraction of the 100 performance points
    pub weight: f64,
    pub median: f64,
    pub control: CurveControl,
}

impl MetricCurve {
    pub const fn with_p10(weight: f64, median: f64, p10: f64) -> Self {
        Self {
            weight,
            median,
            control: CurveControl::P10(p10),
        }
    }

    pub const fn with_podr(weight: f64, median: f64, podr: f64) -> Self {
        Self {
            weight,
            median,
            control: CurveControl::Podr(podr),
        }
    }

    pub fn podr(&self) -> f64 {
        match self.control {
            CurveControl::Podr(podr) => podr,
            CurveControl::P10(p10) => super::lognormal::derive_podr(self.median, p10),
        }
    }
}

/// Curve table entries as (metric, weight, median, p10)
const MOBILE: [(MetricKey, f64, f64, f64); 5] = [
    (MetricKey::Fcp, 0.10, 3000.0, 1800.0),
    (MetricKey::Si, 0.10, 5800.0, 3387.0),
    (MetricKey::Lcp, 0.25, 4000.0, 2500.0),
    (MetricKey::Tbt, 0.30, 600.0, 200.0),
    (MetricKey::Cls, 0.25, 0.25, 0.1),
];

const DESKTOP: [(MetricKey, f64, f64, f64); 5] = [
    (MetricKey::Fcp, 0.10, 1600.0, 934.0),
    (MetricKey::Si, 0.10, 2300.0, 1311.0),
    (MetricKey::Lcp, 0.25, 2400.0, 1200.0),
    (MetricKey::Tbt, 0.30, 350.0, 150.0),
    (MetricKey::Cls, 0.25, 0.25, 0.1),
];

/// Default curves for a strategy
pub fn default_curves(strategy: Strategy) -> impl Iterator<Item = (MetricKey, MetricCurve)> {
    let table = match strategy {
        Strategy::Mobile => MOBILE,
        Strategy::Desktop => DESKTOP,
    };
    table
        .into_iter()
        .map(|(key, weight, median, p10)| (key, MetricCurve::with_p10(weight, median, p10)))
}
