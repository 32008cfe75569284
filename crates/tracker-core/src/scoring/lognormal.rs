//! Log-normal scoring curve math
//!
//! A metric curve is a log-normal distribution fixed by its median and either
//! its 10th percentile (`p10`) or its point of diminishing returns (`podr`).
//! The score of a value is the complementary percentile of that value on the
//! curve, so lower values score higher.

use statrs::function::erf::erf;
use std::f64::consts::SQRT_2;

/// erfc^-1(1/5), i.e. the standardized distance of the 10th percentile
const INVERSE_ERFC_ONE_FIFTH: f64 = 0.906_193_802_436_823_2;

/// Smallest value fed into the logarithm
pub const VALUE_FLOOR: f64 = f64::MIN_POSITIVE;

/// Derive the point of diminishing returns from the median and 10th percentile
pub fn derive_podr(median: f64, p10: f64) -> f64 {
    let location = median.ln();
    let shape = (p10.ln() - location).abs() / (SQRT_2 * INVERSE_ERFC_ONE_FIFTH);
    let inner = -3.0 * shape - (4.0 + shape * shape).sqrt();
    (location + (shape / 2.0) * inner).exp()
}

/// Shape (sigma) of the log-normal whose maximal-curvature point sits at `podr`
pub fn shape_from_podr(median: f64, podr: f64) -> f64 {
    let log_ratio = (podr / median).ln();
    let discriminant = (log_ratio - 3.0).powi(2) - 8.0;
    (1.0 - 3.0 * log_ratio - discriminant.sqrt()).sqrt() / 2.0
}

/// Upper-tail probability of `value`, clamped to [0, 1]
pub fn complementary_percentile(median: f64, podr: f64, value: f64) -> f64 {
    let location = median.ln();
    let shape = shape_from_podr(median, podr);
    let standardized = (value.max(VALUE_FLOOR).ln() - location) / (SQRT_2 * shape);
    ((1.0 - erf(standardized)) / 2.0).clamp(0.0, 1.0)
}
