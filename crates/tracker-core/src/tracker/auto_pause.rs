//! Confidence-based stopping rule
//!
//! A tracker stops polling once both strategies have a 95% interval no wider
//! than the threshold. The rule only fires after it has been armed by seeing
//! at least one interval above the threshold, so a lucky pair of early
//! samples with near-zero spread cannot end exploration immediately.

use serde::{Deserialize, Serialize};

/// Tight interval threshold in score points
pub const STAT_SIG_THRESHOLD: f64 = 1.0;

/// Why a tracker was paused automatically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PauseReason {
    /// Both intervals reached the tight threshold
    #[serde(rename = "stat-sig-1")]
    StatSig1,
}

impl PauseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PauseReason::StatSig1 => "stat-sig-1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoPauseRule {
    pub threshold: f64,
}

impl Default for AutoPauseRule {
    fn default() -> Self {
        Self {
            threshold: STAT_SIG_THRESHOLD,
        }
    }
}

impl AutoPauseRule {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Evaluate one completed cycle; returns true when polling should stop
    ///
    /// `armed` latches on any interval above the threshold and is reset when
    /// the rule fires.
    pub fn evaluate(&self, armed: &mut bool, mobile: Option<f64>, desktop: Option<f64>) -> bool {
        let above = |ci: Option<f64>| ci.is_some_and(|w| w > self.threshold);
        if above(mobile) || above(desktop) {
            *armed = true;
        }

        let tight = |ci: Option<f64>| ci.is_some_and(|w| w <= self.threshold);
        if *armed && tight(mobile) && tight(desktop) {
            *armed = false;
            return true;
        }

        false
    }
}
