//! Core data models for the tracker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Measurement profile requested from the upstream API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Mobile,
    Desktop,
}

impl Strategy {
    pub const ALL: [Strategy; 2] = [Strategy::Mobile, Strategy::Desktop];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Mobile => "mobile",
            Strategy::Desktop => "desktop",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mobile" => Ok(Strategy::Mobile),
            "desktop" => Ok(Strategy::Desktop),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// Lab metrics that make up the performance score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKey {
    Fcp,
    Si,
    Lcp,
    Tbt,
    Cls,
}

impl MetricKey {
    pub const ALL: [MetricKey; 5] = [
        MetricKey::Fcp,
        MetricKey::Si,
        MetricKey::Lcp,
        MetricKey::Tbt,
        MetricKey::Cls,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::Fcp => "fcp",
            MetricKey::Si => "si",
            MetricKey::Lcp => "lcp",
            MetricKey::Tbt => "tbt",
            MetricKey::Cls => "cls",
        }
    }

    /// Lighthouse audit id carrying this metric
    pub fn audit_id(&self) -> &'static str {
        match self {
            MetricKey::Fcp => "first-contentful-paint",
            MetricKey::Si => "speed-index",
            MetricKey::Lcp => "largest-contentful-paint",
            MetricKey::Tbt => "total-blocking-time",
            MetricKey::Cls => "cumulative-layout-shift",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MetricKey::Fcp => "FCP",
            MetricKey::Si => "SI",
            MetricKey::Lcp => "LCP",
            MetricKey::Tbt => "TBT",
            MetricKey::Cls => "CLS",
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown metric: {s}"))
    }
}

/// Raw value and upstream score (0-100) for a single metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    pub value: f64,
    pub score: f64,
}

/// One completed probe result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementSample {
    pub timestamp: DateTime<Utc>,
    pub performance_score: f64,
    pub metrics: BTreeMap<MetricKey, MetricReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_fetch_time: Option<String>,
}

impl MeasurementSample {
    /// Reading for a metric; every stored sample carries all five
    pub fn metric(&self, key: MetricKey) -> Option<&MetricReading> {
        self.metrics.get(&key)
    }

    /// Whether every required metric is present
    pub fn is_complete(&self) -> bool {
        MetricKey::ALL.iter().all(|key| self.metrics.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_roundtrip_names() {
        assert_eq!("mobile".parse::<Strategy>().unwrap(), Strategy::Mobile);
        assert_eq!(Strategy::Desktop.to_string(), "desktop");
        assert!("tablet".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_metric_key_serializes_lowercase() {
        let json = serde_json::to_string(&MetricKey::Lcp).unwrap();
        assert_eq!(json, "\"lcp\"");
        assert_eq!("tbt".parse::<MetricKey>().unwrap(), MetricKey::Tbt);
    }

    #[test]
    fn test_sample_completeness() {
        let mut metrics = BTreeMap::new();
        for key in MetricKey::ALL {
            metrics.insert(key, MetricReading { value: 1.0, score: 100.0 });
        }
        let mut sample = MeasurementSample {
            timestamp: Utc::now(),
            performance_score: 99.0,
            metrics,
            source_fetch_time: None,
        };
        assert!(sample.is_complete());

        sample.metrics.remove(&MetricKey::Cls);
        assert!(!sample.is_complete());
    }
}
