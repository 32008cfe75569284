//! Append-only sample logs
//!
//! Each tracker owns one [`SampleStore`] per strategy. A sample is refused
//! only when it repeats the latest one, as happens when the upstream API
//! serves a cached result.

use crate::models::{MeasurementSample, MetricKey, Strategy};
use crate::stats::{self, Summary};
use serde::{Deserialize, Serialize};

/// Whether `next` repeats `previous`
///
/// When both samples carry an upstream fetch timestamp, it decides alone.
/// Otherwise every metric value and score plus the overall score must be
/// bit-identical.
pub fn is_duplicate(previous: &MeasurementSample, next: &MeasurementSample) -> bool {
    let fetch_time = |s: &MeasurementSample| {
        s.source_fetch_time
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
    };

    if let (Some(a), Some(b)) = (fetch_time(previous), fetch_time(next)) {
        return a == b;
    }

    if previous.performance_score.to_bits() != next.performance_score.to_bits() {
        return false;
    }

    MetricKey::ALL.iter().all(|key| {
        match (previous.metric(*key), next.metric(*key)) {
            (Some(a), Some(b)) => {
                a.value.to_bits() == b.value.to_bits() && a.score.to_bits() == b.score.to_bits()
            }
            (None, None) => true,
            _ => false,
        }
    })
}

/// Result of offering a sample to a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    Duplicate,
}

/// Insertion-ordered log of samples for one (url, strategy)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleStore {
    samples: Vec<MeasurementSample>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from an already-ordered log
    pub fn from_samples(samples: Vec<MeasurementSample>) -> Self {
        Self { samples }
    }

    /// Append unless the sample repeats the latest one
    pub fn append(&mut self, sample: MeasurementSample) -> AppendOutcome {
        if let Some(last) = self.samples.last() {
            if is_duplicate(last, &sample) {
                return AppendOutcome::Duplicate;
            }
        }
        self.samples.push(sample);
        AppendOutcome::Appended
    }

    pub fn samples(&self) -> &[MeasurementSample] {
        &self.samples
    }

    pub fn latest(&self) -> Option<&MeasurementSample> {
        self.samples.last()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn scores(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.performance_score).collect()
    }

    pub fn summary(&self) -> Option<Summary> {
        stats::summarize(&self.samples)
    }

    pub fn ci95_half_width(&self) -> Option<f64> {
        stats::ci95_half_width(&self.scores())
    }
}

/// Both strategy logs of a tracker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    #[serde(default)]
    pub mobile: SampleStore,
    #[serde(default)]
    pub desktop: SampleStore,
}

impl History {
    pub fn get(&self, strategy: Strategy) -> &SampleStore {
        match strategy {
            Strategy::Mobile => &self.mobile,
            Strategy::Desktop => &self.desktop,
        }
    }

    pub fn get_mut(&mut self, strategy: Strategy) -> &mut SampleStore {
        match strategy {
            Strategy::Mobile => &mut self.mobile,
            Strategy::Desktop => &mut self.desktop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricReading;
    use chrono::Utc;

    fn sample(score: f64, fetch_time: Option<&str>) -> MeasurementSample {
        let metrics = MetricKey::ALL
            .into_iter()
            .map(|key| (key, MetricReading { value: 1500.0, score: 88.0 }))
            .collect();
        MeasurementSample {
            timestamp: Utc::now(),
            performance_score: score,
            metrics,
            source_fetch_time: fetch_time.map(str::to_string),
        }
    }

    #[test]
    fn test_same_fetch_time_is_duplicate() {
        let previous = sample(80.0, Some("T1"));
        let mut next = sample(80.0, Some("T1"));
        next.timestamp = previous.timestamp + chrono::Duration::seconds(60);
        assert!(is_duplicate(&previous, &next));
    }

    #[test]
    fn test_different_fetch_time_is_not_duplicate() {
        let previous = sample(80.0, Some("T1"));
        let next = sample(80.0, Some("T2"));
        assert!(!is_duplicate(&previous, &next));
    }

    #[test]
    fn test_identical_fields_without_fetch_time() {
        let previous = sample(80.0, None);
        let next = sample(80.0, None);
        assert!(is_duplicate(&previous, &next));
    }

    #[test]
    fn test_changed_metric_without_fetch_time() {
        let previous = sample(80.0, None);
        let mut next = sample(80.0, None);
        next.metrics.insert(MetricKey::Tbt, MetricReading { value: 1500.5, score: 88.0 });
        assert!(!is_duplicate(&previous, &next));

        let mut rescored = sample(80.0, None);
        rescored.metrics.insert(MetricKey::Cls, MetricReading { value: 1500.0, score: 87.0 });
        assert!(!is_duplicate(&previous, &rescored));
    }

    #[test]
    fn test_empty_fetch_time_falls_back_to_fields() {
        let previous = sample(80.0, Some(""));
        let next = sample(81.0, Some(""));
        assert!(!is_duplicate(&previous, &next));
        assert!(is_duplicate(&previous, &sample(80.0, Some(""))));
    }

    #[test]
    fn test_store_drops_duplicates_silently() {
        let mut store = SampleStore::new();
        assert_eq!(store.append(sample(80.0, Some("T1"))), AppendOutcome::Appended);
        assert_eq!(store.append(sample(80.0, Some("T1"))), AppendOutcome::Duplicate);
        assert_eq!(store.append(sample(82.0, Some("T2"))), AppendOutcome::Appended);
        assert_eq!(store.len(), 2);
        assert_eq!(store.scores(), vec![80.0, 82.0]);
    }

    #[test]
    fn test_store_only_compares_latest() {
        let mut store = SampleStore::new();
        store.append(sample(80.0, None));
        store.append(sample(90.0, None));
        assert_eq!(store.append(sample(80.0, None)), AppendOutcome::Appended);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_history_serializes_as_plain_arrays() {
        let mut history = History::default();
        history.mobile.append(sample(75.0, None));
        let json = serde_json::to_value(&history).unwrap();
        assert!(json["mobile"].is_array());
        assert_eq!(json["desktop"].as_array().unwrap().len(), 0);
    }
}
