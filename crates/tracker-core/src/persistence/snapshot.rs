//! Persisted registry snapshot
//!
//! Snapshots serialize with serde but are read back through a lenient path:
//! a damaged record or sample is skipped instead of failing the whole load.

use crate::models::MeasurementSample;
use crate::store::{History, SampleStore};
use crate::tracker::{
    PauseReason, Phase, SortState, StrategySet, Tracker, MIN_POLL_INTERVAL_SECS,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Everything needed to rebuild the registry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub api_key: String,
    pub poll_interval_secs: u64,
    pub trackers: Vec<TrackerRecord>,
    pub order: Vec<String>,
    pub baseline: Option<String>,
    pub sort: SortState,
}

impl Default for RegistrySnapshot {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            poll_interval_secs: MIN_POLL_INTERVAL_SECS,
            trackers: Vec::new(),
            order: Vec::new(),
            baseline: None,
            sort: SortState::default(),
        }
    }
}

/// Persisted state of one tracker
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerRecord {
    pub url: String,
    pub label: Option<String>,
    pub running: bool,
    pub history: History,
    pub last_error: Option<String>,
    pub phase: Phase,
    pub active_strategy: Option<StrategySet>,
    pub pause_reason: Option<PauseReason>,
    pub auto_pause_armed: bool,
}

impl TrackerRecord {
    pub fn from_tracker(tracker: &Tracker) -> Self {
        Self {
            url: tracker.url().to_string(),
            label: tracker.label().map(str::to_string),
            running: tracker.is_running(),
            history: tracker.history().clone(),
            last_error: tracker.last_error().map(str::to_string),
            phase: tracker.phase(),
            active_strategy: tracker.active_strategy(),
            pause_reason: tracker.pause_reason(),
            auto_pause_armed: tracker.auto_pause_armed(),
        }
    }

    /// Parse one record; `None` without a usable `url`
    fn from_value(value: &Value) -> Option<Self> {
        let url = value.get("url")?.as_str()?.trim().to_string();
        if url.is_empty() {
            return None;
        }

        let history = value.get("history");
        Some(Self {
            url,
            label: string_field(value, "label").filter(|l| !l.is_empty()),
            running: value.get("running").and_then(Value::as_bool).unwrap_or(false),
            history: History {
                mobile: parse_samples(history.and_then(|h| h.get("mobile"))),
                desktop: parse_samples(history.and_then(|h| h.get("desktop"))),
            },
            last_error: string_field(value, "lastError").filter(|e| !e.is_empty()),
            phase: typed_field(value, "phase").unwrap_or_default(),
            active_strategy: typed_field(value, "activeStrategy"),
            pause_reason: typed_field(value, "pauseReason"),
            auto_pause_armed: value
                .get("autoPauseArmed")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}

impl RegistrySnapshot {
    /// Lenient parse: missing fields default, unusable records are dropped
    pub fn from_value(value: &Value) -> Self {
        let defaults = Self::default();

        let trackers: Vec<TrackerRecord> = value
            .get("trackers")
            .and_then(Value::as_array)
            .map(|records| {
                records
                    .iter()
                    .filter_map(|record| {
                        let parsed = TrackerRecord::from_value(record);
                        if parsed.is_none() {
                            debug!("Dropping unreadable tracker record");
                        }
                        parsed
                    })
                    .collect()
            })
            .unwrap_or_default();

        let order = value
            .get("order")
            .and_then(Value::as_array)
            .map(|urls| {
                urls.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            api_key: string_field(value, "apiKey").unwrap_or(defaults.api_key),
            poll_interval_secs: value
                .get("pollIntervalSecs")
                .and_then(Value::as_u64)
                .unwrap_or(defaults.poll_interval_secs)
                .max(MIN_POLL_INTERVAL_SECS),
            trackers,
            order,
            baseline: string_field(value, "baseline").filter(|b| !b.is_empty()),
            sort: typed_field(value, "sort").unwrap_or_default(),
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(str::to_string)
}

fn typed_field<T: DeserializeOwned>(value: &Value, key: &str) -> Option<T> {
    let field = value.get(key)?;
    if field.is_null() {
        return None;
    }
    serde_json::from_value(field.clone()).ok()
}

/// Keep only samples that decode and carry all five metrics
fn parse_samples(value: Option<&Value>) -> SampleStore {
    let samples = value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<MeasurementSample>(item.clone()).ok())
                .filter(|sample| sample.is_complete() && sample.performance_score.is_finite())
                .collect()
        })
        .unwrap_or_default();
    SampleStore::from_samples(samples)
}
