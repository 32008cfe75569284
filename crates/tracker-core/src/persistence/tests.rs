//! Persistence tests
//!
//! These tests verify:
//! - File snapshots survive a save/load cycle
//! - Damaged snapshots load whatever is still usable

use super::*;
use crate::models::{MeasurementSample, MetricKey, MetricReading};
use crate::tracker::{Phase, Registry, Settings};
use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;

fn create_test_sample(score: f64) -> MeasurementSample {
    let metrics = MetricKey::ALL
        .into_iter()
        .map(|key| (key, MetricReading { value: 1000.0 + score, score }))
        .collect();
    MeasurementSample {
        timestamp: Utc::now(),
        performance_score: score,
        metrics,
        source_fetch_time: Some(format!("fetch-{score}")),
    }
}

fn sample_json(score: f64) -> serde_json::Value {
    serde_json::to_value(create_test_sample(score)).unwrap()
}

fn create_test_registry() -> Registry {
    let mut registry = Registry::new(Settings {
        api_key: "secret".into(),
        poll_interval_secs: 90,
    });
    let tracker = registry
        .insert("https://example.com/".into(), Some("Home".into()))
        .unwrap();
    tracker.history.mobile.append(create_test_sample(81.0));
    tracker.history.mobile.append(create_test_sample(83.0));
    tracker.history.desktop.append(create_test_sample(97.0));
    tracker.auto_pause_armed = true;
    registry.insert("https://example.org/".into(), None);
    registry
}

mod file_store_tests {
    use super::*;

    #[test]
    fn test_missing_file_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("state.json"));
        let registry = create_test_registry();

        store.save(&registry.snapshot()).unwrap();
        assert!(!dir.path().join("nested").join("state.tmp").exists());

        let snapshot = store.load().unwrap().unwrap();
        assert_eq!(snapshot, registry.snapshot());

        let restored = Registry::from_snapshot(snapshot);
        let tracker = restored.get("https://example.com/").unwrap();
        assert_eq!(tracker.history().mobile.len(), 2);
        assert_eq!(tracker.history().desktop.len(), 1);
        assert!(tracker.auto_pause_armed());
        assert_eq!(restored.settings().api_key, "secret");
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(store.load().is_err());
    }
}

mod lenient_load_tests {
    use super::*;

    #[test]
    fn test_missing_fields_default() {
        let snapshot = RegistrySnapshot::from_value(&json!({
            "trackers": [{ "url": "https://example.com/" }]
        }));

        assert_eq!(snapshot.api_key, "");
        assert_eq!(snapshot.poll_interval_secs, 60);
        assert_eq!(snapshot.trackers.len(), 1);
        let record = &snapshot.trackers[0];
        assert!(!record.running);
        assert!(record.history.mobile.is_empty());
        assert_eq!(record.phase, Phase::Paused);
        assert_eq!(record.pause_reason, None);
    }

    #[test]
    fn test_malformed_and_duplicate_urls_dropped() {
        let snapshot = RegistrySnapshot::from_value(&json!({
            "apiKey": "k",
            "pollIntervalSecs": 10,
            "trackers": [
                { "url": "https://example.com", "label": "first", "running": true },
                { "url": "not a url" },
                { "label": "no url at all" },
                "garbage",
                { "url": "https://example.com/", "label": "second" },
                { "url": "https://example.net/", "running": "yes" }
            ],
            "order": ["https://example.net/", 42, "https://unknown.test/"],
            "baseline": "https://unknown.test/"
        }));
        assert_eq!(snapshot.poll_interval_secs, 60);

        let registry = Registry::from_snapshot(snapshot);

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.urls(),
            vec!["https://example.net/", "https://example.com/"]
        );
        let first = registry.get("https://example.com/").unwrap();
        assert_eq!(first.label(), Some("first"));
        assert!(first.is_running());
        assert!(!registry.get("https://example.net/").unwrap().is_running());
        assert_eq!(registry.baseline(), None);
    }

    #[test]
    fn test_bad_samples_skipped() {
        let mut incomplete = sample_json(70.0);
        incomplete["metrics"].as_object_mut().unwrap().remove("lcp");

        let snapshot = RegistrySnapshot::from_value(&json!({
            "trackers": [{
                "url": "https://example.com/",
                "history": {
                    "mobile": [sample_json(80.0), incomplete, { "timestamp": "yesterday" }, sample_json(82.0)],
                    "desktop": "not a list"
                },
                "phase": "somewhere-else",
                "pauseReason": "stat-sig-1",
                "autoPauseArmed": true
            }]
        }));

        let record = &snapshot.trackers[0];
        assert_eq!(record.history.mobile.len(), 2);
        assert!(record.history.desktop.is_empty());
        assert_eq!(record.phase, Phase::Paused);
        assert_eq!(record.pause_reason, Some(crate::tracker::PauseReason::StatSig1));
        assert!(record.auto_pause_armed);
    }

    #[test]
    fn test_memory_store_round_trip_through_json() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());

        let registry = create_test_registry();
        store.save(&registry.snapshot()).unwrap();

        let raw = store.raw().unwrap();
        assert_eq!(raw["trackers"][0]["url"], "https://example.com/");
        assert_eq!(raw["trackers"][0]["history"]["mobile"][0]["performanceScore"], 81.0);

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.trackers.len(), 2);
        assert_eq!(loaded.poll_interval_secs, 90);
    }
}
