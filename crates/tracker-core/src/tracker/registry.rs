//! Process-wide tracker registry
//!
//! Holds every tracker keyed by canonical URL plus the explicit display order
//! and the settings shared by all cycles. The scheduler wraps a registry in a
//! lock; nothing here is async.

use super::state::{Phase, Tracker};
use crate::models::MetricKey;
use crate::persistence::{RegistrySnapshot, TrackerRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Poll interval floor and default
pub const MIN_POLL_INTERVAL_SECS: u64 = 60;

/// Settings read by every cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub api_key: String,
    pub poll_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            poll_interval_secs: MIN_POLL_INTERVAL_SECS,
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Column the comparison view is sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortColumn {
    /// Explicit display order
    #[default]
    Order,
    Url,
    Score,
    Confidence,
    Samples,
    Metric(MetricKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortState {
    pub column: SortColumn,
    pub direction: SortDirection,
}

/// Parse and canonicalize a tracked URL; only http(s) with a host is accepted
pub fn normalize_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    Some(url.to_string())
}

#[derive(Debug, Default)]
pub struct Registry {
    trackers: HashMap<String, Tracker>,
    order: Vec<String>,
    settings: Settings,
    baseline: Option<String>,
    sort: SortState,
    next_id: u64,
}

impl Registry {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.trackers.contains_key(url)
    }

    pub fn get(&self, url: &str) -> Option<&Tracker> {
        self.trackers.get(url)
    }

    pub fn get_mut(&mut self, url: &str) -> Option<&mut Tracker> {
        self.trackers.get_mut(url)
    }

    /// Insert a new paused tracker; `None` if the URL is already tracked
    pub fn insert(&mut self, url: String, label: Option<String>) -> Option<&mut Tracker> {
        if self.trackers.contains_key(&url) {
            return None;
        }
        self.next_id += 1;
        let tracker = Tracker::new(self.next_id, url.clone(), label);
        self.order.push(url.clone());
        Some(self.trackers.entry(url).or_insert(tracker))
    }

    /// Remove a tracker, cancelling its pending timer
    pub fn remove(&mut self, url: &str) -> Option<Tracker> {
        let mut tracker = self.trackers.remove(url)?;
        tracker.cancel_timer();
        self.order.retain(|u| u != url);
        if self.baseline.as_deref() == Some(url) {
            self.baseline = None;
        }
        Some(tracker)
    }

    /// Tracked URLs in display order
    pub fn urls(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Trackers in display order
    pub fn iter(&self) -> impl Iterator<Item = &Tracker> {
        self.order.iter().filter_map(|url| self.trackers.get(url))
    }

    /// Move a tracker to `index` in the display order (clamped)
    pub fn move_to(&mut self, url: &str, index: usize) -> bool {
        let Some(position) = self.order.iter().position(|u| u == url) else {
            return false;
        };
        let entry = self.order.remove(position);
        let index = index.min(self.order.len());
        self.order.insert(index, entry);
        true
    }

    pub fn baseline(&self) -> Option<&str> {
        self.baseline.as_deref()
    }

    /// Select the baseline; must name a tracked URL
    pub fn set_baseline(&mut self, url: Option<String>) -> bool {
        match url {
            Some(url) if !self.trackers.contains_key(&url) => false,
            other => {
                self.baseline = other;
                true
            }
        }
    }

    pub fn sort(&self) -> SortState {
        self.sort
    }

    pub fn set_sort(&mut self, sort: SortState) {
        self.sort = sort;
    }

    /// Capture the persistable state
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            api_key: self.settings.api_key.clone(),
            poll_interval_secs: self.settings.poll_interval_secs,
            trackers: self.iter().map(TrackerRecord::from_tracker).collect(),
            order: self.order.clone(),
            baseline: self.baseline.clone(),
            sort: self.sort,
        }
    }

    /// Rebuild from a snapshot
    ///
    /// Duplicate URLs keep the first record. Phases that only make sense while
    /// a cycle is live are not trusted: running trackers come back queued and
    /// must be resumed by the scheduler.
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        let mut registry = Registry::new(Settings {
            api_key: snapshot.api_key,
            poll_interval_secs: snapshot.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS),
        });

        let mut loaded = Vec::new();
        for record in snapshot.trackers {
            let Some(url) = normalize_url(&record.url) else {
                continue;
            };
            if registry.trackers.contains_key(&url) {
                continue;
            }
            registry.next_id += 1;
            let mut tracker = Tracker::new(registry.next_id, url.clone(), record.label);
            tracker.running = record.running;
            tracker.phase = if record.running {
                Phase::Queued
            } else {
                Phase::Paused
            };
            tracker.history = record.history;
            tracker.last_error = record.last_error;
            tracker.pause_reason = record.pause_reason;
            tracker.auto_pause_armed = record.auto_pause_armed;
            registry.trackers.insert(url.clone(), tracker);
            loaded.push(url);
        }

        let mut order: Vec<String> = Vec::with_capacity(loaded.len());
        for url in snapshot.order.iter().filter_map(|u| normalize_url(u)) {
            if registry.trackers.contains_key(&url) && !order.contains(&url) {
                order.push(url);
            }
        }
        for url in loaded {
            if !order.contains(&url) {
                order.push(url);
            }
        }
        registry.order = order;

        registry.baseline = snapshot
            .baseline
            .and_then(|u| normalize_url(&u))
            .filter(|u| registry.trackers.contains_key(u));
        registry.sort = snapshot.sort;

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url(" https://Example.com ").as_deref(),
            Some("https://example.com/")
        );
        assert_eq!(normalize_url("not a url"), None);
        assert_eq!(normalize_url("ftp://example.com/"), None);
        assert_eq!(normalize_url("mailto:someone@example.com"), None);
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut registry = Registry::default();
        assert!(registry.insert("https://a.test/".into(), None).is_some());
        assert!(registry.insert("https://a.test/".into(), None).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_clears_order_and_baseline() {
        let mut registry = Registry::default();
        registry.insert("https://a.test/".into(), None);
        registry.insert("https://b.test/".into(), None);
        assert!(registry.set_baseline(Some("https://a.test/".into())));

        assert!(registry.remove("https://a.test/").is_some());
        assert_eq!(registry.urls(), vec!["https://b.test/".to_string()]);
        assert_eq!(registry.baseline(), None);
        assert!(registry.remove("https://a.test/").is_none());
    }

    #[test]
    fn test_move_to_reorders() {
        let mut registry = Registry::default();
        for url in ["https://a.test/", "https://b.test/", "https://c.test/"] {
            registry.insert(url.into(), None);
        }

        assert!(registry.move_to("https://c.test/", 0));
        assert_eq!(
            registry.urls(),
            vec!["https://c.test/", "https://a.test/", "https://b.test/"]
        );
        assert!(registry.move_to("https://c.test/", 99));
        assert_eq!(registry.urls()[2], "https://c.test/");
        assert!(!registry.move_to("https://missing.test/", 0));
    }

    #[test]
    fn test_baseline_must_be_tracked() {
        let mut registry = Registry::default();
        assert!(!registry.set_baseline(Some("https://a.test/".into())));
        assert!(registry.set_baseline(None));
    }

    #[test]
    fn test_poll_interval_floor() {
        let settings = Settings {
            api_key: "k".into(),
            poll_interval_secs: 5,
        };
        assert_eq!(settings.poll_interval(), Duration::from_secs(60));
        assert!(settings.has_api_key());
        assert!(!Settings::default().has_api_key());
    }

    #[test]
    fn test_snapshot_restore_keeps_order_and_running() {
        let mut registry = Registry::new(Settings {
            api_key: "key".into(),
            poll_interval_secs: 120,
        });
        registry.insert("https://a.test/".into(), Some("A".into()));
        registry.insert("https://b.test/".into(), None);
        registry.move_to("https://b.test/", 0);
        registry.get_mut("https://a.test/").unwrap().start();
        registry.set_baseline(Some("https://a.test/".into()));

        let restored = Registry::from_snapshot(registry.snapshot());

        assert_eq!(restored.urls(), vec!["https://b.test/", "https://a.test/"]);
        assert_eq!(restored.settings().poll_interval_secs, 120);
        assert_eq!(restored.baseline(), Some("https://a.test/"));
        let a = restored.get("https://a.test/").unwrap();
        assert!(a.is_running());
        assert_eq!(a.phase(), Phase::Queued);
        assert_eq!(a.label(), Some("A"));
        assert_eq!(restored.get("https://b.test/").unwrap().phase(), Phase::Paused);
    }
}
