//! Async driver for the tracker registry
//!
//! Every tracker gets at most one sleeping timer task, cancelled through the
//! token stored on the tracker. A cycle runs its one or two probes
//! concurrently, waits out the upstream cooldown, then merges the results
//! back under the registry lock. Probes are never cancelled: a tracker that
//! is stopped mid-cycle still records what comes back.

use super::auto_pause::AutoPauseRule;
use super::registry::{normalize_url, Registry, Settings, SortState, MIN_POLL_INTERVAL_SECS};
use super::state::{
    Completion, CycleContext, CycleReport, CycleStart, Phase, PendingTimer, ProbeOutcome,
    StrategySet, TrackerView,
};
use crate::health::HealthRegistry;
use crate::models::Strategy;
use crate::observability::{StructuredLogger, TrackerMetrics};
use crate::persistence::SnapshotStore;
use crate::probe::Probe;
use crate::report::{build_report, ComparisonReport};
use crate::scoring::ScoringModel;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Pause between the settled probes of a cycle and its completion
pub const DEFAULT_PROBE_COOLDOWN: Duration = Duration::from_millis(1200);

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error, PartialEq)]
pub enum SchedulerError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL is already tracked: {0}")]
    AlreadyTracked(String),

    #[error("Unknown tracker: {0}")]
    NotFound(String),

    #[error("Poll interval must be at least {MIN_POLL_INTERVAL_SECS} seconds, got {0}")]
    InvalidInterval(u64),

    #[error("Missing API key.")]
    MissingApiKey,

    #[error("Baseline must be a tracked URL: {0}")]
    InvalidBaseline(String),
}

/// Tuning for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub probe_cooldown: Duration,
    pub auto_pause: AutoPauseRule,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            probe_cooldown: DEFAULT_PROBE_COOLDOWN,
            auto_pause: AutoPauseRule::default(),
        }
    }
}

/// Notable things that happen to trackers, published on a broadcast channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TrackerEvent {
    CycleStarted {
        url: String,
        strategies: StrategySet,
    },
    SampleRecorded {
        url: String,
        strategy: Strategy,
    },
    DuplicateDropped {
        url: String,
        strategy: Strategy,
    },
    ProbeFailed {
        url: String,
        strategy: Strategy,
        error: String,
    },
    CycleCompleted {
        url: String,
        next_run_at: Option<DateTime<Utc>>,
    },
    AutoPaused {
        url: String,
    },
    MissingApiKey {
        url: String,
    },
}

struct Inner {
    registry: RwLock<Registry>,
    probe: Arc<dyn Probe>,
    store: Arc<dyn SnapshotStore>,
    scoring: ScoringModel,
    config: SchedulerConfig,
    health: HealthRegistry,
    metrics: TrackerMetrics,
    logger: StructuredLogger,
    events: broadcast::Sender<TrackerEvent>,
    persist_lock: Mutex<()>,
}

/// Cheaply cloneable handle shared by the API and the timer tasks
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        registry: Registry,
        probe: Arc<dyn Probe>,
        store: Arc<dyn SnapshotStore>,
        config: SchedulerConfig,
        health: HealthRegistry,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                registry: RwLock::new(registry),
                probe,
                store,
                scoring: ScoringModel::default(),
                config,
                health,
                metrics: TrackerMetrics::new(),
                logger: StructuredLogger::new("scheduler"),
                events,
                persist_lock: Mutex::new(()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.inner.events.subscribe()
    }

    pub async fn settings(&self) -> Settings {
        self.inner.registry.read().await.settings().clone()
    }

    pub async fn views(&self) -> Vec<TrackerView> {
        let registry = self.inner.registry.read().await;
        registry.iter().map(|t| t.view()).collect()
    }

    pub async fn view(&self, url: &str) -> Result<TrackerView, SchedulerError> {
        let key = canonical(url)?;
        let registry = self.inner.registry.read().await;
        registry
            .get(&key)
            .map(|t| t.view())
            .ok_or(SchedulerError::NotFound(key))
    }

    pub async fn report(&self) -> ComparisonReport {
        let registry = self.inner.registry.read().await;
        build_report(&registry, &self.inner.scoring)
    }

    /// Track a new URL; the tracker starts paused
    pub async fn add_tracker(
        &self,
        url: &str,
        label: Option<String>,
    ) -> Result<TrackerView, SchedulerError> {
        let key = canonical(url)?;
        let label = label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());
        let view = {
            let mut registry = self.inner.registry.write().await;
            let tracker = registry
                .insert(key.clone(), label)
                .ok_or_else(|| SchedulerError::AlreadyTracked(key.clone()))?;
            tracker.view()
        };
        info!(url = %key, "Tracker added");
        self.persist().await;
        Ok(view)
    }

    /// Forget a tracker; an in-flight cycle finishes and is discarded
    pub async fn remove_tracker(&self, url: &str) -> Result<(), SchedulerError> {
        let key = canonical(url)?;
        {
            let mut registry = self.inner.registry.write().await;
            registry
                .remove(&key)
                .ok_or_else(|| SchedulerError::NotFound(key.clone()))?;
        }
        info!(url = %key, "Tracker removed");
        self.persist().await;
        Ok(())
    }

    /// Resume polling, either right now or through a zero-delay wake
    pub async fn start(
        &self,
        url: &str,
        run_immediately: bool,
    ) -> Result<TrackerView, SchedulerError> {
        let key = canonical(url)?;
        let (view, start, timer) = {
            let mut registry = self.inner.registry.write().await;
            let api_key = registry.settings().api_key.clone();
            let tracker = registry
                .get_mut(&key)
                .ok_or_else(|| SchedulerError::NotFound(key.clone()))?;
            tracker.start();

            let mut start = CycleStart::Skipped;
            let mut timer = None;
            if run_immediately {
                start = tracker.begin_cycle(&api_key, Utc::now());
            } else if !tracker.is_in_flight() {
                timer = Some(tracker.arm_timer(Utc::now(), Phase::Queued));
            }
            (tracker.view(), start, timer)
        };

        if let Some(timer) = timer {
            self.spawn_timer(key.clone(), timer, Duration::ZERO);
        }
        match start {
            CycleStart::Started(ctx) => self.spawn_cycle(ctx),
            CycleStart::MissingApiKey => self.on_missing_api_key(&key),
            CycleStart::Skipped => {}
        }
        self.persist().await;
        Ok(view)
    }

    pub async fn stop(&self, url: &str) -> Result<TrackerView, SchedulerError> {
        let key = canonical(url)?;
        let view = {
            let mut registry = self.inner.registry.write().await;
            let tracker = registry
                .get_mut(&key)
                .ok_or_else(|| SchedulerError::NotFound(key.clone()))?;
            tracker.stop();
            tracker.view()
        };
        self.persist().await;
        Ok(view)
    }

    /// Run a cycle now; a cycle already in flight is left alone
    pub async fn trigger_now(&self, url: &str) -> Result<TrackerView, SchedulerError> {
        self.require_api_key().await?;
        self.start(url, true).await
    }

    /// Start every tracker through a zero-delay wake
    pub async fn start_all(&self) -> Result<usize, SchedulerError> {
        self.require_api_key().await?;
        let timers: Vec<(String, PendingTimer)> = {
            let mut registry = self.inner.registry.write().await;
            let urls = registry.urls();
            let mut timers = Vec::new();
            for url in urls {
                let Some(tracker) = registry.get_mut(&url) else {
                    continue;
                };
                tracker.start();
                if !tracker.is_in_flight() {
                    timers.push((url, tracker.arm_timer(Utc::now(), Phase::Queued)));
                }
            }
            timers
        };

        let started = timers.len();
        for (url, timer) in timers {
            self.spawn_timer(url, timer, Duration::ZERO);
        }
        self.persist().await;
        Ok(started)
    }

    pub async fn stop_all(&self) -> usize {
        let stopped = {
            let mut registry = self.inner.registry.write().await;
            let urls = registry.urls();
            let mut stopped = 0;
            for url in urls {
                if let Some(tracker) = registry.get_mut(&url) {
                    if tracker.is_running() {
                        stopped += 1;
                    }
                    tracker.stop();
                }
            }
            stopped
        };
        self.persist().await;
        stopped
    }

    /// Stop and remove every tracker
    pub async fn clear_all(&self) -> usize {
        let removed = {
            let mut registry = self.inner.registry.write().await;
            let urls = registry.urls();
            for url in &urls {
                if let Some(tracker) = registry.get_mut(url) {
                    tracker.stop();
                }
                registry.remove(url);
            }
            urls.len()
        };
        info!(removed = removed, "All trackers cleared");
        self.persist().await;
        removed
    }

    /// Commit new settings; a changed interval reschedules idle running trackers
    pub async fn update_settings(&self, settings: Settings) -> Result<Settings, SchedulerError> {
        let settings = Settings {
            api_key: settings.api_key.trim().to_string(),
            poll_interval_secs: settings.poll_interval_secs,
        };
        if !settings.has_api_key() {
            return Err(SchedulerError::MissingApiKey);
        }
        if settings.poll_interval_secs < MIN_POLL_INTERVAL_SECS {
            return Err(SchedulerError::InvalidInterval(settings.poll_interval_secs));
        }

        let interval = settings.poll_interval();
        let timers: Vec<(String, PendingTimer)> = {
            let mut registry = self.inner.registry.write().await;
            let interval_changed = registry.settings().poll_interval_secs != settings.poll_interval_secs;
            registry.set_settings(settings.clone());

            let mut timers = Vec::new();
            if interval_changed {
                let at = Utc::now() + chrono::Duration::seconds(settings.poll_interval_secs as i64);
                for url in registry.urls() {
                    let Some(tracker) = registry.get_mut(&url) else {
                        continue;
                    };
                    if tracker.is_running() && !tracker.is_in_flight() {
                        timers.push((url, tracker.arm_timer(at, Phase::Waiting)));
                    }
                }
            }
            timers
        };

        if !timers.is_empty() {
            info!(
                interval_secs = settings.poll_interval_secs,
                rescheduled = timers.len(),
                "Poll interval changed, trackers rescheduled"
            );
        }
        for (url, timer) in timers {
            self.spawn_timer(url, timer, interval);
        }
        self.persist().await;
        Ok(settings)
    }

    pub async fn move_tracker(&self, url: &str, index: usize) -> Result<Vec<String>, SchedulerError> {
        let key = canonical(url)?;
        let order = {
            let mut registry = self.inner.registry.write().await;
            if !registry.move_to(&key, index) {
                return Err(SchedulerError::NotFound(key));
            }
            registry.urls()
        };
        self.persist().await;
        Ok(order)
    }

    pub async fn set_baseline(&self, url: Option<&str>) -> Result<Option<String>, SchedulerError> {
        let key = match url {
            Some(raw) => Some(canonical(raw)?),
            None => None,
        };
        {
            let mut registry = self.inner.registry.write().await;
            if !registry.set_baseline(key.clone()) {
                return Err(SchedulerError::InvalidBaseline(key.unwrap_or_default()));
            }
        }
        self.persist().await;
        Ok(key)
    }

    pub async fn set_sort(&self, sort: SortState) {
        self.inner.registry.write().await.set_sort(sort);
        self.persist().await;
    }

    /// Wake every restored tracker that was running; returns how many
    pub async fn resume_running(&self) -> usize {
        let timers: Vec<(String, PendingTimer)> = {
            let mut registry = self.inner.registry.write().await;
            let mut timers = Vec::new();
            for url in registry.urls() {
                let Some(tracker) = registry.get_mut(&url) else {
                    continue;
                };
                if tracker.is_running() && !tracker.is_in_flight() && !tracker.has_pending_timer() {
                    timers.push((url, tracker.arm_timer(Utc::now(), Phase::Queued)));
                }
            }
            timers
        };

        let resumed = timers.len();
        for (url, timer) in timers {
            self.spawn_timer(url, timer, Duration::ZERO);
        }
        if resumed > 0 {
            self.persist().await;
        }
        resumed
    }

    /// Save the current registry; failures are logged and never propagate
    pub async fn persist(&self) {
        let _guard = self.inner.persist_lock.lock().await;
        let (snapshot, total, running) = {
            let registry = self.inner.registry.read().await;
            let running = registry.iter().filter(|t| t.is_running()).count();
            (registry.snapshot(), registry.len(), running)
        };
        self.inner.metrics.set_trackers(total as i64, running as i64);

        match self.inner.store.save(&snapshot) {
            Ok(()) => self.inner.health.observe_persistence(None).await,
            Err(e) => {
                let message = format!("{e:#}");
                warn!(error = %message, "Failed to persist registry snapshot");
                self.inner.metrics.inc_snapshot_save_errors();
                self.inner.health.observe_persistence(Some(&message)).await;
            }
        }
    }

    async fn require_api_key(&self) -> Result<(), SchedulerError> {
        if self.inner.registry.read().await.settings().has_api_key() {
            Ok(())
        } else {
            Err(SchedulerError::MissingApiKey)
        }
    }

    fn publish(&self, event: TrackerEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn on_missing_api_key(&self, url: &str) {
        warn!(url = %url, "No API key configured, tracker paused");
        self.publish(TrackerEvent::MissingApiKey {
            url: url.to_string(),
        });
    }

    fn spawn_timer(&self, url: String, timer: PendingTimer, delay: Duration) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.token.cancelled() => {
                    debug!(url = %url, seq = timer.seq, "Timer cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    scheduler.fire(&url, timer.seq).await;
                }
            }
        });
    }

    fn spawn_cycle(&self, ctx: CycleContext) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_cycle(ctx).await;
        });
    }

    async fn fire(&self, url: &str, seq: u64) {
        let start = {
            let mut registry = self.inner.registry.write().await;
            let api_key = registry.settings().api_key.clone();
            let Some(tracker) = registry.get_mut(url) else {
                return;
            };
            if !tracker.take_timer(seq) {
                debug!(url = %url, seq = seq, "Stale timer ignored");
                return;
            }
            tracker.begin_cycle(&api_key, Utc::now())
        };

        match start {
            CycleStart::Started(ctx) => self.run_cycle(ctx).await,
            CycleStart::MissingApiKey => {
                self.on_missing_api_key(url);
                self.persist().await;
            }
            CycleStart::Skipped => {}
        }
    }

    async fn probe_once(&self, ctx: &CycleContext, strategy: Strategy) -> ProbeOutcome {
        let started = Instant::now();
        let result = self
            .inner
            .probe
            .fetch_sample(&ctx.url, strategy, &ctx.api_key)
            .await;
        ProbeOutcome {
            strategy,
            result,
            elapsed: started.elapsed(),
        }
    }

    async fn run_cycle(&self, ctx: CycleContext) {
        debug!(url = %ctx.url, strategies = ?ctx.strategies, "Cycle started");
        self.publish(TrackerEvent::CycleStarted {
            url: ctx.url.clone(),
            strategies: ctx.strategies,
        });

        let outcomes = match ctx.strategies {
            StrategySet::Both => {
                let (mobile, desktop) = tokio::join!(
                    self.probe_once(&ctx, Strategy::Mobile),
                    self.probe_once(&ctx, Strategy::Desktop)
                );
                vec![mobile, desktop]
            }
            StrategySet::Mobile => vec![self.probe_once(&ctx, Strategy::Mobile).await],
            StrategySet::Desktop => vec![self.probe_once(&ctx, Strategy::Desktop).await],
        };

        for outcome in &outcomes {
            self.inner.metrics.observe_probe(
                outcome.strategy.as_str(),
                outcome.result.is_ok(),
                outcome.elapsed.as_secs_f64(),
            );
        }

        if !self.inner.config.probe_cooldown.is_zero() {
            tokio::time::sleep(self.inner.config.probe_cooldown).await;
        }

        let (report, timer, auto_pause) = {
            let mut registry = self.inner.registry.write().await;
            let poll_interval = registry.settings().poll_interval();
            let Some(tracker) = registry
                .get_mut(&ctx.url)
                .filter(|t| t.id() == ctx.tracker_id)
            else {
                debug!(url = %ctx.url, "Tracker removed during cycle, results discarded");
                return;
            };

            let report =
                tracker.finish_cycle(&ctx, outcomes, poll_interval, &self.inner.config.auto_pause);
            let timer = match report.completion {
                Completion::Reschedule(at) => Some((at, tracker.arm_timer(at, Phase::Waiting))),
                Completion::Paused | Completion::AutoPaused => None,
            };
            let auto_pause = (report.completion == Completion::AutoPaused).then(|| {
                let history = tracker.history();
                (
                    history.mobile.ci95_half_width(),
                    history.desktop.ci95_half_width(),
                    history.mobile.len(),
                    history.desktop.len(),
                )
            });
            (report, timer, auto_pause)
        };

        let next_run_at = timer.as_ref().map(|(at, _)| *at);
        if let Some((at, timer)) = timer {
            let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            self.spawn_timer(ctx.url.clone(), timer, delay);
        }

        if let Some((mobile_ci, desktop_ci, mobile_samples, desktop_samples)) = auto_pause {
            self.inner.metrics.inc_auto_pauses();
            self.inner.logger.log_auto_pause(
                &ctx.url,
                mobile_ci,
                desktop_ci,
                mobile_samples,
                desktop_samples,
            );
        }

        self.record_report(&ctx.url, &report).await;
        if auto_pause.is_some() {
            self.publish(TrackerEvent::AutoPaused {
                url: ctx.url.clone(),
            });
        }
        self.publish(TrackerEvent::CycleCompleted {
            url: ctx.url.clone(),
            next_run_at,
        });
        self.persist().await;
    }

    async fn record_report(&self, url: &str, report: &CycleReport) {
        for strategy in &report.appended {
            self.inner.metrics.inc_samples_recorded(strategy.as_str());
            self.publish(TrackerEvent::SampleRecorded {
                url: url.to_string(),
                strategy: *strategy,
            });
        }
        for strategy in &report.duplicates {
            self.inner.metrics.inc_duplicates_dropped();
            debug!(url = %url, strategy = %strategy, "Duplicate sample dropped");
            self.publish(TrackerEvent::DuplicateDropped {
                url: url.to_string(),
                strategy: *strategy,
            });
        }
        for (strategy, error) in &report.failures {
            self.inner
                .logger
                .log_probe_failure(url, strategy.as_str(), error);
            self.publish(TrackerEvent::ProbeFailed {
                url: url.to_string(),
                strategy: *strategy,
                error: error.clone(),
            });
        }

        let failure = report
            .failures
            .first()
            .map(|(strategy, error)| format!("{strategy}: {error}"));
        if failure.is_some() || !report.appended.is_empty() || !report.duplicates.is_empty() {
            self.inner.health.observe_probe(failure.as_deref()).await;
        }
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.inner.health
    }
}

fn canonical(url: &str) -> Result<String, SchedulerError> {
    normalize_url(url).ok_or_else(|| SchedulerError::InvalidUrl(url.trim().to_string()))
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

