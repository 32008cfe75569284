//! Per-URL tracker state machine
//!
//! The transitions here are synchronous and side-effect free apart from
//! cancelling a pending timer token. The scheduler owns the async parts: it
//! spawns timers and probes and feeds their results back through
//! [`Tracker::finish_cycle`].

use super::auto_pause::{AutoPauseRule, PauseReason};
use crate::models::{MeasurementSample, Strategy};
use crate::probe::ProbeError;
use crate::stats::Summary;
use crate::store::{AppendOutcome, History};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Message recorded when a cycle is attempted without an API key
pub const MISSING_API_KEY: &str = "Missing API key.";

/// Observable scheduling state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    #[default]
    Paused,
    Queued,
    Waiting,
    Running,
    AwaitingGoogle,
}

/// Strategies probed by one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategySet {
    Mobile,
    Desktop,
    Both,
}

impl StrategySet {
    pub fn strategies(&self) -> &'static [Strategy] {
        match self {
            StrategySet::Mobile => &[Strategy::Mobile],
            StrategySet::Desktop => &[Strategy::Desktop],
            StrategySet::Both => &[Strategy::Mobile, Strategy::Desktop],
        }
    }
}

/// Pick the strategies for the next cycle
///
/// The side with fewer samples goes alone; equal counts probe both. This keeps
/// the two logs balanced when one strategy keeps failing.
pub fn select_strategies(mobile_samples: usize, desktop_samples: usize) -> StrategySet {
    use std::cmp::Ordering;
    match mobile_samples.cmp(&desktop_samples) {
        Ordering::Less => StrategySet::Mobile,
        Ordering::Greater => StrategySet::Desktop,
        Ordering::Equal => StrategySet::Both,
    }
}

/// Cancellable wake-up registered for a tracker
#[derive(Debug)]
pub struct PendingTimer {
    pub seq: u64,
    pub token: CancellationToken,
}

/// Everything a cycle needs once it leaves the registry lock
#[derive(Debug, Clone)]
pub struct CycleContext {
    pub tracker_id: u64,
    pub url: String,
    pub strategies: StrategySet,
    pub api_key: String,
    pub started_at: DateTime<Utc>,
}

/// Settled result of one probe inside a cycle
#[derive(Debug)]
pub struct ProbeOutcome {
    pub strategy: Strategy,
    pub result: Result<MeasurementSample, ProbeError>,
    pub elapsed: Duration,
}

/// Outcome of asking a tracker to begin a cycle
#[derive(Debug)]
pub enum CycleStart {
    /// Not running, or a cycle is already in flight
    Skipped,
    /// No API key configured; the tracker was forced to paused
    MissingApiKey,
    Started(CycleContext),
}

/// What the scheduler must do after a cycle completes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Completion {
    Reschedule(DateTime<Utc>),
    Paused,
    AutoPaused,
}

/// Merge summary of a completed cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub appended: Vec<Strategy>,
    pub duplicates: Vec<Strategy>,
    pub failures: Vec<(Strategy, String)>,
    pub completion: Completion,
}

/// Presentation view of a tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerView {
    pub url: String,
    pub label: Option<String>,
    pub running: bool,
    pub in_flight: bool,
    pub phase: Phase,
    pub active_strategy: Option<StrategySet>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub pause_reason: Option<PauseReason>,
    pub auto_pause_armed: bool,
    pub mobile: Option<Summary>,
    pub desktop: Option<Summary>,
}

impl TrackerView {
    pub fn summary(&self, strategy: Strategy) -> Option<&Summary> {
        match strategy {
            Strategy::Mobile => self.mobile.as_ref(),
            Strategy::Desktop => self.desktop.as_ref(),
        }
    }
}

/// One tracked URL
#[derive(Debug)]
pub struct Tracker {
    pub(crate) id: u64,
    pub(crate) url: String,
    pub(crate) label: Option<String>,
    pub(crate) running: bool,
    pub(crate) in_flight: bool,
    pub(crate) phase: Phase,
    pub(crate) active_strategy: Option<StrategySet>,
    pub(crate) next_run_at: Option<DateTime<Utc>>,
    pub(crate) last_error: Option<String>,
    pub(crate) pause_reason: Option<PauseReason>,
    pub(crate) auto_pause_armed: bool,
    pub(crate) history: History,
    timer: Option<PendingTimer>,
    timer_seq: u64,
}

impl Tracker {
    pub fn new(id: u64, url: impl Into<String>, label: Option<String>) -> Self {
        Self {
            id,
            url: url.into(),
            label,
            running: false,
            in_flight: false,
            phase: Phase::Paused,
            active_strategy: None,
            next_run_at: None,
            last_error: None,
            pause_reason: None,
            auto_pause_armed: false,
            history: History::default(),
            timer: None,
            timer_seq: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn active_strategy(&self) -> Option<StrategySet> {
        self.active_strategy
    }

    pub fn next_run_at(&self) -> Option<DateTime<Utc>> {
        self.next_run_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn pause_reason(&self) -> Option<PauseReason> {
        self.pause_reason
    }

    pub fn auto_pause_armed(&self) -> bool {
        self.auto_pause_armed
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn has_pending_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Mark running and drop any pending wake-up
    pub fn start(&mut self) {
        self.running = true;
        self.last_error = None;
        self.pause_reason = None;
        self.cancel_timer();
        if !self.in_flight {
            self.phase = Phase::Queued;
        }
    }

    /// Stop polling; an in-flight cycle finishes but lands in paused
    pub fn stop(&mut self) {
        self.running = false;
        self.last_error = None;
        self.pause_reason = None;
        self.cancel_timer();
        self.next_run_at = None;
        if !self.in_flight {
            self.phase = Phase::Paused;
            self.active_strategy = None;
        }
    }

    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.token.cancel();
        }
    }

    /// Register a wake-up at `at`, replacing any previous one
    pub fn arm_timer(&mut self, at: DateTime<Utc>, phase: Phase) -> PendingTimer {
        self.cancel_timer();
        self.timer_seq += 1;
        let token = CancellationToken::new();
        self.timer = Some(PendingTimer {
            seq: self.timer_seq,
            token: token.clone(),
        });
        self.next_run_at = Some(at);
        self.phase = phase;
        PendingTimer {
            seq: self.timer_seq,
            token,
        }
    }

    /// Consume the pending timer if `seq` is still the current one
    pub fn take_timer(&mut self, seq: u64) -> bool {
        match &self.timer {
            Some(timer) if timer.seq == seq && !timer.token.is_cancelled() => {
                self.timer = None;
                true
            }
            _ => false,
        }
    }

    /// Try to begin a cycle
    pub fn begin_cycle(&mut self, api_key: &str, now: DateTime<Utc>) -> CycleStart {
        if !self.running || self.in_flight {
            return CycleStart::Skipped;
        }

        self.cancel_timer();
        self.next_run_at = None;

        if api_key.trim().is_empty() {
            self.running = false;
            self.phase = Phase::Paused;
            self.active_strategy = None;
            self.last_error = Some(MISSING_API_KEY.to_string());
            return CycleStart::MissingApiKey;
        }

        self.in_flight = true;
        self.phase = Phase::Running;

        let strategies = select_strategies(self.history.mobile.len(), self.history.desktop.len());
        self.active_strategy = Some(strategies);
        self.phase = Phase::AwaitingGoogle;

        CycleStart::Started(CycleContext {
            tracker_id: self.id,
            url: self.url.clone(),
            strategies,
            api_key: api_key.to_string(),
            started_at: now,
        })
    }

    /// Merge the settled probes of a cycle and decide what happens next
    pub fn finish_cycle(
        &mut self,
        ctx: &CycleContext,
        outcomes: Vec<ProbeOutcome>,
        poll_interval: Duration,
        rule: &AutoPauseRule,
    ) -> CycleReport {
        let mut appended = Vec::new();
        let mut duplicates = Vec::new();
        let mut failures = Vec::new();

        for outcome in outcomes {
            match outcome.result {
                Ok(sample) => match self.history.get_mut(outcome.strategy).append(sample) {
                    AppendOutcome::Appended => appended.push(outcome.strategy),
                    AppendOutcome::Duplicate => duplicates.push(outcome.strategy),
                },
                Err(e) => failures.push((outcome.strategy, e.to_string())),
            }
        }

        if !failures.is_empty() {
            let message = failures
                .iter()
                .map(|(strategy, message)| format!("{strategy}: {message}"))
                .collect::<Vec<_>>()
                .join("; ");
            self.last_error = Some(message);
        } else if !appended.is_empty() || !duplicates.is_empty() {
            self.last_error = None;
        }

        self.in_flight = false;
        self.active_strategy = None;

        let completion = if !self.running {
            self.phase = Phase::Paused;
            self.next_run_at = None;
            Completion::Paused
        } else if self.evaluate_auto_pause(rule) {
            self.running = false;
            self.phase = Phase::Paused;
            self.next_run_at = None;
            self.pause_reason = Some(PauseReason::StatSig1);
            Completion::AutoPaused
        } else {
            let interval = ChronoDuration::from_std(poll_interval)
                .unwrap_or_else(|_| ChronoDuration::seconds(60));
            Completion::Reschedule(ctx.started_at + interval)
        };

        CycleReport {
            appended,
            duplicates,
            failures,
            completion,
        }
    }

    fn evaluate_auto_pause(&mut self, rule: &AutoPauseRule) -> bool {
        let mobile = self.history.mobile.ci95_half_width();
        let desktop = self.history.desktop.ci95_half_width();
        rule.evaluate(&mut self.auto_pause_armed, mobile, desktop)
    }

    pub fn view(&self) -> TrackerView {
        TrackerView {
            url: self.url.clone(),
            label: self.label.clone(),
            running: self.running,
            in_flight: self.in_flight,
            phase: self.phase,
            active_strategy: self.active_strategy,
            next_run_at: self.next_run_at,
            last_error: self.last_error.clone(),
            pause_reason: self.pause_reason,
            auto_pause_armed: self.auto_pause_armed,
            mobile: self.history.mobile.summary(),
            desktop: self.history.desktop.summary(),
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricKey, MetricReading};
    use crate::probe::DecodeError;

    fn sample(score: f64) -> MeasurementSample {
        let metrics = MetricKey::ALL
            .into_iter()
            .map(|key| (key, MetricReading { value: score * 10.0, score }))
            .collect();
        MeasurementSample {
            timestamp: Utc::now(),
            performance_score: score,
            metrics,
            source_fetch_time: None,
        }
    }

    fn ok(strategy: Strategy, score: f64) -> ProbeOutcome {
        ProbeOutcome {
            strategy,
            result: Ok(sample(score)),
            elapsed: Duration::from_millis(10),
        }
    }

    fn started(tracker: &mut Tracker) -> CycleContext {
        match tracker.begin_cycle("key", Utc::now()) {
            CycleStart::Started(ctx) => ctx,
            other => panic!("cycle did not start: {other:?}"),
        }
    }

    #[test]
    fn test_select_strategies_balances() {
        assert_eq!(select_strategies(3, 1), StrategySet::Desktop);
        assert_eq!(select_strategies(0, 2), StrategySet::Mobile);
        assert_eq!(select_strategies(0, 0), StrategySet::Both);
        assert_eq!(StrategySet::Desktop.strategies(), &[Strategy::Desktop]);
    }

    #[test]
    fn test_begin_cycle_picks_lagging_strategy() {
        let mut tracker = Tracker::new(1, "https://example.com/", None);
        for score in [70.0, 71.0, 72.0] {
            tracker.history.mobile.append(sample(score));
        }
        tracker.history.desktop.append(sample(90.0));
        tracker.start();

        let ctx = started(&mut tracker);
        assert_eq!(ctx.strategies, StrategySet::Desktop);
        assert_eq!(tracker.phase(), Phase::AwaitingGoogle);
        assert_eq!(tracker.active_strategy(), Some(StrategySet::Desktop));
        assert!(tracker.is_in_flight());
    }

    #[test]
    fn test_begin_cycle_guards() {
        let mut tracker = Tracker::new(1, "https://example.com/", None);
        assert!(matches!(tracker.begin_cycle("key", Utc::now()), CycleStart::Skipped));

        tracker.start();
        let _ctx = started(&mut tracker);
        assert!(matches!(tracker.begin_cycle("key", Utc::now()), CycleStart::Skipped));
    }

    #[test]
    fn test_missing_api_key_forces_pause() {
        let mut tracker = Tracker::new(1, "https://example.com/", None);
        tracker.start();

        assert!(matches!(tracker.begin_cycle("  ", Utc::now()), CycleStart::MissingApiKey));
        assert!(!tracker.is_running());
        assert!(!tracker.is_in_flight());
        assert_eq!(tracker.phase(), Phase::Paused);
        assert_eq!(tracker.last_error(), Some(MISSING_API_KEY));
    }

    #[test]
    fn test_finish_cycle_reschedules_from_cycle_start() {
        let mut tracker = Tracker::new(1, "https://example.com/", None);
        tracker.start();
        let ctx = started(&mut tracker);

        let report = tracker.finish_cycle(
            &ctx,
            vec![ok(Strategy::Mobile, 80.0), ok(Strategy::Desktop, 95.0)],
            Duration::from_secs(60),
            &AutoPauseRule::default(),
        );

        assert_eq!(report.appended, vec![Strategy::Mobile, Strategy::Desktop]);
        assert_eq!(
            report.completion,
            Completion::Reschedule(ctx.started_at + ChronoDuration::seconds(60))
        );
        assert!(!tracker.is_in_flight());
        assert_eq!(tracker.active_strategy(), None);
    }

    #[test]
    fn test_failure_recorded_and_other_strategy_kept() {
        let mut tracker = Tracker::new(1, "https://example.com/", None);
        tracker.start();
        let ctx = started(&mut tracker);

        let report = tracker.finish_cycle(
            &ctx,
            vec![
                ProbeOutcome {
                    strategy: Strategy::Mobile,
                    result: Err(DecodeError::MissingPerformanceScore.into()),
                    elapsed: Duration::from_millis(5),
                },
                ok(Strategy::Desktop, 90.0),
            ],
            Duration::from_secs(60),
            &AutoPauseRule::default(),
        );

        assert_eq!(report.failures.len(), 1);
        assert_eq!(tracker.history().desktop.len(), 1);
        assert!(tracker.history().mobile.is_empty());
        assert!(tracker.last_error().unwrap().starts_with("mobile: "));
        assert!(matches!(report.completion, Completion::Reschedule(_)));

        // Next cycle balances toward the failed side, and success clears the error
        let ctx = started(&mut tracker);
        assert_eq!(ctx.strategies, StrategySet::Mobile);
        tracker.finish_cycle(
            &ctx,
            vec![ok(Strategy::Mobile, 82.0)],
            Duration::from_secs(60),
            &AutoPauseRule::default(),
        );
        assert_eq!(tracker.last_error(), None);
    }

    #[test]
    fn test_stop_during_flight_lands_in_paused() {
        let mut tracker = Tracker::new(1, "https://example.com/", None);
        tracker.start();
        let ctx = started(&mut tracker);

        tracker.stop();
        assert_eq!(tracker.phase(), Phase::AwaitingGoogle);
        assert!(tracker.is_in_flight());

        let report = tracker.finish_cycle(
            &ctx,
            vec![ok(Strategy::Mobile, 80.0), ok(Strategy::Desktop, 90.0)],
            Duration::from_secs(60),
            &AutoPauseRule::default(),
        );

        assert_eq!(report.completion, Completion::Paused);
        assert_eq!(tracker.phase(), Phase::Paused);
        assert_eq!(tracker.next_run_at(), None);
        assert_eq!(tracker.history().mobile.len(), 1);
        assert!(!tracker.has_pending_timer());
    }

    #[test]
    fn test_auto_pause_after_armed_cycle() {
        let mut tracker = Tracker::new(1, "https://example.com/", None);
        tracker.start();
        let rule = AutoPauseRule::default();

        // Wide spread on both sides arms the latch
        let ctx = started(&mut tracker);
        tracker.finish_cycle(
            &ctx,
            vec![ok(Strategy::Mobile, 70.0), ok(Strategy::Desktop, 80.0)],
            Duration::from_secs(60),
            &rule,
        );
        let ctx = started(&mut tracker);
        let report = tracker.finish_cycle(
            &ctx,
            vec![ok(Strategy::Mobile, 76.0), ok(Strategy::Desktop, 85.0)],
            Duration::from_secs(60),
            &rule,
        );
        assert!(matches!(report.completion, Completion::Reschedule(_)));
        assert!(tracker.auto_pause_armed());

        // Many tight samples shrink both intervals under one point; values
        // alternate so consecutive samples are never duplicates
        let mut completion = report.completion;
        for i in 0..200 {
            let jitter = if i % 2 == 0 { -0.1 } else { 0.1 };
            let ctx = started(&mut tracker);
            completion = tracker
                .finish_cycle(
                    &ctx,
                    vec![
                        ok(Strategy::Mobile, 73.0 + jitter),
                        ok(Strategy::Desktop, 82.5 + jitter),
                    ],
                    Duration::from_secs(60),
                    &rule,
                )
                .completion;
            if completion == Completion::AutoPaused {
                break;
            }
        }

        assert_eq!(completion, Completion::AutoPaused);
        assert!(!tracker.is_running());
        assert_eq!(tracker.phase(), Phase::Paused);
        assert_eq!(tracker.pause_reason(), Some(PauseReason::StatSig1));
        assert!(!tracker.auto_pause_armed());
    }

    #[test]
    fn test_timer_sequence_rejects_stale_fires() {
        let mut tracker = Tracker::new(1, "https://example.com/", None);
        tracker.start();

        let first = tracker.arm_timer(Utc::now(), Phase::Queued);
        let second = tracker.arm_timer(Utc::now(), Phase::Waiting);

        assert!(first.token.is_cancelled());
        assert!(!tracker.take_timer(first.seq));
        assert!(tracker.take_timer(second.seq));
        assert!(!tracker.has_pending_timer());
    }

    #[test]
    fn test_stop_cancels_timer_and_clears_next_run() {
        let mut tracker = Tracker::new(1, "https://example.com/", None);
        tracker.start();
        let timer = tracker.arm_timer(Utc::now(), Phase::Waiting);

        tracker.stop();

        assert!(timer.token.is_cancelled());
        assert_eq!(tracker.next_run_at(), None);
        assert_eq!(tracker.phase(), Phase::Paused);
    }
}
