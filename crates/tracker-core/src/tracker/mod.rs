//! Tracker lifecycle
//!
//! - `state`: the per-URL state machine and cycle merge
//! - `auto_pause`: confidence-based stopping rule
//! - `registry`: all trackers, display order and shared settings
//! - `scheduler`: timers, concurrent probes and persistence around the registry

mod auto_pause;
mod registry;
mod scheduler;
mod state;


pub use auto_pause::{AutoPauseRule, PauseReason, STAT_SIG_THRESHOLD};
pub use registry::{
    normalize_url, Registry, Settings, SortColumn, SortDirection, SortState,
    MIN_POLL_INTERVAL_SECS,
};
pub use scheduler::{
    Scheduler, SchedulerConfig, SchedulerError, TrackerEvent, DEFAULT_PROBE_COOLDOWN,
};
pub use state::{
    select_strategies, Completion, CycleContext, CycleReport, CycleStart, Phase, PendingTimer,
    ProbeOutcome, StrategySet, Tracker, TrackerView, MISSING_API_KEY,
};
