//! Daemon configuration

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracker_core::probe::DEFAULT_ENDPOINT;
use tracker_core::tracker::{MIN_POLL_INTERVAL_SECS, STAT_SIG_THRESHOLD};

/// Optional config file looked up in the working directory
pub const CONFIG_FILE: &str = "psi-tracker";

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// API server port for commands, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// PageSpeed Insights API key; overrides a persisted key when set
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Snapshot file; empty keeps state in memory only
    #[serde(default = "default_state_path")]
    pub state_path: String,

    #[serde(default = "default_probe_endpoint")]
    pub probe_endpoint: String,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Wait after a cycle's probes settle, for the upstream rate limit
    #[serde(default = "default_probe_cooldown")]
    pub probe_cooldown_ms: u64,

    /// CI half-width in points at which a tracker auto-pauses
    #[serde(default = "default_auto_pause_threshold")]
    pub auto_pause_threshold: f64,
}

fn default_api_port() -> u16 {
    8080
}

fn default_poll_interval() -> u64 {
    MIN_POLL_INTERVAL_SECS
}

fn default_state_path() -> String {
    "./psi-tracker-state.json".to_string()
}

fn default_probe_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_probe_timeout() -> u64 {
    90
}

fn default_probe_cooldown() -> u64 {
    1200
}

fn default_auto_pause_threshold() -> f64 {
    STAT_SIG_THRESHOLD
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            api_key: String::new(),
            poll_interval_secs: default_poll_interval(),
            state_path: default_state_path(),
            probe_endpoint: default_probe_endpoint(),
            probe_timeout_secs: default_probe_timeout(),
            probe_cooldown_ms: default_probe_cooldown(),
            auto_pause_threshold: default_auto_pause_threshold(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from `psi-tracker.toml` and `PSI_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(config::Environment::with_prefix("PSI"))
            .build()
            .context("Failed to read configuration")?;

        let config: TrackerConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs < MIN_POLL_INTERVAL_SECS {
            bail!(
                "poll_interval_secs must be at least {}, got {}",
                MIN_POLL_INTERVAL_SECS,
                self.poll_interval_secs
            );
        }
        if self.probe_timeout_secs == 0 {
            bail!("probe_timeout_secs must be positive");
        }
        if !(self.auto_pause_threshold.is_finite() && self.auto_pause_threshold > 0.0) {
            bail!(
                "auto_pause_threshold must be a positive number, got {}",
                self.auto_pause_threshold
            );
        }
        Ok(())
    }

    pub fn state_path(&self) -> Option<PathBuf> {
        let path = self.state_path.trim();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn probe_cooldown(&self) -> Duration {
        Duration::from_millis(self.probe_cooldown_ms)
    }
}
