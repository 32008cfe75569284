//! PageSpeed tracker daemon
//!
//! Restores tracked URLs from the snapshot file, resumes the ones that were
//! polling, and serves the command and status API until Ctrl-C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tracker_core::{
    health::{Component, HealthRegistry},
    observability::{StructuredLogger, TrackerMetrics},
    persistence::{JsonFileStore, MemoryStore, SnapshotStore},
    probe::{PageSpeedClient, PageSpeedConfig},
    tracker::{AutoPauseRule, Registry, Scheduler, SchedulerConfig, Settings, TrackerEvent},
};
use tracker_daemon::{api, config::TrackerConfig};

const TRACKER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting psi-tracker");

    let config = TrackerConfig::load()?;
    info!(
        api_port = config.api_port,
        state_path = %config.state_path,
        poll_interval_secs = config.poll_interval_secs,
        "Tracker configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(Component::Scheduler).await;
    health_registry.register(Component::Probe).await;
    health_registry.register(Component::Persistence).await;

    let metrics = TrackerMetrics::new();
    let logger = StructuredLogger::new(format!("psi-tracker:{}", config.api_port));

    let store: Arc<dyn SnapshotStore> = match config.state_path() {
        Some(path) => Arc::new(JsonFileStore::new(path)),
        None => {
            warn!("No state path configured, trackers will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let registry = restore_registry(store.as_ref(), &config, &health_registry).await;
    let tracker_count = registry.len();

    let probe = PageSpeedClient::new(PageSpeedConfig {
        endpoint: config.probe_endpoint.clone(),
        timeout: config.probe_timeout(),
    })
    .context("Failed to build PageSpeed client")?;

    let scheduler = Scheduler::new(
        registry,
        Arc::new(probe),
        store,
        SchedulerConfig {
            probe_cooldown: config.probe_cooldown(),
            auto_pause: AutoPauseRule::new(config.auto_pause_threshold),
        },
        health_registry.clone(),
    );

    tokio::spawn(log_events(scheduler.subscribe()));

    let resumed = scheduler.resume_running().await;
    logger.log_restore(tracker_count, resumed);
    scheduler.persist().await;

    logger.log_startup(TRACKER_VERSION, tracker_count);

    let app_state = Arc::new(api::AppState::new(
        scheduler.clone(),
        health_registry.clone(),
        metrics,
    ));

    // Mark ready once the registry is restored
    health_registry.set_ready(true).await;

    let shutdown_logger = logger.clone();
    api::serve(config.api_port, app_state, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        shutdown_logger.log_shutdown("SIGINT received");
    })
    .await?;

    scheduler.persist().await;
    info!("Shutting down");

    Ok(())
}

/// Load the last snapshot, falling back to an empty registry
///
/// A key from the environment or config file wins over a persisted one.
async fn restore_registry(
    store: &dyn SnapshotStore,
    config: &TrackerConfig,
    health: &HealthRegistry,
) -> Registry {
    let configured = Settings {
        api_key: config.api_key.trim().to_string(),
        poll_interval_secs: config.poll_interval_secs,
    };

    match store.load() {
        Ok(Some(snapshot)) => {
            let mut registry = Registry::from_snapshot(snapshot);
            let mut settings = registry.settings().clone();
            if configured.has_api_key() {
                settings.api_key = configured.api_key;
            }
            registry.set_settings(settings);
            registry
        }
        Ok(None) => Registry::new(configured),
        Err(e) => {
            let message = format!("{e:#}");
            warn!(error = %message, "Failed to load snapshot, starting empty");
            health.observe_persistence(Some(&message)).await;
            Registry::new(configured)
        }
    }
}

async fn log_events(mut events: tokio::sync::broadcast::Receiver<TrackerEvent>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match events.recv().await {
            Ok(TrackerEvent::CycleStarted { url, strategies }) => {
                info!(url = %url, strategies = ?strategies, "Cycle started");
            }
            Ok(TrackerEvent::SampleRecorded { url, strategy }) => {
                info!(url = %url, strategy = %strategy, "Sample recorded");
            }
            Ok(TrackerEvent::CycleCompleted { url, next_run_at }) => {
                info!(url = %url, next_run_at = ?next_run_at, "Cycle completed");
            }
            // Failures, duplicates and pauses are logged where they happen
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped = skipped, "Event log fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
