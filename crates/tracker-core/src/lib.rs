//! PageSpeed tracker library
//!
//! This crate provides the core functionality for:
//! - Log-normal metric scoring and score statistics
//! - Per-URL sample logs with duplicate filtering
//! - The tracker state machine, registry and async scheduler
//! - The PageSpeed Insights probe client
//! - Snapshot persistence, health checks and observability

pub mod health;
pub mod models;
pub mod observability;
pub mod persistence;
pub mod probe;
pub mod report;
pub mod scoring;
pub mod stats;
pub mod store;
pub mod tracker;

pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{StructuredLogger, TrackerMetrics};
pub use report::{ComparisonReport, ComparisonRow, MetricColumn};
pub use scoring::{Contribution, ScoringModel};
pub use stats::Summary;
pub use tracker::{Scheduler, SchedulerConfig, SchedulerError, Settings, TrackerEvent, TrackerView};
