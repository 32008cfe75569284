//! Component health behind the daemon's `/healthz` and `/readyz`
//!
//! The scheduler, the upstream probe and the snapshot store each report a
//! status. The overall status is the worst of them; readiness additionally
//! waits for the registry restore at startup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Parts of the daemon that report health
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Scheduler,
    Probe,
    Persistence,
}

impl Component {
    pub const ALL: [Component; 3] = [Component::Scheduler, Component::Probe, Component::Persistence];
}

/// Ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Failing but the daemon keeps serving and scheduling
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the status or message last changed
    pub since: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            since: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct HealthState {
    components: BTreeMap<Component, ComponentHealth>,
    restored: bool,
}

/// Shared, cloneable view of every component's health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start reporting `component` as healthy
    pub async fn register(&self, component: Component) {
        self.state
            .write()
            .await
            .components
            .insert(component, ComponentHealth::new(ComponentStatus::Healthy, None));
    }

    /// Record a status; an unchanged status and message keeps its `since`
    pub async fn set(&self, component: Component, status: ComponentStatus, message: Option<String>) {
        let mut state = self.state.write().await;
        let unchanged = state
            .components
            .get(&component)
            .is_some_and(|h| h.status == status && h.message == message);
        if !unchanged {
            state
                .components
                .insert(component, ComponentHealth::new(status, message));
        }
    }

    pub async fn set_healthy(&self, component: Component) {
        self.set(component, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, component: Component, message: impl Into<String>) {
        self.set(component, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, component: Component, message: impl Into<String>) {
        self.set(component, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    pub async fn status(&self, component: Component) -> Option<ComponentStatus> {
        self.state
            .read()
            .await
            .components
            .get(&component)
            .map(|h| h.status)
    }

    /// Degraded with the failure message, healthy again on the next success
    pub async fn observe(&self, component: Component, failure: Option<&str>) {
        match failure {
            Some(message) => self.set_degraded(component, message).await,
            None => self.set_healthy(component).await,
        }
    }

    pub async fn observe_probe(&self, failure: Option<&str>) {
        self.observe(Component::Probe, failure).await;
    }

    pub async fn observe_persistence(&self, failure: Option<&str>) {
        self.observe(Component::Persistence, failure).await;
    }

    /// Mark the registry restore as finished (or not)
    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.restored = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse {
            status,
            components: state.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        let unhealthy = state
            .components
            .iter()
            .find(|(_, h)| h.status == ComponentStatus::Unhealthy);

        let reason = if !state.restored {
            Some("Registry not yet restored".to_string())
        } else {
            unhealthy.map(|(component, h)| {
                format!(
                    "{:?} unhealthy: {}",
                    component,
                    h.message.as_deref().unwrap_or("no detail")
                )
            })
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registered() -> HealthRegistry {
        let registry = HealthRegistry::new();
        for component in Component::ALL {
            registry.register(component).await;
        }
        registry
    }

    #[tokio::test]
    async fn test_empty_registry_is_healthy_but_not_ready() {
        let registry = HealthRegistry::new();

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Registry not yet restored"));
    }

    #[tokio::test]
    async fn test_overall_status_is_the_worst_component() {
        let registry = registered().await;

        registry
            .set_degraded(Component::Probe, "mobile: Quota exceeded")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry
            .set_unhealthy(Component::Scheduler, "Registry lock poisoned")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_readiness_requires_restore_and_no_unhealthy_component() {
        let registry = registered().await;
        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);

        registry.set_unhealthy(Component::Scheduler, "Failed").await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.unwrap().contains("Failed"));
    }

    #[tokio::test]
    async fn test_repeated_status_keeps_since() {
        let registry = registered().await;
        registry.set_degraded(Component::Probe, "timeout").await;
        let first = registry.health().await.components[&Component::Probe].since;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        registry.set_degraded(Component::Probe, "timeout").await;
        let second = registry.health().await.components[&Component::Probe].since;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_probe_failure_degrades_until_success() {
        let registry = registered().await;

        registry.observe_probe(Some("desktop: Quota exceeded")).await;
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[&Component::Probe].message.as_deref(),
            Some("desktop: Quota exceeded")
        );

        registry.observe_probe(None).await;
        assert_eq!(
            registry.status(Component::Probe).await,
            Some(ComponentStatus::Healthy)
        );
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_daemon_ready() {
        let registry = registered().await;
        registry.set_ready(true).await;

        registry.observe_persistence(Some("disk full")).await;

        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);
        assert!(registry.readiness().await.ready);
    }

    #[test]
    fn test_components_serialize_as_lowercase_keys() {
        let mut components = BTreeMap::new();
        components.insert(
            Component::Persistence,
            ComponentHealth::new(ComponentStatus::Healthy, None),
        );
        let json = serde_json::to_value(HealthResponse {
            status: ComponentStatus::Healthy,
            components,
        })
        .unwrap();

        assert_eq!(json["status"], "healthy");
        assert_eq!(json["components"]["persistence"]["status"], "healthy");
    }
}
