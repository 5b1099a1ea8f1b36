//! Component health tracking for liveness and readiness probes
//!
//! The forwarder has a fixed set of components (the forward loop, the
//! metrics sampler, the collector client), so the registry seeds all of
//! them at construction instead of taking open-ended registrations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
///
/// Ordered by severity so the overall status is the maximum over all
/// components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Experiencing issues but still doing useful work
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Most recent status report for one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Unix timestamp of the report
    pub updated_at: i64,
}

impl ComponentHealth {
    fn now(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Payload served on the liveness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

/// Payload served on the readiness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names tracked by the registry
pub mod components {
    pub const FORWARDER: &str = "forwarder";
    pub const SAMPLER: &str = "sampler";
    pub const INCIDENT_CLIENT: &str = "incident_client";

    pub const ALL: [&str; 3] = [FORWARDER, SAMPLER, INCIDENT_CLIENT];
}

#[derive(Debug)]
struct Inner {
    components: HashMap<String, ComponentHealth>,
    ready: bool,
}

/// Shared registry behind the health and readiness endpoints
///
/// Cloning is cheap; all clones observe the same state.
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Create a registry with every known component seeded healthy
    pub fn new() -> Self {
        let components = components::ALL
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    ComponentHealth::now(ComponentStatus::Healthy, None),
                )
            })
            .collect();

        Self {
            inner: Arc::new(RwLock::new(Inner {
                components,
                ready: false,
            })),
        }
    }

    /// Record a status report for a component
    pub async fn set_status(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        let mut inner = self.inner.write().await;
        inner
            .components
            .insert(name.to_string(), ComponentHealth::now(status, message));
    }

    /// Flip the readiness gate, set once startup completes
    pub async fn set_ready(&self, ready: bool) {
        self.inner.write().await.ready = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let inner = self.inner.read().await;
        HealthResponse {
            status: overall_status(&inner.components),
            components: inner.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let inner = self.inner.read().await;

        if !inner.ready {
            return ReadinessResponse {
                ready: false,
                reason: Some("Forwarder not yet initialized".to_string()),
            };
        }
        if overall_status(&inner.components) == ComponentStatus::Unhealthy {
            return ReadinessResponse {
                ready: false,
                reason: Some("Critical component unhealthy".to_string()),
            };
        }
        ReadinessResponse {
            ready: true,
            reason: None,
        }
    }
}

fn overall_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
    components
        .values()
        .map(|health| health.status)
        .max()
        .unwrap_or(ComponentStatus::Healthy)
}
