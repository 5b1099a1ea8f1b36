//! Library for the streaming log incident forwarder
//!
//! This crate provides the core functionality for:
//! - Container runtime detection and resource limit discovery
//! - System metrics sampling from cgroups, docker and the host
//! - Log severity classification
//! - Incident submission to the collector API
//! - The streaming forward loop
//! - Health checks and observability

pub mod cgroup;
pub mod client;
pub mod detector;
pub mod forwarder;
pub mod health;
pub mod models;
pub mod observability;
pub mod sampler;

pub use client::{IncidentSink, RemoteIncidentClient};
pub use detector::ContainerEnvironmentDetector;
pub use forwarder::{ForwarderState, StreamingForwarder};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ForwarderMetrics, StructuredLogger};
pub use sampler::{MetricsSampler, SnapshotSource};
