//! Core data models for the incident forwarder

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which measurement strategy produced a metric value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSource {
    CgroupV2,
    CgroupV1,
    DockerStats,
    CgroupLimit,
    Host,
}

impl std::fmt::Display for MetricSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricSource::CgroupV2 => write!(f, "cgroup_v2"),
            MetricSource::CgroupV1 => write!(f, "cgroup_v1"),
            MetricSource::DockerStats => write!(f, "docker_stats"),
            MetricSource::CgroupLimit => write!(f, "cgroup_limit"),
            MetricSource::Host => write!(f, "host"),
        }
    }
}

/// Container runtime classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerRuntime {
    Docker,
    Kubernetes,
    Railway,
    Heroku,
    GenericCgroup,
    None,
}

impl ContainerRuntime {
    /// Returns true when the agent is running inside some container runtime
    pub fn is_container(&self) -> bool {
        !matches!(self, ContainerRuntime::None)
    }
}

impl std::fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerRuntime::Docker => write!(f, "docker"),
            ContainerRuntime::Kubernetes => write!(f, "kubernetes"),
            ContainerRuntime::Railway => write!(f, "railway"),
            ContainerRuntime::Heroku => write!(f, "heroku"),
            ContainerRuntime::GenericCgroup => write!(f, "generic_cgroup"),
            ContainerRuntime::None => write!(f, "none"),
        }
    }
}

/// Resource usage parsed from a single `docker stats` sample
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_used_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_percent: Option<f64>,
}

/// Detected execution environment and declared resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub runtime: ContainerRuntime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_limit_cores: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_stats: Option<DockerStats>,
}

impl ContainerInfo {
    /// Bare-host result with no limits
    pub fn bare_host() -> Self {
        Self {
            runtime: ContainerRuntime::None,
            memory_limit_bytes: None,
            cpu_limit_cores: None,
            docker_stats: None,
        }
    }
}

/// CPU usage for one sampling cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuMetrics {
    /// Percent of one core (container sources) or of the whole host
    pub percent: f64,
    /// Effective core count: declared limit when known, else host logical cores
    pub core_count: u32,
    /// Host 1/5/15 minute load averages
    pub load_average: [f64; 3],
    pub source: MetricSource,
    pub is_container: bool,
}

/// Memory usage for one sampling cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub total_bytes: u64,
    pub used_bytes: u64,
    /// Host-level available memory regardless of source
    pub available_bytes: u64,
    pub percent: f64,
    pub source: MetricSource,
}

/// Swap usage, always host-level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapMetrics {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub percent: f64,
}

/// Root filesystem usage and cumulative I/O counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskMetrics {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub percent: f64,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Cumulative network counters and live connection count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub connection_count: u64,
}

/// Process count and host uptime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub process_count: u64,
    pub uptime_seconds: u64,
    pub boot_time: u64,
}

/// One point-in-time resource snapshot
///
/// Constructed fresh each sampling cycle and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub cpu: CpuMetrics,
    pub memory: MemoryMetrics,
    pub swap: SwapMetrics,
    pub disk: DiskMetrics,
    pub network: NetworkMetrics,
    pub system: SystemMetrics,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
impl MetricsSnapshot {
    /// Fixed snapshot shared by record and client tests
    pub(crate) fn fixture() -> Self {
        MetricsSnapshot {
            cpu: CpuMetrics {
                percent: 42.5,
                core_count: 4,
                load_average: [1.5, 1.0, 0.5],
                source: MetricSource::Host,
                is_container: false,
            },
            memory: MemoryMetrics {
                total_bytes: 8 * 1024 * 1024 * 1024,
                used_bytes: 3 * 1024 * 1024 * 1024,
                available_bytes: 5 * 1024 * 1024 * 1024,
                percent: 37.5,
                source: MetricSource::Host,
            },
            swap: SwapMetrics {
                total_bytes: 2 * 1024 * 1024 * 1024,
                used_bytes: 512 * 1024 * 1024,
                percent: 25.0,
            },
            disk: DiskMetrics {
                total_bytes: 100 * 1024 * 1024 * 1024,
                used_bytes: 60 * 1024 * 1024 * 1024,
                free_bytes: 40 * 1024 * 1024 * 1024,
                percent: 60.0,
                read_bytes: 1024 * 1024,
                write_bytes: 2 * 1024 * 1024,
            },
            network: NetworkMetrics {
                bytes_sent: 1_000_000,
                bytes_recv: 2_000_000,
                connection_count: 42,
            },
            system: SystemMetrics {
                process_count: 137,
                uptime_seconds: 7200,
                boot_time: 1_700_000_000,
            },
            timestamp: Utc::now(),
        }
    }
}

/// Customer dimension resolved once at client construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerIdentity {
    pub id: String,
    pub name: String,
    pub api_key: String,
}

/// Service dimension resolved once at client construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub id: String,
    pub name: String,
}
