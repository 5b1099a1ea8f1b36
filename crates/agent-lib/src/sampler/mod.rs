//! Container-aware metric sampling
//!
//! Each snapshot walks a fallback chain from the most accurate source to
//! the broadest one: cgroup v2, then cgroup v1, then a docker stats
//! sample, then declared platform limits, then the host-wide sysinfo
//! view. The source that produced each figure is recorded in the snapshot
//! so downstream consumers can tell a cgroup-accurate reading from a
//! host-wide approximation.
//!
//! CPU usage is measured as a delta over a sampling window, so a snapshot
//! takes at least one window (two when a cgroup CPU chain also runs).

mod host;

pub use host::HostSampler;

use crate::cgroup::{CgroupV1Reader, CgroupV2Reader, DEFAULT_CGROUP_ROOT};
use crate::models::{
    ContainerInfo, CpuMetrics, MemoryMetrics, MetricSource, MetricsSnapshot,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;

/// Sampling window for CPU usage deltas
const DEFAULT_CPU_INTERVAL: Duration = Duration::from_secs(1);

/// Anything that can produce a full metrics snapshot
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn sample(&mut self) -> Result<MetricsSnapshot>;
}

pub struct MetricsSampler {
    host: HostSampler,
    container: ContainerInfo,
    cgroup_v2: CgroupV2Reader,
    cgroup_v1: CgroupV1Reader,
    cpu_interval: Duration,
}

impl MetricsSampler {
    pub fn new(container: ContainerInfo) -> Self {
        Self::with_cgroup_root(container, DEFAULT_CGROUP_ROOT, DEFAULT_CPU_INTERVAL)
    }

    /// Build a sampler reading cgroup files under a custom root (for testing)
    pub fn with_cgroup_root(
        container: ContainerInfo,
        cgroup_root: impl Into<PathBuf>,
        cpu_interval: Duration,
    ) -> Self {
        let root = cgroup_root.into();
        Self {
            host: HostSampler::new(),
            cgroup_v2: CgroupV2Reader::new(root.clone()),
            cgroup_v1: CgroupV1Reader::new(root),
            container,
            cpu_interval,
        }
    }

    pub fn container_info(&self) -> &ContainerInfo {
        &self.container
    }

    /// Collect a full snapshot, refining the host baseline with whatever
    /// container-accurate sources are available
    pub async fn snapshot(&mut self) -> MetricsSnapshot {
        let in_container = self.container.runtime.is_container();

        let host_cpu = self.host.cpu_percent_over(self.cpu_interval).await;
        let host_memory = self.host.memory();

        let cpu = self.cpu_metrics(in_container, host_cpu).await;
        let memory = if in_container {
            self.container_memory(&host_memory).await
        } else {
            host_memory
        };

        MetricsSnapshot {
            cpu,
            memory,
            swap: self.host.swap(),
            disk: self.host.disk(),
            network: self.host.network(),
            system: self.host.system(),
            timestamp: Utc::now(),
        }
    }

    async fn cpu_metrics(&mut self, in_container: bool, host_percent: f64) -> CpuMetrics {
        let (percent, source) = if in_container {
            if let Some(v2) = self.cgroup_v2_cpu_percent().await {
                (v2, MetricSource::CgroupV2)
            } else if let Some(v1) = self.cgroup_v1_cpu_percent().await {
                (v1, MetricSource::CgroupV1)
            } else if let Some(docker) = self
                .container
                .docker_stats
                .as_ref()
                .and_then(|s| s.cpu_percent)
            {
                (docker, MetricSource::DockerStats)
            } else {
                (host_percent, MetricSource::Host)
            }
        } else {
            (host_percent, MetricSource::Host)
        };

        let core_count = match self.container.cpu_limit_cores {
            Some(limit) if in_container => (limit.ceil() as u32).max(1),
            _ => self.host.core_count(),
        };

        CpuMetrics {
            percent,
            core_count,
            load_average: HostSampler::load_average(),
            source,
            is_container: in_container,
        }
    }

    async fn container_memory(&self, host: &MemoryMetrics) -> MemoryMetrics {
        if let Some((used, limit)) = self.cgroup_v2_memory().await {
            return MemoryMetrics {
                total_bytes: limit,
                used_bytes: used,
                available_bytes: host.available_bytes,
                percent: percent_of(used, limit),
                source: MetricSource::CgroupV2,
            };
        }
        if let Some((used, limit)) = self.cgroup_v1_memory().await {
            return MemoryMetrics {
                total_bytes: limit,
                used_bytes: used,
                available_bytes: host.available_bytes,
                percent: percent_of(used, limit),
                source: MetricSource::CgroupV1,
            };
        }
        if let Some(stats) = self.container.docker_stats.as_ref() {
            if let Some(percent) = stats.memory_percent {
                return MemoryMetrics {
                    total_bytes: stats.memory_limit_bytes.unwrap_or(host.total_bytes),
                    used_bytes: stats.memory_used_bytes.unwrap_or(host.used_bytes),
                    available_bytes: host.available_bytes,
                    percent,
                    source: MetricSource::DockerStats,
                };
            }
        }
        if let Some(limit) = self.container.memory_limit_bytes {
            // Host-wide usage clamped to the declared limit is the best
            // estimate left once live container counters are unavailable
            let used = host.used_bytes.min(limit);
            return MemoryMetrics {
                total_bytes: limit,
                used_bytes: used,
                available_bytes: host.available_bytes,
                percent: percent_of(used, limit),
                source: MetricSource::CgroupLimit,
            };
        }
        host.clone()
    }

    async fn cgroup_v2_cpu_percent(&self) -> Option<f64> {
        if !self.cgroup_v2.is_available().await {
            return None;
        }
        let first = self.cgroup_v2.cpu_usage_usec().await.ok()?;
        tokio::time::sleep(self.cpu_interval).await;
        let second = self.cgroup_v2.cpu_usage_usec().await.ok()?;
        Some(self.delta_percent(second.saturating_sub(first), 1_000_000.0))
    }

    async fn cgroup_v1_cpu_percent(&self) -> Option<f64> {
        if !self.cgroup_v1.is_available().await {
            return None;
        }
        let first = self.cgroup_v1.cpu_usage_ns().await.ok()?;
        tokio::time::sleep(self.cpu_interval).await;
        let second = self.cgroup_v1.cpu_usage_ns().await.ok()?;
        Some(self.delta_percent(second.saturating_sub(first), 1_000_000_000.0))
    }

    /// Convert a usage delta in the given tick unit to percent of one core
    fn delta_percent(&self, delta: u64, ticks_per_second: f64) -> f64 {
        delta as f64 / (self.cpu_interval.as_secs_f64() * ticks_per_second) * 100.0
    }

    async fn cgroup_v2_memory(&self) -> Option<(u64, u64)> {
        if !self.cgroup_v2.is_available().await {
            return None;
        }
        let used = self.cgroup_v2.memory_current().await.ok()?;
        let limit = self.cgroup_v2.memory_max().await.ok()??;
        Some((used, limit))
    }

    async fn cgroup_v1_memory(&self) -> Option<(u64, u64)> {
        if !self.cgroup_v1.is_available().await {
            return None;
        }
        let used = self.cgroup_v1.memory_usage().await.ok()?;
        let limit = self.cgroup_v1.memory_limit().await.ok()??;
        Some((used, limit))
    }
}

#[async_trait]
impl SnapshotSource for MetricsSampler {
    async fn sample(&mut self) -> Result<MetricsSnapshot> {
        Ok(self.snapshot().await)
    }
}

pub(crate) fn percent_of(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContainerRuntime, DockerStats};
    use std::path::Path;
    use tempfile::TempDir;

    const TEST_INTERVAL: Duration = Duration::from_millis(10);

    fn container_info(runtime: ContainerRuntime) -> ContainerInfo {
        ContainerInfo {
            runtime,
            ..ContainerInfo::bare_host()
        }
    }

    fn host_memory_stub() -> MemoryMetrics {
        MemoryMetrics {
            total_bytes: 8_000_000_000,
            used_bytes: 3_000_000_000,
            available_bytes: 5_000_000_000,
            percent: 37.5,
            source: MetricSource::Host,
        }
    }

    fn write_v2_tree(root: &Path, current: &str, max: &str) {
        std::fs::create_dir_all(root).unwrap();
        std::fs::write(root.join("cgroup.controllers"), "cpu memory\n").unwrap();
        std::fs::write(root.join("memory.current"), current).unwrap();
        std::fs::write(root.join("memory.max"), max).unwrap();
    }

    fn write_v1_memory(root: &Path, usage: &str, limit: &str) {
        std::fs::create_dir_all(root.join("cpu")).unwrap();
        std::fs::create_dir_all(root.join("memory")).unwrap();
        std::fs::write(root.join("memory/memory.usage_in_bytes"), usage).unwrap();
        std::fs::write(root.join("memory/memory.limit_in_bytes"), limit).unwrap();
    }

    #[tokio::test]
    async fn test_memory_prefers_cgroup_v2() {
        let temp = TempDir::new().unwrap();
        write_v2_tree(temp.path(), "104857600\n", "209715200\n");

        let sampler = MetricsSampler::with_cgroup_root(
            container_info(ContainerRuntime::Kubernetes),
            temp.path(),
            TEST_INTERVAL,
        );
        let memory = sampler.container_memory(&host_memory_stub()).await;

        assert_eq!(memory.source, MetricSource::CgroupV2);
        assert_eq!(memory.used_bytes, 104_857_600);
        assert_eq!(memory.total_bytes, 209_715_200);
        assert!((memory.percent - 50.0).abs() < 0.01);
        // Available always reflects the host view
        assert_eq!(memory.available_bytes, 5_000_000_000);
    }

    #[tokio::test]
    async fn test_unlimited_v2_falls_back_to_v1() {
        let temp = TempDir::new().unwrap();
        write_v2_tree(temp.path(), "104857600\n", "max\n");
        write_v1_memory(temp.path(), "52428800\n", "209715200\n");

        let sampler = MetricsSampler::with_cgroup_root(
            container_info(ContainerRuntime::GenericCgroup),
            temp.path(),
            TEST_INTERVAL,
        );
        let memory = sampler.container_memory(&host_memory_stub()).await;

        assert_eq!(memory.source, MetricSource::CgroupV1);
        assert_eq!(memory.used_bytes, 52_428_800);
        assert_eq!(memory.total_bytes, 209_715_200);
    }

    #[tokio::test]
    async fn test_memory_docker_stats_fallback() {
        let temp = TempDir::new().unwrap();
        let mut info = container_info(ContainerRuntime::Docker);
        info.docker_stats = Some(DockerStats {
            cpu_percent: Some(12.5),
            memory_used_bytes: Some(1_288_490_188),
            memory_limit_bytes: Some(2_147_483_648),
            memory_percent: Some(60.0),
        });

        let sampler =
            MetricsSampler::with_cgroup_root(info, temp.path().join("cgroup"), TEST_INTERVAL);
        let memory = sampler.container_memory(&host_memory_stub()).await;

        assert_eq!(memory.source, MetricSource::DockerStats);
        assert_eq!(memory.used_bytes, 1_288_490_188);
        assert_eq!(memory.total_bytes, 2_147_483_648);
        assert_eq!(memory.percent, 60.0);
    }

    #[tokio::test]
    async fn test_memory_declared_limit_clamps_host_usage() {
        let temp = TempDir::new().unwrap();
        let mut info = container_info(ContainerRuntime::Railway);
        info.memory_limit_bytes = Some(1_000_000_000);

        let sampler =
            MetricsSampler::with_cgroup_root(info, temp.path().join("cgroup"), TEST_INTERVAL);
        // Host reports 3GB used, more than the 1GB declared limit
        let memory = sampler.container_memory(&host_memory_stub()).await;

        assert_eq!(memory.source, MetricSource::CgroupLimit);
        assert_eq!(memory.used_bytes, 1_000_000_000);
        assert_eq!(memory.total_bytes, 1_000_000_000);
        assert_eq!(memory.percent, 100.0);
    }

    #[tokio::test]
    async fn test_memory_host_when_nothing_else_available() {
        let temp = TempDir::new().unwrap();
        let sampler = MetricsSampler::with_cgroup_root(
            container_info(ContainerRuntime::Docker),
            temp.path().join("cgroup"),
            TEST_INTERVAL,
        );
        let memory = sampler.container_memory(&host_memory_stub()).await;

        assert_eq!(memory.source, MetricSource::Host);
        assert_eq!(memory.used_bytes, 3_000_000_000);
    }

    #[tokio::test]
    async fn test_cpu_prefers_cgroup_v2() {
        let temp = TempDir::new().unwrap();
        write_v2_tree(temp.path(), "0\n", "max\n");
        std::fs::write(temp.path().join("cpu.stat"), "usage_usec 500000\n").unwrap();

        let mut sampler = MetricsSampler::with_cgroup_root(
            container_info(ContainerRuntime::Kubernetes),
            temp.path(),
            TEST_INTERVAL,
        );
        let cpu = sampler.cpu_metrics(true, 77.0).await;

        // Static counter file, so the delta and the percent are zero
        assert_eq!(cpu.source, MetricSource::CgroupV2);
        assert_eq!(cpu.percent, 0.0);
        assert!(cpu.is_container);
    }

    #[tokio::test]
    async fn test_cpu_docker_stats_fallback() {
        let temp = TempDir::new().unwrap();
        let mut info = container_info(ContainerRuntime::Docker);
        info.docker_stats = Some(DockerStats {
            cpu_percent: Some(42.5),
            ..DockerStats::default()
        });

        let mut sampler =
            MetricsSampler::with_cgroup_root(info, temp.path().join("cgroup"), TEST_INTERVAL);
        let cpu = sampler.cpu_metrics(true, 77.0).await;

        assert_eq!(cpu.source, MetricSource::DockerStats);
        assert_eq!(cpu.percent, 42.5);
    }

    #[tokio::test]
    async fn test_cpu_host_fallback_in_container() {
        let temp = TempDir::new().unwrap();
        let mut sampler = MetricsSampler::with_cgroup_root(
            container_info(ContainerRuntime::Heroku),
            temp.path().join("cgroup"),
            TEST_INTERVAL,
        );
        let cpu = sampler.cpu_metrics(true, 77.0).await;

        assert_eq!(cpu.source, MetricSource::Host);
        assert_eq!(cpu.percent, 77.0);
        assert!(cpu.is_container);
    }

    #[tokio::test]
    async fn test_core_count_rounds_declared_limit_up() {
        let temp = TempDir::new().unwrap();
        let mut info = container_info(ContainerRuntime::Railway);
        info.cpu_limit_cores = Some(0.5);

        let mut sampler =
            MetricsSampler::with_cgroup_root(info, temp.path().join("cgroup"), TEST_INTERVAL);
        let cpu = sampler.cpu_metrics(true, 10.0).await;
        assert_eq!(cpu.core_count, 1);

        sampler.container.cpu_limit_cores = Some(2.5);
        let cpu = sampler.cpu_metrics(true, 10.0).await;
        assert_eq!(cpu.core_count, 3);
    }

    #[test]
    fn test_delta_percent_formulas() {
        let temp = TempDir::new().unwrap();
        let sampler = MetricsSampler::with_cgroup_root(
            container_info(ContainerRuntime::None),
            temp.path().join("cgroup"),
            Duration::from_secs(1),
        );

        // One full core over one second, in usec and ns ticks
        assert_eq!(sampler.delta_percent(1_000_000, 1_000_000.0), 100.0);
        assert_eq!(sampler.delta_percent(1_000_000_000, 1_000_000_000.0), 100.0);
        // Half a core
        assert_eq!(sampler.delta_percent(500_000, 1_000_000.0), 50.0);
    }

    #[test]
    fn test_percent_of_zero_denominator() {
        assert_eq!(percent_of(100, 0), 0.0);
        assert_eq!(percent_of(1, 2), 50.0);
    }

    #[tokio::test]
    async fn test_snapshot_bare_host() {
        let temp = TempDir::new().unwrap();
        let mut sampler = MetricsSampler::with_cgroup_root(
            container_info(ContainerRuntime::None),
            temp.path().join("cgroup"),
            TEST_INTERVAL,
        );
        let snapshot = sampler.snapshot().await;

        assert_eq!(snapshot.cpu.source, MetricSource::Host);
        assert_eq!(snapshot.memory.source, MetricSource::Host);
        assert!(!snapshot.cpu.is_container);
        assert!(snapshot.memory.total_bytes > 0);
        assert!(snapshot.cpu.core_count >= 1);
    }
}
