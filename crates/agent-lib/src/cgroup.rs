//! cgroup usage and limit readers
//!
//! Reads resource accounting from the unified cgroup v2 hierarchy:
//! - cpu.stat for cumulative CPU time
//! - memory.current / memory.max for usage and limit
//!
//! and from the legacy cgroup v1 controllers:
//! - cpu/cpuacct.usage for cumulative CPU time (nanoseconds)
//! - memory/memory.usage_in_bytes and memory.limit_in_bytes
//! - cpu/cpu.cfs_quota_us and cpu.cfs_period_us for the CPU quota

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::fs;

/// Default mount point of the cgroup filesystem
pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// cgroup v1 reports "no limit" as a page-aligned value near 2^63
pub const CGROUP_UNLIMITED: u64 = 9_223_372_036_854_771_712;

/// Normalize a raw limit value, mapping zero and the unlimited sentinel to None
pub fn normalize_limit(value: u64) -> Option<u64> {
    if value == 0 || value >= CGROUP_UNLIMITED {
        None
    } else {
        Some(value)
    }
}

/// Extract the docker container id from /proc/self/cgroup contents
///
/// Takes the last path segment of the first line mentioning docker, e.g.
/// `12:memory:/docker/<id>` or the v2 form `0::/docker/<id>`.
pub fn extract_docker_container_id(content: &str) -> Option<String> {
    for line in content.lines() {
        if line.contains("docker") {
            return line
                .trim()
                .rsplit('/')
                .next()
                .filter(|id| !id.is_empty())
                .map(|id| id.to_string());
        }
    }
    None
}

/// Reader for the cgroup v2 unified hierarchy
pub struct CgroupV2Reader {
    cgroup_root: PathBuf,
}

impl CgroupV2Reader {
    /// Create a new cgroup v2 reader
    pub fn new(cgroup_root: impl Into<PathBuf>) -> Self {
        Self {
            cgroup_root: cgroup_root.into(),
        }
    }

    /// Check if cgroup v2 is available on this system
    pub async fn is_available(&self) -> bool {
        let controllers_file = self.cgroup_root.join("cgroup.controllers");
        fs::metadata(&controllers_file).await.is_ok()
    }

    /// Parse cpu.stat file contents, returning the usage_usec counter
    pub fn parse_cpu_stat(content: &str) -> Option<u64> {
        for line in content.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 2 && parts[0] == "usage_usec" {
                return parts[1].parse().ok();
            }
        }
        None
    }

    /// Read the cumulative CPU usage counter in microseconds
    pub async fn cpu_usage_usec(&self) -> Result<u64> {
        let file_path = self.cgroup_root.join("cpu.stat");
        let content = fs::read_to_string(&file_path)
            .await
            .with_context(|| format!("Failed to read {}", file_path.display()))?;

        Self::parse_cpu_stat(&content).context("No usage_usec entry in cpu.stat")
    }

    /// Read current memory usage in bytes
    pub async fn memory_current(&self) -> Result<u64> {
        self.read_value("memory.current").await
    }

    /// Read the memory limit, mapping "max" and sentinel values to None
    pub async fn memory_max(&self) -> Result<Option<u64>> {
        let file_path = self.cgroup_root.join("memory.max");
        let content = fs::read_to_string(&file_path)
            .await
            .with_context(|| format!("Failed to read {}", file_path.display()))?;

        let trimmed = content.trim();
        if trimmed == "max" {
            return Ok(None);
        }

        let value: u64 = trimmed.parse().context("Failed to parse memory.max")?;
        Ok(normalize_limit(value))
    }

    /// Read a single numeric value from a cgroup file
    async fn read_value(&self, filename: &str) -> Result<u64> {
        let file_path = self.cgroup_root.join(filename);
        let content = fs::read_to_string(&file_path)
            .await
            .with_context(|| format!("Failed to read {}", file_path.display()))?;

        content
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse {} value", filename))
    }
}

/// Reader for the legacy cgroup v1 hierarchy
pub struct CgroupV1Reader {
    cgroup_root: PathBuf,
}

impl CgroupV1Reader {
    /// Create a new cgroup v1 reader
    pub fn new(cgroup_root: impl Into<PathBuf>) -> Self {
        Self {
            cgroup_root: cgroup_root.into(),
        }
    }

    /// Check if cgroup v1 controller directories are present
    pub async fn is_available(&self) -> bool {
        let cpu_path = self.cgroup_root.join("cpu");
        let memory_path = self.cgroup_root.join("memory");

        fs::metadata(&cpu_path).await.is_ok() && fs::metadata(&memory_path).await.is_ok()
    }

    /// Read the cumulative CPU usage counter in nanoseconds
    pub async fn cpu_usage_ns(&self) -> Result<u64> {
        self.read_value("cpu", "cpuacct.usage").await
    }

    /// Read current memory usage in bytes
    pub async fn memory_usage(&self) -> Result<u64> {
        self.read_value("memory", "memory.usage_in_bytes").await
    }

    /// Read the memory limit, mapping sentinel values to None
    pub async fn memory_limit(&self) -> Result<Option<u64>> {
        let value = self.read_value("memory", "memory.limit_in_bytes").await?;
        Ok(normalize_limit(value))
    }

    /// Derive the CPU limit in cores from the CFS quota and period
    ///
    /// A non-positive quota means no limit. Any read or parse error is
    /// treated the same way since limits are best-effort.
    pub async fn cpu_limit_cores(&self) -> Option<f64> {
        let quota: i64 = self.read_signed("cpu", "cpu.cfs_quota_us").await.ok()?;
        let period: i64 = self.read_signed("cpu", "cpu.cfs_period_us").await.ok()?;

        if quota <= 0 || period <= 0 {
            return None;
        }

        Some(quota as f64 / period as f64)
    }

    /// Read a single numeric value from a controller file
    async fn read_value(&self, controller: &str, filename: &str) -> Result<u64> {
        let file_path = self.cgroup_root.join(controller).join(filename);
        let content = fs::read_to_string(&file_path)
            .await
            .with_context(|| format!("Failed to read {}", file_path.display()))?;

        content
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse {} value", filename))
    }

    async fn read_signed(&self, controller: &str, filename: &str) -> Result<i64> {
        let file_path = self.cgroup_root.join(controller).join(filename);
        let content = fs::read_to_string(&file_path)
            .await
            .with_context(|| format!("Failed to read {}", file_path.display()))?;

        content
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse {} value", filename))
    }
}
