//! Container environment detection
//!
//! Classifies the execution environment by probing filesystem markers and
//! environment variables. The first matching marker wins:
//!
//! 1. `/.dockerenv` present          -> docker
//! 2. kubernetes secrets dir present -> kubernetes
//! 3. `RAILWAY_ENVIRONMENT` set      -> railway
//! 4. `DYNO` set                     -> heroku
//! 5. `/sys/fs/cgroup` present       -> generic cgroup
//! 6. otherwise                      -> bare host
//!
//! Once classified, the detector extracts whatever resource limits the
//! platform exposes: a live `docker stats` sample for docker, cgroup v1
//! limit files for kubernetes and generic cgroups, environment variables
//! for railway and heroku.

mod docker;

pub use docker::{parse_size, parse_stats_output, sample_docker_stats};

use crate::cgroup::{extract_docker_container_id, CgroupV1Reader, DEFAULT_CGROUP_ROOT};
use crate::models::{ContainerInfo, ContainerRuntime};
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};

/// Probes the process environment for container markers and limits
pub struct ContainerEnvironmentDetector {
    dockerenv_path: PathBuf,
    k8s_secrets_path: PathBuf,
    cgroup_root: PathBuf,
    proc_path: PathBuf,
}

impl Default for ContainerEnvironmentDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerEnvironmentDetector {
    pub fn new() -> Self {
        Self {
            dockerenv_path: PathBuf::from("/.dockerenv"),
            k8s_secrets_path: PathBuf::from("/var/run/secrets/kubernetes.io/"),
            cgroup_root: PathBuf::from(DEFAULT_CGROUP_ROOT),
            proc_path: PathBuf::from("/proc"),
        }
    }

    /// Create a detector probing custom marker paths (for testing)
    pub fn with_roots(
        dockerenv_path: impl Into<PathBuf>,
        k8s_secrets_path: impl Into<PathBuf>,
        cgroup_root: impl Into<PathBuf>,
        proc_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            dockerenv_path: dockerenv_path.into(),
            k8s_secrets_path: k8s_secrets_path.into(),
            cgroup_root: cgroup_root.into(),
            proc_path: proc_path.into(),
        }
    }

    /// Classify the runtime by marker precedence
    pub fn detect_runtime(&self) -> ContainerRuntime {
        if self.dockerenv_path.exists() {
            ContainerRuntime::Docker
        } else if self.k8s_secrets_path.exists() {
            ContainerRuntime::Kubernetes
        } else if env_set("RAILWAY_ENVIRONMENT") {
            ContainerRuntime::Railway
        } else if env_set("DYNO") {
            ContainerRuntime::Heroku
        } else if self.cgroup_root.exists() {
            ContainerRuntime::GenericCgroup
        } else {
            ContainerRuntime::None
        }
    }

    /// Detect the runtime and extract its declared resource limits
    pub async fn detect(&self) -> ContainerInfo {
        let runtime = self.detect_runtime();
        let info = self.info_for_runtime(runtime).await;
        info!(
            runtime = %info.runtime,
            memory_limit_bytes = ?info.memory_limit_bytes,
            cpu_limit_cores = ?info.cpu_limit_cores,
            "Detected container environment"
        );
        info
    }

    pub(crate) async fn info_for_runtime(&self, runtime: ContainerRuntime) -> ContainerInfo {
        let mut detected = ContainerInfo {
            runtime,
            ..ContainerInfo::bare_host()
        };

        match runtime {
            ContainerRuntime::Docker => {
                if let Some(id) = self.current_container_id().await {
                    match docker::sample_docker_stats(&id).await {
                        Ok(stats) => detected.docker_stats = Some(stats),
                        Err(e) => debug!(error = %e, "docker stats unavailable"),
                    }
                }
                // Without a live CPU sample, fall back to static cgroup limits
                let have_cpu_sample = detected
                    .docker_stats
                    .as_ref()
                    .and_then(|s| s.cpu_percent)
                    .is_some();
                if !have_cpu_sample {
                    self.fill_cgroup_limits(&mut detected).await;
                }
            }
            ContainerRuntime::Kubernetes | ContainerRuntime::GenericCgroup => {
                self.fill_cgroup_limits(&mut detected).await;
            }
            ContainerRuntime::Railway => {
                let (memory, cpu) = railway_limits();
                detected.memory_limit_bytes = memory;
                detected.cpu_limit_cores = cpu;
            }
            ContainerRuntime::Heroku => {
                detected.memory_limit_bytes = heroku_memory_limit();
            }
            ContainerRuntime::None => {}
        }

        detected
    }

    /// Read this process's docker container id from its cgroup membership
    pub async fn current_container_id(&self) -> Option<String> {
        let cgroup_file = self.proc_path.join("self/cgroup");
        let content = fs::read_to_string(&cgroup_file).await.ok()?;
        extract_docker_container_id(&content)
    }

    async fn fill_cgroup_limits(&self, detected: &mut ContainerInfo) {
        let reader = CgroupV1Reader::new(&self.cgroup_root);
        match reader.memory_limit().await {
            Ok(limit) => detected.memory_limit_bytes = limit,
            Err(e) => debug!(error = %e, "No cgroup memory limit"),
        }
        detected.cpu_limit_cores = reader.cpu_limit_cores().await;
    }
}

/// True when the variable is present with a non-empty value
fn env_set(name: &str) -> bool {
    std::env::var(name).map(|v| !v.is_empty()).unwrap_or(false)
}

/// Railway publishes limits as plain numbers: memory in MB, CPU in cores
fn railway_limits() -> (Option<u64>, Option<f64>) {
    let memory = std::env::var("RAILWAY_MEMORY_LIMIT")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|mb| mb * 1024 * 1024);
    let cpu = std::env::var("RAILWAY_CPU_LIMIT")
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok());
    (memory, cpu)
}

/// Heroku publishes the dyno memory limit as a suffix-coded string
fn heroku_memory_limit() -> Option<u64> {
    let raw = std::env::var("MEMORY_LIMIT").ok()?;
    parse_heroku_memory(&raw)
}

/// Parse a limit such as "512M" or "1G"; a bare number means megabytes
fn parse_heroku_memory(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Some(value) = raw.strip_suffix('M') {
        value.parse::<u64>().ok().map(|v| v * 1024 * 1024)
    } else if let Some(value) = raw.strip_suffix('G') {
        value.parse::<u64>().ok().map(|v| v * 1024 * 1024 * 1024)
    } else {
        raw.parse::<u64>().ok().map(|v| v * 1024 * 1024)
    }
}
