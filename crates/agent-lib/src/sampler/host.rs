//! Host-level sampling via sysinfo and /proc
//!
//! The sysinfo handles are kept alive across samples so that CPU usage and
//! network counters are computed from deltas rather than cold reads. Disk
//! I/O totals and socket counts come straight from /proc, which sysinfo
//! does not expose.

use super::percent_of;
use crate::models::{
    DiskMetrics, MemoryMetrics, MetricSource, NetworkMetrics, SwapMetrics, SystemMetrics,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{
    CpuRefreshKind, Disks, MemoryRefreshKind, Networks, ProcessRefreshKind, ProcessesToUpdate,
    RefreshKind, System,
};

pub struct HostSampler {
    sys: System,
    networks: Networks,
    disks: Disks,
    proc_path: PathBuf,
    sys_block_path: PathBuf,
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything());
        let mut sys = System::new_with_specifics(refresh_kind);
        sys.refresh_all();

        // Keep handles alive across samples so counters accumulate
        let mut networks = Networks::new();
        networks.refresh(true);
        let mut disks = Disks::new();
        disks.refresh(true);

        Self {
            sys,
            networks,
            disks,
            proc_path: PathBuf::from("/proc"),
            sys_block_path: PathBuf::from("/sys/block"),
        }
    }

    /// Global CPU usage measured as a delta over the given interval
    pub async fn cpu_percent_over(&mut self, interval: Duration) -> f64 {
        self.sys.refresh_cpu_usage();
        tokio::time::sleep(interval.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL)).await;
        self.sys.refresh_cpu_usage();
        self.sys.global_cpu_usage() as f64
    }

    pub fn core_count(&self) -> u32 {
        self.sys.cpus().len() as u32
    }

    pub fn load_average() -> [f64; 3] {
        let load = System::load_average();
        [load.one, load.five, load.fifteen]
    }

    pub fn memory(&mut self) -> MemoryMetrics {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        let available = self.sys.available_memory();
        let used = total.saturating_sub(available);
        MemoryMetrics {
            total_bytes: total,
            used_bytes: used,
            available_bytes: available,
            percent: percent_of(used, total),
            source: MetricSource::Host,
        }
    }

    /// Swap counters, refreshed alongside memory
    pub fn swap(&self) -> SwapMetrics {
        let total = self.sys.total_swap();
        let used = self.sys.used_swap();
        SwapMetrics {
            total_bytes: total,
            used_bytes: used,
            percent: percent_of(used, total),
        }
    }

    /// Usage of the root filesystem plus cumulative block I/O
    pub fn disk(&mut self) -> DiskMetrics {
        self.disks.refresh(true);
        let root = self
            .disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .or_else(|| self.disks.list().first());

        let (total, available) = root
            .map(|d| (d.total_space(), d.available_space()))
            .unwrap_or((0, 0));
        let used = total.saturating_sub(available);
        let (read_bytes, write_bytes) = disk_io_totals(&self.proc_path, &self.sys_block_path);

        DiskMetrics {
            total_bytes: total,
            used_bytes: used,
            free_bytes: available,
            percent: percent_of(used, total),
            read_bytes,
            write_bytes,
        }
    }

    /// Cumulative traffic across all interfaces plus the open socket count
    pub fn network(&mut self) -> NetworkMetrics {
        self.networks.refresh(true);
        let mut bytes_sent = 0;
        let mut bytes_recv = 0;
        for (_name, data) in self.networks.iter() {
            bytes_sent += data.total_transmitted();
            bytes_recv += data.total_received();
        }
        NetworkMetrics {
            bytes_sent,
            bytes_recv,
            connection_count: connection_count(&self.proc_path),
        }
    }

    pub fn system(&mut self) -> SystemMetrics {
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );
        SystemMetrics {
            process_count: self.sys.processes().len() as u64,
            uptime_seconds: System::uptime(),
            boot_time: System::boot_time(),
        }
    }
}

/// Sum sector counters from /proc/diskstats, whole devices only
///
/// Partitions are excluded by requiring a /sys/block entry for the device
/// name, otherwise sda and sda1 would both be counted.
pub(crate) fn disk_io_totals(proc_path: &Path, sys_block_path: &Path) -> (u64, u64) {
    let content = match std::fs::read_to_string(proc_path.join("diskstats")) {
        Ok(content) => content,
        Err(_) => return (0, 0),
    };

    let mut read_bytes = 0u64;
    let mut write_bytes = 0u64;
    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }
        if !sys_block_path.join(fields[2]).exists() {
            continue;
        }
        let sectors_read: u64 = fields[5].parse().unwrap_or(0);
        let sectors_written: u64 = fields[9].parse().unwrap_or(0);
        read_bytes += sectors_read * 512;
        write_bytes += sectors_written * 512;
    }
    (read_bytes, write_bytes)
}

/// Count open sockets across the tcp/udp tables, v4 and v6
pub(crate) fn connection_count(proc_path: &Path) -> u64 {
    ["net/tcp", "net/tcp6", "net/udp", "net/udp6"]
        .iter()
        .map(|rel| match std::fs::read_to_string(proc_path.join(rel)) {
            Ok(content) => content.lines().count().saturating_sub(1) as u64,
            Err(_) => 0,
        })
        .sum()
}
