//! One-shot `docker stats` sampling
//!
//! Runs the docker CLI once in non-streaming mode and parses its
//! tab-separated table output. Sizes are printed human-readable
//! ("1.2GiB / 2GiB") and converted to bytes with binary multipliers.

use crate::models::DockerStats;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Upper bound on the docker stats subprocess
const DOCKER_STATS_TIMEOUT: Duration = Duration::from_secs(5);

/// Column layout requested from docker: CPU%, mem usage/limit, mem%, net I/O, block I/O
const DOCKER_STATS_FORMAT: &str =
    "table {{.CPUPerc}}\t{{.MemUsage}}\t{{.MemPerc}}\t{{.NetIO}}\t{{.BlockIO}}";

/// Run `docker stats --no-stream` for one container and parse the sample
pub async fn sample_docker_stats(container_id: &str) -> Result<DockerStats> {
    let output = timeout(
        DOCKER_STATS_TIMEOUT,
        Command::new("docker")
            .arg("stats")
            .arg("--no-stream")
            .arg("--format")
            .arg(DOCKER_STATS_FORMAT)
            .arg(container_id)
            .output(),
    )
    .await
    .context("docker stats timed out")?
    .context("Failed to run docker stats")?;

    if !output.status.success() {
        anyhow::bail!(
            "docker stats exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_stats_output(&stdout).context("No stats row in docker stats output")
}

/// Parse the stats table, skipping the header row
///
/// Each field is independently optional: a column that fails to parse is
/// omitted rather than failing the whole sample. The net and block I/O
/// columns are only counted for row validity.
pub fn parse_stats_output(output: &str) -> Option<DockerStats> {
    let row = output.lines().nth(1)?;
    let parts: Vec<&str> = row.split('\t').collect();
    if parts.len() < 5 {
        return None;
    }

    let memory = parse_size_pair(parts[1]);
    Some(DockerStats {
        cpu_percent: parse_percent(parts[0]),
        memory_used_bytes: memory.map(|(used, _)| used),
        memory_limit_bytes: memory.map(|(_, limit)| limit),
        memory_percent: parse_percent(parts[2]),
    })
}

/// Parse a percent field such as "12.34%"
fn parse_percent(field: &str) -> Option<f64> {
    field.trim().strip_suffix('%')?.parse().ok()
}

/// Parse a "used / limit" pair as printed by docker stats
fn parse_size_pair(field: &str) -> Option<(u64, u64)> {
    let (used, limit) = field.split_once('/')?;
    Some((parse_size(used)?, parse_size(limit)?))
}

/// Parse a human-readable size token such as "1.5GiB" into bytes
pub fn parse_size(token: &str) -> Option<u64> {
    let token = token.trim();
    let unit_start = token.find(|c: char| !(c.is_ascii_digit() || c == '.'))?;
    let (number, unit) = token.split_at(unit_start);
    let value: f64 = number.parse().ok()?;
    let multiplier = unit_multiplier(unit.trim())?;
    Some((value * multiplier as f64) as u64)
}

/// Fixed multiplier table, binary powers for both KB and KiB spellings
fn unit_multiplier(unit: &str) -> Option<u64> {
    match unit.to_ascii_uppercase().as_str() {
        "B" => Some(1),
        "KB" | "KIB" => Some(1024),
        "MB" | "MIB" => Some(1024 * 1024),
        "GB" | "GIB" => Some(1024 * 1024 * 1024),
        "TB" | "TIB" => Some(1024u64.pow(4)),
        _ => None,
    }
}
