//! Builds one [`MemorySnapshot`] per run from the host and container readers.
use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use std::fmt::Display;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::snapshot_modules::container_memory::{ContainerMemory, ContainerMetricsSource};
use crate::snapshot_modules::error::SnapshotError;
use crate::snapshot_modules::host_memory::{HostMemory, read_host_memory_file};
use crate::snapshot_modules::units::round2;

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Top-level keys owned by the host fields; a container may not shadow them.
const RESERVED_FIELDS: [&str; 4] = ["time", "total_memory", "available_memory", "used_memory"];

/// The persisted record. Container entries are flattened after the host fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemorySnapshot {
    pub time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_memory: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_memory: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_memory: Option<f64>,
    #[serde(flatten)]
    pub containers: ContainerMemory,
}

#[derive(Debug, Clone)]
pub struct AssemblySettings {
    pub meminfo_path: PathBuf,
    pub excluded_containers: Vec<String>,
    /// Abort instead of emitting a partial record when a host key is missing.
    pub require_host_memory: bool,
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            meminfo_path: PathBuf::from("/proc/meminfo"),
            excluded_containers: Vec::new(),
            require_host_memory: false,
        }
    }
}

/// Collects everything for one snapshot: time, host memory, then containers.
pub async fn assemble_snapshot(
    settings: &AssemblySettings,
    container_source: &dyn ContainerMetricsSource,
) -> Result<MemorySnapshot, SnapshotError> {
    let captured_at = Local::now();

    let host = read_host_memory_file(&settings.meminfo_path).await;
    if !host.is_complete() {
        let missing = host.missing_keys().join(", ");
        if settings.require_host_memory {
            return Err(SnapshotError::IncompleteHostMemory(missing));
        }
        warn!(path = ?settings.meminfo_path, missing = %missing, "Host memory incomplete, emitting partial snapshot.");
    }

    let containers = container_source.container_memory().await;

    Ok(build_snapshot(captured_at, host, containers, &settings.excluded_containers))
}

pub fn build_snapshot<Tz>(
    captured_at: DateTime<Tz>,
    host: HostMemory,
    mut containers: ContainerMemory,
    excluded_containers: &[String],
) -> MemorySnapshot
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let used_memory = match (host.total, host.available) {
        (Some(total), Some(available)) => Some(round2(total - available)),
        _ => None,
    };

    containers.retain(|name, _| {
        if RESERVED_FIELDS.contains(&name.as_str()) {
            warn!(container = %name, "Container name collides with a snapshot field, dropping it.");
            return false;
        }
        if excluded_containers.iter().any(|excluded| excluded == name) {
            info!(container = %name, "Container excluded by configuration.");
            return false;
        }
        true
    });

    MemorySnapshot {
        time: captured_at.format(TIME_FORMAT).to_string(),
        total_memory: host.total,
        available_memory: host.available,
        used_memory,
        containers,
    }
}
