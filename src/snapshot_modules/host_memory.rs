//! Reader for the kernel memory table (`/proc/meminfo`).
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, warn};

use crate::snapshot_modules::units::{MemoryUnit, normalize};

const MEM_TOTAL_LABEL: &str = "MemTotal:";
const MEM_AVAILABLE_LABEL: &str = "MemAvailable:";

/// Host memory in gigabytes. A field stays `None` when its key was not found.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HostMemory {
    pub total: Option<f64>,
    pub available: Option<f64>,
}

impl HostMemory {
    pub fn is_complete(&self) -> bool {
        self.total.is_some() && self.available.is_some()
    }

    /// Labels of the keys that were not found.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.total.is_none() {
            missing.push("MemTotal");
        }
        if self.available.is_none() {
            missing.push("MemAvailable");
        }
        missing
    }
}

/// Scans `source` for `MemTotal` and `MemAvailable`, stopping once both are found.
pub fn read_host_memory<R: BufRead>(source: R) -> HostMemory {
    let mut memory = HostMemory::default();

    for line in source.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to read line from memory table, stopping scan.");
                break;
            }
        };

        let mut tokens = line.split_whitespace();
        let (Some(label), Some(value)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        let slot = match label {
            MEM_TOTAL_LABEL => &mut memory.total,
            MEM_AVAILABLE_LABEL => &mut memory.available,
            _ => continue,
        };
        match value.parse::<u64>() {
            Ok(kilobytes) => *slot = Some(normalize(kilobytes as f64, MemoryUnit::KB)),
            Err(e) => warn!(label, value, error = %e, "Unparsable value in memory table."),
        }
        if memory.is_complete() {
            break;
        }
    }

    memory
}

pub fn parse_host_memory(table: &str) -> HostMemory {
    read_host_memory(table.as_bytes())
}

/// Reads the memory table at `path`. An unreadable source yields an unset result.
pub async fn read_host_memory_file(path: &Path) -> HostMemory {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let memory = parse_host_memory(&contents);
            debug!(path = ?path, ?memory, "Read host memory table.");
            memory
        }
        Err(e) => {
            warn!(path = ?path, error = %e, "Failed to read host memory table.");
            HostMemory::default()
        }
    }
}
