//! One collection run: assemble the snapshot, then persist it.
use tracing::info;

use crate::snapshot_modules::assembler::{MemorySnapshot, assemble_snapshot};
use crate::snapshot_modules::config::SnapshotConfig;
use crate::snapshot_modules::container_memory::ContainerMetricsSource;
use crate::snapshot_modules::error::SnapshotError;
use crate::snapshot_modules::writer::write_snapshot;

pub async fn run_once(config: &SnapshotConfig) -> Result<MemorySnapshot, SnapshotError> {
    let container_source = config.container_source();
    run_with_source(config, container_source.as_ref()).await
}

pub async fn run_with_source(
    config: &SnapshotConfig,
    container_source: &dyn ContainerMetricsSource,
) -> Result<MemorySnapshot, SnapshotError> {
    let snapshot = assemble_snapshot(&config.assembly_settings(), container_source).await?;
    info!(
        time = %snapshot.time,
        total_memory = ?snapshot.total_memory,
        available_memory = ?snapshot.available_memory,
        used_memory = ?snapshot.used_memory,
        containers = snapshot.containers.len(),
        "Snapshot assembled."
    );
    write_snapshot(&snapshot, &config.output_path)?;
    Ok(snapshot)
}
