use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::io::Write;
use std::path::Path;
use tempfile::{Builder, NamedTempFile};
use tracing::info;

use crate::snapshot_modules::assembler::MemorySnapshot;
use crate::snapshot_modules::error::SnapshotError;

const INDENT: &[u8] = b"    ";

/// Mode for a fresh snapshot; the process umask still applies.
#[cfg(unix)]
const NEW_FILE_MODE: u32 = 0o666;

/// Renders the snapshot as 4-space indented JSON with a trailing newline.
pub fn render_snapshot(snapshot: &MemorySnapshot) -> Result<Vec<u8>, SnapshotError> {
    let mut buffer = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(INDENT));
    snapshot.serialize(&mut serializer)?;
    buffer.push(b'\n');
    Ok(buffer)
}

/// Replaces `destination` with the rendered snapshot.
///
/// The document is written to a temporary file next to the destination and
/// renamed over it, so a reader sees either the old or the new snapshot.
pub fn write_snapshot(snapshot: &MemorySnapshot, destination: &Path) -> Result<(), SnapshotError> {
    let contents = render_snapshot(snapshot)?;
    let write_error = |source: std::io::Error| SnapshotError::Write {
        path: destination.to_path_buf(),
        source,
    };

    let directory = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = create_temp_file(directory, destination).map_err(write_error)?;
    temp_file.write_all(&contents).map_err(write_error)?;
    temp_file.as_file().sync_all().map_err(write_error)?;
    temp_file
        .persist(destination)
        .map_err(|e| write_error(e.error))?;

    info!(path = ?destination, bytes = contents.len(), "Snapshot written.");
    Ok(())
}

/// Creates the staging file with the permissions the destination should end
/// up with: the current mode of an existing snapshot, otherwise a regular
/// umask-filtered file rather than tempfile's private 0600.
fn create_temp_file(directory: &Path, destination: &Path) -> std::io::Result<NamedTempFile> {
    let mut builder = Builder::new();
    builder.prefix(".memory_usage").suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(NEW_FILE_MODE));
    }
    let temp_file = builder.tempfile_in(directory)?;

    if let Ok(metadata) = std::fs::metadata(destination) {
        temp_file.as_file().set_permissions(metadata.permissions())?;
    }
    Ok(temp_file)
}
