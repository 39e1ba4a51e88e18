use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Host memory table incomplete, missing: {0}")]
    IncompleteHostMemory(String),
    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to write snapshot to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SnapshotError {
    /// Process exit status reported for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            SnapshotError::Write { .. } | SnapshotError::Serialize(_) => 1,
            SnapshotError::Config(_) => 2,
            SnapshotError::IncompleteHostMemory(_) => 3,
        }
    }
}
