pub mod snapshot_modules;
pub mod version;

pub use snapshot_modules::assembler::{MemorySnapshot, assemble_snapshot};
pub use snapshot_modules::config::SnapshotConfig;
pub use snapshot_modules::error::SnapshotError;
pub use snapshot_modules::runner::{run_once, run_with_source};
