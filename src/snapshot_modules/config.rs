use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::snapshot_modules::assembler::AssemblySettings;
use crate::snapshot_modules::container_memory::{
    ContainerMetricsSource, DockerCliSource, StaticContainerSource,
};
use crate::snapshot_modules::error::SnapshotError;

pub const OUTPUT_FILE_NAME: &str = "memory_usage.json";
pub const ENV_PREFIX: &str = "MEMSNAP_";

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotConfig {
    pub output_path: PathBuf,
    pub meminfo_path: PathBuf,
    pub container_runtime: String,
    pub container_runtime_args: Vec<String>,
    pub container_timeout_secs: u64,
    pub collect_containers: bool,
    pub excluded_containers: Vec<String>,
    pub require_host_memory: bool,
    pub log_dir: Option<PathBuf>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug, Clone)]
pub struct PartialSnapshotConfig {
    pub output_path: Option<PathBuf>,
    pub meminfo_path: Option<PathBuf>,
    pub container_runtime: Option<String>,
    pub container_runtime_args: Option<Vec<String>>,
    pub container_timeout_secs: Option<u64>,
    pub collect_containers: Option<bool>,
    pub excluded_containers: Option<Vec<String>>,
    pub require_host_memory: Option<bool>,
    pub log_dir: Option<PathBuf>,
}

impl PartialSnapshotConfig {
    /// Fields set in `overrides` win over fields set in `self`.
    pub fn layer(self, overrides: PartialSnapshotConfig) -> PartialSnapshotConfig {
        PartialSnapshotConfig {
            output_path: overrides.output_path.or(self.output_path),
            meminfo_path: overrides.meminfo_path.or(self.meminfo_path),
            container_runtime: overrides.container_runtime.or(self.container_runtime),
            container_runtime_args: overrides
                .container_runtime_args
                .or(self.container_runtime_args),
            container_timeout_secs: overrides
                .container_timeout_secs
                .or(self.container_timeout_secs),
            collect_containers: overrides.collect_containers.or(self.collect_containers),
            excluded_containers: overrides.excluded_containers.or(self.excluded_containers),
            require_host_memory: overrides.require_host_memory.or(self.require_host_memory),
            log_dir: overrides.log_dir.or(self.log_dir),
        }
    }
}

fn default_meminfo_path() -> PathBuf {
    PathBuf::from("/proc/meminfo")
}

fn default_container_runtime() -> String {
    "docker".to_string()
}

fn default_container_timeout_secs() -> u64 {
    30
}

/// `<home>/memory_usage.json`, resolved once here and nowhere else.
pub fn default_output_path(home: Option<&Path>) -> Result<PathBuf, SnapshotError> {
    home.map(|home| home.join(OUTPUT_FILE_NAME)).ok_or_else(|| {
        SnapshotError::Config(
            "could not resolve a home directory; set output_path explicitly".to_string(),
        )
    })
}

pub fn read_config_file(path: &Path) -> Result<PartialSnapshotConfig, SnapshotError> {
    let contents = fs::read_to_string(path).map_err(|e| {
        SnapshotError::Config(format!("Failed to read config file at {path:?}: {e}"))
    })?;
    toml::from_str(&contents).map_err(|e| {
        SnapshotError::Config(format!("Failed to parse TOML from config file at {path:?}: {e}"))
    })
}

pub fn read_env_config() -> Result<PartialSnapshotConfig, SnapshotError> {
    envy::prefixed(ENV_PREFIX)
        .from_env::<PartialSnapshotConfig>()
        .map_err(|e| SnapshotError::Config(format!("Failed to load config from environment: {e}")))
}

impl SnapshotConfig {
    /// Defaults, then the optional TOML file, then `MEMSNAP_*` variables, then `cli`.
    pub fn load(
        config_path: Option<&Path>,
        cli: PartialSnapshotConfig,
    ) -> Result<Self, SnapshotError> {
        let file_config = match config_path {
            Some(path) => read_config_file(path)?,
            None => PartialSnapshotConfig::default(),
        };
        let env_config = read_env_config()?;

        let merged = file_config.layer(env_config).layer(cli);
        Self::resolve(merged, dirs::home_dir().as_deref())
    }

    /// Fills unset fields with defaults and validates the result.
    pub fn resolve(
        partial: PartialSnapshotConfig,
        home: Option<&Path>,
    ) -> Result<Self, SnapshotError> {
        let output_path = match partial.output_path {
            Some(path) => path,
            None => default_output_path(home)?,
        };

        let container_timeout_secs = partial
            .container_timeout_secs
            .unwrap_or_else(default_container_timeout_secs);
        if container_timeout_secs == 0 {
            return Err(SnapshotError::Config(
                "container_timeout_secs must be greater than 0".to_string(),
            ));
        }

        let container_runtime = partial
            .container_runtime
            .unwrap_or_else(default_container_runtime);
        if container_runtime.trim().is_empty() {
            return Err(SnapshotError::Config(
                "container_runtime must not be empty".to_string(),
            ));
        }

        Ok(SnapshotConfig {
            output_path,
            meminfo_path: partial.meminfo_path.unwrap_or_else(default_meminfo_path),
            container_runtime,
            container_runtime_args: partial.container_runtime_args.unwrap_or_default(),
            container_timeout_secs,
            collect_containers: partial.collect_containers.unwrap_or(true),
            excluded_containers: partial.excluded_containers.unwrap_or_default(),
            require_host_memory: partial.require_host_memory.unwrap_or(false),
            log_dir: partial.log_dir,
        })
    }

    pub fn assembly_settings(&self) -> AssemblySettings {
        AssemblySettings {
            meminfo_path: self.meminfo_path.clone(),
            excluded_containers: self.excluded_containers.clone(),
            require_host_memory: self.require_host_memory,
        }
    }

    pub fn container_source(&self) -> Box<dyn ContainerMetricsSource> {
        if self.collect_containers {
            Box::new(
                DockerCliSource::new(
                    self.container_runtime.clone(),
                    Duration::from_secs(self.container_timeout_secs),
                )
                .with_leading_args(self.container_runtime_args.clone()),
            )
        } else {
            Box::new(StaticContainerSource::empty())
        }
    }
}
