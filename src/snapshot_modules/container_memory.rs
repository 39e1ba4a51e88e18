//! Per-container memory usage, read from the container runtime's status listing.
use async_trait::async_trait;
use indexmap::IndexMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use crate::snapshot_modules::units::{MemoryUnit, normalize};

/// Container name to memory usage in gigabytes, in the runtime's reporting order.
pub type ContainerMemory = IndexMap<String, f64>;

/// Format string handed to `stats`, one `<name> <usage> / <limit>` line per container.
pub const STATS_FORMAT: &str = "{{.Name}} {{.MemUsage}}";

/// A backend able to report memory usage for the running containers.
#[async_trait]
pub trait ContainerMetricsSource: Send + Sync {
    /// Never fails: an unavailable backend reports an empty mapping.
    async fn container_memory(&self) -> ContainerMemory;
}

/// Shells out to a Docker-compatible CLI (`docker`, `podman`, ...).
#[derive(Debug, Clone)]
pub struct DockerCliSource {
    program: String,
    /// Passed before `stats`, e.g. `--host unix:///run/user/1000/docker.sock`.
    leading_args: Vec<String>,
    timeout: Duration,
}

impl DockerCliSource {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout,
        }
    }

    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }

    fn stats_command(&self) -> TokioCommand {
        let mut command = TokioCommand::new(&self.program);
        command
            .args(&self.leading_args)
            .args(["stats", "--no-stream", "--format", STATS_FORMAT])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl ContainerMetricsSource for DockerCliSource {
    async fn container_memory(&self) -> ContainerMemory {
        let output = match tokio::time::timeout(self.timeout, self.stats_command().output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(program = %self.program, error = %e, "Failed to run container runtime, skipping container metrics.");
                return ContainerMemory::new();
            }
            Err(_) => {
                warn!(
                    program = %self.program,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Container runtime did not finish in time, skipping container metrics."
                );
                return ContainerMemory::new();
            }
        };

        if !output.status.success() {
            warn!(
                program = %self.program,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Container runtime exited with failure, skipping container metrics."
            );
            return ContainerMemory::new();
        }

        let containers = parse_container_stats(&String::from_utf8_lossy(&output.stdout));
        info!(count = containers.len(), "Collected container memory usage.");
        containers
    }
}

/// A fixed mapping, used when container collection is turned off.
#[derive(Debug, Clone, Default)]
pub struct StaticContainerSource {
    containers: ContainerMemory,
}

impl StaticContainerSource {
    pub fn new(containers: ContainerMemory) -> Self {
        Self { containers }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContainerMetricsSource for StaticContainerSource {
    async fn container_memory(&self) -> ContainerMemory {
        self.containers.clone()
    }
}

/// Parses `<name> <usage>[/<limit>]` lines. A repeated name keeps its first
/// position but takes the later value.
pub fn parse_container_stats(output: &str) -> ContainerMemory {
    let mut containers = ContainerMemory::new();
    for line in output.lines() {
        let mut tokens = line.split_whitespace();
        let (Some(name), Some(usage)) = (tokens.next(), tokens.next()) else {
            if !line.trim().is_empty() {
                debug!(line, "Skipping container stats line without a usage column.");
            }
            continue;
        };
        containers.insert(name.to_string(), parse_usage(usage));
    }
    containers
}

/// Converts a token like `12.5MiB` or `512MiB/1GiB` to gigabytes.
/// Unknown suffixes and unparsable magnitudes report zero.
fn parse_usage(token: &str) -> f64 {
    let usage = token.split('/').next().unwrap_or(token);
    let Some(split_at) = usage.len().checked_sub(3) else {
        debug!(token, "Usage token too short for a unit suffix, reporting zero.");
        return 0.0;
    };
    if !usage.is_char_boundary(split_at) {
        return 0.0;
    }

    let (magnitude, suffix) = usage.split_at(split_at);
    let unit = match suffix {
        "GiB" => MemoryUnit::GiB,
        "MiB" => MemoryUnit::MiB,
        "KiB" => MemoryUnit::KiB,
        _ => {
            debug!(token, suffix, "Unrecognized unit suffix, reporting zero.");
            return 0.0;
        }
    };

    match magnitude.parse::<f64>() {
        Ok(value) if value.is_finite() => normalize(value, unit),
        Ok(value) => {
            warn!(token, value, "Non-finite container memory magnitude, reporting zero.");
            0.0
        }
        Err(e) => {
            warn!(token, error = %e, "Unparsable container memory magnitude, reporting zero.");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_compact_usage_with_limit() {
        let containers = parse_container_stats("app1 512MiB/1GiB\napp2 2GiB/4GiB\n");
        let expected: ContainerMemory =
            [("app1".to_string(), 0.50), ("app2".to_string(), 2.00)].into_iter().collect();
        assert_eq!(containers, expected);
    }

    #[test]
    fn test_parses_docker_spaced_format() {
        let output = "web 1.2GiB / 7.6GiB\ndb 300.5MiB / 7.6GiB\ncache 512KiB / 7.6GiB\n";
        let containers = parse_container_stats(output);
        assert_eq!(containers.get("web"), Some(&1.20));
        assert_eq!(containers.get("db"), Some(&0.29));
        assert_eq!(containers.get("cache"), Some(&0.00));
    }

    #[test]
    fn test_preserves_reporting_order() {
        let containers = parse_container_stats("zeta 1GiB\nalpha 2GiB\nmid 3GiB\n");
        let names: Vec<&str> = containers.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_duplicate_name_takes_later_value() {
        let containers = parse_container_stats("app 1GiB\nother 2GiB\napp 3GiB\n");
        assert_eq!(containers.len(), 2);
        assert_eq!(containers.get("app"), Some(&3.00));
        assert_eq!(containers.get_index(0).map(|(k, _)| k.as_str()), Some("app"));
    }

    #[test]
    fn test_unknown_suffix_reports_zero() {
        let containers = parse_container_stats("a 0B / 0B\nb 1.5TiB / 2TiB\nc 12kB / 1GiB\n");
        assert_eq!(containers.get("a"), Some(&0.0));
        assert_eq!(containers.get("b"), Some(&0.0));
        assert_eq!(containers.get("c"), Some(&0.0));
    }

    #[test]
    fn test_bad_magnitude_reports_zero() {
        let containers = parse_container_stats("a --MiB / 1GiB\nb MiB\n");
        assert_eq!(containers.get("a"), Some(&0.0));
        assert_eq!(containers.get("b"), Some(&0.0));
    }

    #[test]
    fn test_non_finite_magnitude_reports_zero() {
        let containers = parse_container_stats("a infMiB / 1GiB\nb NaNGiB\nc -infKiB\n");
        assert_eq!(containers.get("a"), Some(&0.0));
        assert_eq!(containers.get("b"), Some(&0.0));
        assert_eq!(containers.get("c"), Some(&0.0));
        let json = serde_json::to_string(&containers).unwrap();
        assert!(!json.contains("null"), "{json}");
    }

    #[test]
    fn test_skips_blank_and_short_lines() {
        let containers = parse_container_stats("\n   \nlonely\napp 1GiB\n");
        assert_eq!(containers.len(), 1);
        assert_eq!(containers.get("app"), Some(&1.00));
    }

    #[tokio::test]
    async fn test_static_source_returns_fixture() {
        let fixture: ContainerMemory = [("app".to_string(), 0.25)].into_iter().collect();
        let source = StaticContainerSource::new(fixture.clone());
        assert_eq!(source.container_memory().await, fixture);
        assert!(StaticContainerSource::empty().container_memory().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_runtime_degrades_to_empty() {
        let source = DockerCliSource::new(
            "/nonexistent/memsnap-test-runtime",
            Duration::from_secs(5),
        );
        assert!(source.container_memory().await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_runtime_degrades_to_empty() {
        let source = DockerCliSource::new("false", Duration::from_secs(5));
        assert!(source.container_memory().await.is_empty());
    }

    #[cfg(unix)]
    mod fake_runtime {
        use crate::snapshot_modules::container_memory::{ContainerMetricsSource, DockerCliSource};
        use std::path::PathBuf;
        use std::time::Duration;

        // Scripts are handed to `sh` as an argument rather than executed
        // directly, so a concurrently forked child holding the write handle
        // cannot make the spawn fail with ETXTBSY.
        fn write_script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
            let path = dir.path().join("fake-runtime.sh");
            std::fs::write(&path, format!("{body}\n")).unwrap();
            path
        }

        fn sh_runtime(script: PathBuf, timeout: Duration) -> DockerCliSource {
            DockerCliSource::new("/bin/sh", timeout)
                .with_leading_args(vec![script.to_string_lossy().into_owned()])
        }

        #[tokio::test]
        async fn test_reads_runtime_output() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(
                &dir,
                "printf 'app1 512MiB / 1GiB\\napp2 2GiB / 4GiB\\n'",
            );
            let containers = sh_runtime(script, Duration::from_secs(10))
                .container_memory()
                .await;
            assert_eq!(containers.get("app1"), Some(&0.50));
            assert_eq!(containers.get("app2"), Some(&2.00));
        }

        #[tokio::test]
        async fn test_leading_args_come_before_stats() {
            let dir = tempfile::tempdir().unwrap();
            // $1 is the first argument after the script path.
            let script = write_script(&dir, "printf '%s 1GiB\\n' \"$1\"");
            let containers = sh_runtime(script, Duration::from_secs(10))
                .container_memory()
                .await;
            assert_eq!(containers.get("stats"), Some(&1.00));
        }

        #[tokio::test]
        async fn test_hung_runtime_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(&dir, "sleep 10");
            let source = sh_runtime(script, Duration::from_millis(200));
            assert!(source.container_memory().await.is_empty());
        }
    }
}
