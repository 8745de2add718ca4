//! Container engine abstraction.
//!
//! Mailroom runs agent containers through one of two engines: Docker, or
//! Apple's `container` CLI on macOS. The two have different invocation
//! grammar for almost everything (daemon checks, listings, read-only
//! mounts), so the closed `Engine` enum carries the per-engine CLI details
//! and callers execute the returned argv. Adding an engine means adding a
//! variant here, not touching call sites.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Engine {
    #[serde(rename = "docker")]
    Docker,
    #[serde(rename = "container")]
    AppleContainer,
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The override named something outside the supported set.
    #[error("unsupported container runtime {0:?}: expected \"docker\" or \"container\"")]
    UnsupportedOverride(String),
    /// Neither engine responded to its version probe.
    #[error(
        "no container runtime found: neither `docker --version` nor `container --version` succeeded"
    )]
    NotFound,
}

impl Engine {
    /// Parse an explicit runtime override. Strict: only the two CLI binary
    /// names are accepted.
    pub fn from_name(name: &str) -> Result<Self, EngineError> {
        match name {
            "docker" => Ok(Engine::Docker),
            "container" => Ok(Engine::AppleContainer),
            other => Err(EngineError::UnsupportedOverride(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Engine::Docker => "docker",
            Engine::AppleContainer => "container",
        }
    }

    /// CLI binary invoked for every operation.
    pub fn binary(self) -> &'static str {
        self.as_str()
    }

    /// Cheap availability probe used during detection.
    pub fn probe_args(self) -> &'static [&'static str] {
        &["--version"]
    }

    /// Checks that the engine's daemon/system service is reachable.
    pub fn status_args(self) -> &'static [&'static str] {
        match self {
            Engine::Docker => &["info"],
            Engine::AppleContainer => &["system", "status"],
        }
    }

    /// Explicit start command for engines that have one. Docker's daemon is
    /// managed externally (Docker Desktop, systemd); the Apple runtime can be
    /// started from the CLI.
    pub fn start_args(self) -> Option<&'static [&'static str]> {
        match self {
            Engine::Docker => None,
            Engine::AppleContainer => Some(&["system", "start"]),
        }
    }

    /// Lists running containers in the engine's native JSON format.
    pub fn list_args(self) -> &'static [&'static str] {
        match self {
            Engine::Docker => &["ps", "--format", "json"],
            Engine::AppleContainer => &["ls", "--format", "json"],
        }
    }

    pub fn stop_args(self, name: &str) -> Vec<String> {
        vec!["stop".to_string(), name.to_string()]
    }

    /// Operator-facing hint shown when the engine stays unreachable.
    pub fn start_hint(self) -> &'static str {
        match self {
            Engine::Docker => {
                "Docker daemon is not reachable. Start Docker Desktop (or `systemctl start docker`) and restart mailroomd."
            }
            Engine::AppleContainer => {
                "Apple container runtime is not reachable and `container system start` did not bring it up. Run `container system start` manually and restart mailroomd."
            }
        }
    }

    /// Parse the engine's native listing output into normalized descriptors.
    ///
    /// Docker emits one JSON object per line (`Names`, `State`); the Apple
    /// CLI emits a single JSON array with the name nested under
    /// `configuration.id`. Entries that do not match the expected shape are
    /// skipped rather than failing the whole listing.
    pub fn parse_listing(self, stdout: &str) -> Vec<ContainerSummary> {
        match self {
            Engine::Docker => stdout
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
                .filter_map(|value| {
                    let name = value.get("Names")?.as_str()?.to_string();
                    let status = value
                        .get("State")
                        .or_else(|| value.get("Status"))
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown")
                        .to_string();
                    Some(ContainerSummary { name, status })
                })
                .collect(),
            Engine::AppleContainer => {
                let parsed: serde_json::Value = match serde_json::from_str(stdout.trim()) {
                    Ok(v) => v,
                    Err(_) => return Vec::new(),
                };
                parsed
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|item| {
                                let name = item
                                    .get("configuration")
                                    .and_then(|c| c.get("id"))
                                    .or_else(|| item.get("id"))?
                                    .as_str()?
                                    .to_string();
                                let status = item
                                    .get("status")
                                    .and_then(|v| v.as_str())
                                    .unwrap_or("unknown")
                                    .to_string();
                                Some(ContainerSummary { name, status })
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            }
        }
    }
}

/// Normalized view over an engine's container listing. Recomputed on every
/// query; a cached listing could double-stop or miss an orphan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub name: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_name_accepts_closed_set() {
        assert_eq!(Engine::from_name("docker").unwrap(), Engine::Docker);
        assert_eq!(
            Engine::from_name("container").unwrap(),
            Engine::AppleContainer
        );
    }

    #[test]
    fn from_name_rejects_unknown_runtime() {
        let err = Engine::from_name("podman").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedOverride(ref name) if name == "podman"));
    }

    #[test]
    fn parse_docker_listing_json_lines() {
        let stdout = concat!(
            r#"{"Names":"mailroom-main-17000","State":"running","Status":"Up 2 minutes"}"#,
            "\n",
            r#"{"Names":"unrelated-svc","State":"running"}"#,
            "\n",
        );
        let listed = Engine::Docker.parse_listing(stdout);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "mailroom-main-17000");
        assert_eq!(listed[0].status, "running");
    }

    #[test]
    fn parse_docker_listing_skips_noise_lines() {
        let stdout = "WARNING: something\n{\"Names\":\"mailroom-a-1\",\"State\":\"running\"}\n";
        let listed = Engine::Docker.parse_listing(stdout);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "mailroom-a-1");
    }

    #[test]
    fn parse_apple_listing_array() {
        let stdout = r#"[
            {"status":"running","configuration":{"id":"mailroom-team-eng-42"}},
            {"status":"stopped","configuration":{"id":"other"}}
        ]"#;
        let listed = Engine::AppleContainer.parse_listing(stdout);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "mailroom-team-eng-42");
        assert_eq!(listed[1].status, "stopped");
    }

    #[test]
    fn parse_listing_garbage_returns_empty() {
        assert!(Engine::Docker.parse_listing("not json at all").is_empty());
        assert!(Engine::AppleContainer.parse_listing("not json at all").is_empty());
        assert!(Engine::AppleContainer.parse_listing("{}").is_empty());
    }

    #[test]
    fn engine_serializes_to_cli_name() {
        assert_eq!(
            serde_json::to_string(&Engine::AppleContainer).unwrap(),
            "\"container\""
        );
        assert_eq!(serde_json::to_string(&Engine::Docker).unwrap(), "\"docker\"");
    }
}
