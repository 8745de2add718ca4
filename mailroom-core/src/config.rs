use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MailroomConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub watcher: WatcherConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the health/readiness endpoints.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7410".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data root; mailboxes live under `<data_dir>/ipc/<folder>/`.
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Poll interval for the mailbox watcher (milliseconds).
    pub poll_interval_ms: u64,
    /// Folder name of the privileged main group.
    pub main_group_folder: String,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            main_group_folder: "main".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Explicit engine selection ("docker" or "container"). When unset the
    /// daemon probes for an installed engine at startup.
    pub engine_override: Option<String>,
    /// Timeout for each engine version probe (milliseconds). A hung CLI must
    /// not block startup.
    pub probe_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine_override: None,
            probe_timeout_ms: 5000,
        }
    }
}

pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<MailroomConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(MailroomConfig::default().with_env_overrides());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let parsed: MailroomConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    Ok(parsed.with_env_overrides())
}

impl MailroomConfig {
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(bind) = std::env::var("MAILROOMD_BIND") {
            if !bind.trim().is_empty() {
                self.server.bind = bind;
            }
        }

        if let Ok(dir) = std::env::var("MAILROOM_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.storage.data_dir = dir;
            }
        }

        if let Ok(engine) = std::env::var("MAILROOM_RUNTIME") {
            if !engine.trim().is_empty() {
                self.runtime.engine_override = Some(engine.trim().to_string());
            }
        }

        self
    }
}
