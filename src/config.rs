//! Toolkit configuration. Every section falls back to defaults when absent.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcmanConfig {
    /// Registry of self-created processes
    pub manager: ManagerConfig,
    /// Polling cadence for status and resource watches
    pub monitor: MonitorConfig,
    /// Optional sub-queries run on every inspection
    pub inspector: InspectorConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Upper bound on concurrently managed processes
    pub max_processes: usize,
    /// Shell used to run commands; platform default when unset
    pub shell: Option<String>,
    /// Time a terminated process gets before it is killed outright
    pub terminate_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub default_interval_ms: u64,
    pub history_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    pub command_line: bool,
    pub environment: bool,
    pub privileges: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_processes: 20,
            shell: None,
            terminate_grace_ms: 3000,
        }
    }
}

impl ManagerConfig {
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: 1000,
            history_interval_ms: 500,
        }
    }
}

impl MonitorConfig {
    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_interval_ms.max(1))
    }

    pub fn history_interval(&self) -> Duration {
        Duration::from_millis(self.history_interval_ms.max(1))
    }
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            command_line: true,
            environment: true,
            privileges: true,
        }
    }
}

impl InspectorConfig {
    /// Identity, resources and CPU only. The owner lookup is skipped too, so
    /// `username` stays empty.
    pub fn minimal() -> Self {
        Self {
            command_line: false,
            environment: false,
            privileges: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ProcmanConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            if let Ok(data) = std::fs::read_to_string(path) {
                match serde_json::from_str::<ProcmanConfig>(&data) {
                    Ok(c) => return c,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config")
                    }
                }
            }
        }
        Self::default()
    }

    /// `PROCMAN_CONFIG_PATH`, else `<config dir>/procman/config.json`.
    pub fn default_path() -> PathBuf {
        if let Ok(p) = std::env::var("PROCMAN_CONFIG_PATH") {
            return PathBuf::from(p);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("procman")
            .join("config.json")
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, data)
    }
}
