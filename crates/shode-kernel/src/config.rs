//! Configuration for the shode engine.
//!
//! Configuration is loaded from `<config dir>/shode/config.toml`, or from the
//! file named by `SHODE_CONFIG`. Every table and field is optional.
//!
//! ```toml
//! [engine]
//! errexit = true
//! pipefail = false
//! interactive = false
//! kill_grace_ms = 2000
//!
//! [modules]
//! search_dir = "sh_models"
//! export_prefix = "export_"
//! manifest = "package.json"
//!
//! [security]
//! allowed_write_prefixes = ["/tmp"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::modules::ModuleSettings;
use crate::sandbox::SecurityPolicy;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SHODE_CONFIG";

/// Engine behavior switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Stop at the first failing top-level statement.
    #[serde(default = "default_errexit")]
    pub errexit: bool,

    /// A pipeline fails with its first non-zero stage.
    #[serde(default)]
    pub pipefail: bool,

    /// Bind the top level to the terminal instead of capture buffers.
    #[serde(default)]
    pub interactive: bool,

    /// Time between SIGTERM and SIGKILL when a run is cancelled.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
}

fn default_errexit() -> bool {
    true
}

fn default_kill_grace_ms() -> u64 {
    2000
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            errexit: default_errexit(),
            pipefail: false,
            interactive: false,
            kill_grace_ms: default_kill_grace_ms(),
        }
    }
}

impl EngineOptions {
    /// Options for a terminal session.
    pub fn interactive() -> Self {
        Self {
            interactive: true,
            ..Self::default()
        }
    }

    pub fn with_errexit(mut self, errexit: bool) -> Self {
        self.errexit = errexit;
        self
    }

    pub fn with_pipefail(mut self, pipefail: bool) -> Self {
        self.pipefail = pipefail;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace_ms = grace.as_millis() as u64;
        self
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

/// Everything read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default)]
    pub engine: EngineOptions,

    #[serde(default)]
    pub modules: ModuleSettings,

    #[serde(default)]
    pub security: SecurityPolicy,
}

impl ShellConfig {
    /// Load from `SHODE_CONFIG` or the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let Some(path) = Self::config_path() else {
            tracing::debug!("no config directory, using defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            tracing::debug!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        Self::parse(&content).with_context(|| format!("failed to parse config from {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// `SHODE_CONFIG` if set, else the platform config directory.
    pub fn config_path() -> Option<PathBuf> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(explicit));
        }
        ProjectDirs::from("", "", "shode").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
