//! ensembled.toml configuration.
//!
//! Every field has a default, so an absent file or an empty one gives a
//! working daemon. Command line flags override what the file sets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ensemble_controller::ControllerConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Directory holding the state database.
    pub data_dir: PathBuf,
    pub api: ApiConfig,
    pub controller: ControllerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// Ensembles reconciled concurrently.
    pub workers: usize,
    /// Deadline for each sidecar request.
    pub request_timeout_ms: u64,
    /// First retry delay after a failed tick.
    pub retry_base_ms: u64,
    /// Retry backoff ceiling.
    pub retry_max_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/ensemble"),
            api: ApiConfig::default(),
            controller: ControllerSettings::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            request_timeout_ms: 1000,
            retry_base_ms: 100,
            retry_max_ms: 30_000,
        }
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the file if one was given, otherwise use defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("ensemble.redb")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.controller.request_timeout_ms)
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            workers: self.controller.workers,
            retry_base: Duration::from_millis(self.controller.retry_base_ms),
            retry_max: Duration::from_millis(self.controller.retry_max_ms),
        }
    }
}
