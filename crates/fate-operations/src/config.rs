use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `[import]` section of the master configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ImportConfig {
    /// Root of the per-table directories in the bulk store.
    pub tables_dir: String,
    pub supported_export_version: u32,
    pub supported_data_version: u32,
    /// Extensions of data files that are carried over by an import.
    pub valid_extensions: Vec<String>,
    /// Extension given to exported files that have none.
    pub default_extension: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            tables_dir: "/tables".to_string(),
            supported_export_version: 1,
            supported_data_version: 4,
            valid_extensions: vec!["rf".to_string(), "map".to_string()],
            default_extension: "map".to_string(),
        }
    }
}

impl ImportConfig {
    #[must_use]
    pub fn is_valid_extension(&self, extension: &str) -> bool {
        self.valid_extensions.iter().any(|e| e == extension)
    }
}

/// `[shutdown]` section of the master configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ShutdownConfig {
    pub poll_interval_ms: u64,
    /// Upper bound for a graceful shutdown wait.
    pub max_wait_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_wait_ms: 600_000,
        }
    }
}

impl ShutdownConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}
