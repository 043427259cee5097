use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fate_operations::config::{ImportConfig, ShutdownConfig};
use fate_saga::ExecutorConfig;
use serde::Deserialize;

use crate::error::{CliError, Result};

/// Contents of `master.toml`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub(crate) struct MasterConfig {
    pub storage: StorageConfig,
    pub executor: ExecutorConfig,
    pub import: ImportConfig,
    pub shutdown: ShutdownConfig,
}

impl MasterConfig {
    /// Reads `path`, falling back to defaults when it does not exist.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(CliError::ReadConfig {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&text).map_err(|source| CliError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// `[storage]`: where the master keeps its durable state.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub(crate) struct StorageConfig {
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("fate-state"),
        }
    }
}

impl StorageConfig {
    pub(crate) fn checkpoint_dir(&self) -> PathBuf {
        self.root.join("checkpoints")
    }

    pub(crate) fn lease_file(&self) -> PathBuf {
        self.root.join("leases.json")
    }

    /// Directory of the namespace and metadata snapshots.
    pub(crate) fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub(crate) fn bulk_root(&self) -> PathBuf {
        self.root.join("bulk")
    }
}
