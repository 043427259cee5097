use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read configuration '{path}'")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration '{path}'")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to prepare storage directory '{path}'")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open the checkpoint store")]
    Checkpoint(#[from] fate_saga::CheckpointError),

    #[error("failed to open the lease registry")]
    Lease(#[from] fate_saga::LeaseError),

    #[error("executor error")]
    Executor(#[from] fate_saga::ExecutorError),

    #[error("failed to open master state")]
    Operation(#[from] fate_operations::OperationError),

    #[error("{0} transaction(s) still running after {1} s")]
    NotIdle(usize, u64),
}

pub type Result<T> = std::result::Result<T, CliError>;
