use std::path::PathBuf;

use fate_core::{TxId, TxStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the executor treats a step error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// I/O or network trouble. Retried by going back through readiness, up to
    /// the configured limit, never by re-running `execute` directly.
    Operational,
    /// The operation can never succeed (bad input, conflicting state). Fails the
    /// transaction and starts compensation.
    Semantic,
    /// The executor is shutting down. The transaction is left as it is and
    /// picked up again by the next process.
    Interrupted,
}

/// Classification of step errors.
pub trait Classify {
    fn class(&self) -> ErrorClass;
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to read '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write '{path}'")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode '{path}'")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode '{path}'")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("transaction {0} not found")]
    NotFound(TxId),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("failed to list checkpoint directory '{path}'")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to delete checkpoint of transaction {tx}")]
    Delete {
        tx: TxId,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("failed to persist lease table")]
    Persist(#[from] PersistError),
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Lease(#[from] LeaseError),

    #[error("transaction {tx} is {status}, expected {expected}")]
    InvalidStatus {
        tx: TxId,
        status: TxStatus,
        expected: &'static str,
    },

    #[error("transaction {tx} has no current step while {status}")]
    MissingStep { tx: TxId, status: TxStatus },

    #[error("timed out waiting for transaction {0}")]
    Timeout(TxId),

    #[error("executor pool is shut down")]
    ShutDown,

    #[error("failed to spawn executor worker")]
    Spawn(#[source] std::io::Error),
}

/// Renders an error followed by its `source()` chain, separated by `": "`.
#[must_use]
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_chain_includes_sources() {
        let err = CheckpointError::List {
            path: PathBuf::from("/var/fate"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };

        let message = error_chain(&err);

        assert_eq!(
            message,
            "failed to list checkpoint directory '/var/fate': denied"
        );
    }

    #[test]
    fn invalid_status_names_transaction_and_status() {
        let err = ExecutorError::InvalidStatus {
            tx: TxId::new(10),
            status: TxStatus::Successful,
            expected: "NEW",
        };

        let msg = err.to_string();

        assert!(msg.contains("000000000000000a"));
        assert!(msg.contains("SUCCESSFUL"));
        assert!(msg.contains("NEW"));
    }
}
