use fate_core::{NodeAddress, TableId};
use fate_saga::{Classify, ErrorClass};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OperationError {
    #[error(transparent)]
    Core(#[from] fate_core::CoreError),

    #[error("bulk store operation on '{path}' failed")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("namespace node '{path}' already exists")]
    NodeExists { path: String },

    #[error("namespace node '{path}' holds invalid data: {reason}")]
    CorruptNode { path: String, reason: String },

    #[error("failed to persist {what}")]
    Persist {
        what: &'static str,
        #[source]
        source: fate_saga::PersistError,
    },

    #[error(transparent)]
    Lease(#[from] fate_saga::LeaseError),

    #[error("lease {key} is held by another transaction")]
    LeaseUnavailable { key: String },

    #[error("connection to tablet server {node} failed: {message}")]
    NodeTransport { node: NodeAddress, message: String },

    #[error("tablet server {node} failed the request: {message}")]
    NodeRequest { node: NodeAddress, message: String },

    #[error("tablet server {node} still online after {waited_ms} ms")]
    ShutdownTimedOut { node: NodeAddress, waited_ms: u64 },

    #[error("invalid table name '{0}'")]
    InvalidTableName(String),

    #[error(
        "cannot import table '{table}': incompatible export version {}, supported up to {supported}",
        display_version(*found)
    )]
    IncompatibleExportVersion {
        table: String,
        found: Option<u32>,
        supported: u32,
    },

    #[error(
        "cannot import table '{table}': incompatible data version {}, supported up to {supported}",
        display_version(*found)
    )]
    IncompatibleDataVersion {
        table: String,
        found: Option<u32>,
        supported: u32,
    },

    #[error("table '{name}' already exists with id {existing}")]
    TableExists { name: String, existing: TableId },

    #[error("invalid table property '{key}' for table '{table}' ({table_id})")]
    InvalidTableProperty {
        table: String,
        table_id: TableId,
        key: String,
    },

    #[error("file '{file}' referenced by the export of table '{table}' ({table_id}) does not exist")]
    MissingReferencedFile {
        table: String,
        table_id: TableId,
        file: String,
    },

    #[error("malformed export '{path}': {reason}")]
    MalformedExport { path: String, reason: String },

    #[error("malformed mapping file '{path}' at line {line}")]
    MalformedMapping { path: String, line: usize },

    #[error("import of table '{table}' reached {phase} without its {missing}")]
    IncompleteImport {
        table: String,
        phase: &'static str,
        missing: &'static str,
    },

    #[error("failed to encode {what}")]
    Serialization {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

fn display_version(version: Option<u32>) -> String {
    version.map_or_else(|| "<missing>".to_string(), |v| v.to_string())
}

pub type Result<T> = std::result::Result<T, OperationError>;

impl OperationError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl Classify for OperationError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Io { .. }
            | Self::Persist { .. }
            | Self::Lease(_)
            | Self::LeaseUnavailable { .. }
            | Self::NodeTransport { .. }
            | Self::NodeRequest { .. } => ErrorClass::Operational,
            Self::Cancelled => ErrorClass::Interrupted,
            Self::Core(_)
            | Self::NodeExists { .. }
            | Self::CorruptNode { .. }
            | Self::ShutdownTimedOut { .. }
            | Self::InvalidTableName(_)
            | Self::IncompatibleExportVersion { .. }
            | Self::IncompatibleDataVersion { .. }
            | Self::TableExists { .. }
            | Self::InvalidTableProperty { .. }
            | Self::MissingReferencedFile { .. }
            | Self::MalformedExport { .. }
            | Self::MalformedMapping { .. }
            | Self::IncompleteImport { .. }
            | Self::Serialization { .. } => ErrorClass::Semantic,
        }
    }
}
