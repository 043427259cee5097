use fate_core::{TableId, TxId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::paths;
use crate::{OperationError, Result};

/// State of one table import, carried inside every import step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportContext {
    pub source_export_dir: String,
    pub importing_user: String,
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<TableId>,
    /// Working directory the imported files end up in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_dir: Option<String>,
    /// Exported file name to imported file name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub file_name_mapping: IndexMap<String, String>,
}

impl ImportContext {
    #[must_use]
    pub fn new(
        source_export_dir: impl Into<String>,
        importing_user: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            source_export_dir: source_export_dir.into(),
            importing_user: importing_user.into(),
            table_name: table_name.into(),
            table_id: None,
            import_dir: None,
            file_name_mapping: IndexMap::new(),
        }
    }

    pub(crate) fn require_table_id(&self, phase: &'static str) -> Result<&TableId> {
        self.table_id
            .as_ref()
            .ok_or_else(|| OperationError::IncompleteImport {
                table: self.table_name.clone(),
                phase,
                missing: "table id",
            })
    }

    pub(crate) fn require_import_dir(&self, phase: &'static str) -> Result<&str> {
        self.import_dir
            .as_deref()
            .ok_or_else(|| OperationError::IncompleteImport {
                table: self.table_name.clone(),
                phase,
                missing: "import directory",
            })
    }
}

/// Namespace area holding values a step must reuse when it is re-executed.
pub(crate) fn scratch_root(tx: TxId) -> String {
    format!("{}/{tx}", paths::FATE)
}

pub(crate) fn scratch_node(tx: TxId, leaf: &str) -> String {
    format!("{}/import/{leaf}", scratch_root(tx))
}
