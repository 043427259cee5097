//! Importing a table from an export directory: reserve the export, allocate
//! a table id, register the table, rename the exported files into a fresh
//! directory, rewrite the tablet metadata and bring the table online.

mod context;
mod mapping;
mod metadata;
mod steps;

pub use context::ImportContext;
pub use mapping::{MAPPING_FILE, imported_extension, read_mapping};
pub use metadata::RowRewrite;
pub use steps::{ImportStep, TABLE_CREATION_LEASE};

use crate::context::MasterContext;
use crate::export::ExportArchive;
use crate::types::ImportRequest;
use crate::{OperationError, Result};

/// Checks an import request and returns the first step of its chain.
/// Nothing is reserved or written here.
///
/// # Errors
///
/// Returns [`OperationError::InvalidTableName`] for a malformed name and
/// [`OperationError::IncompatibleExportVersion`] or
/// [`OperationError::IncompatibleDataVersion`] when the export is newer than
/// this master understands, or missing its version.
pub fn prepare_import(env: &MasterContext, request: ImportRequest) -> Result<ImportStep> {
    if !is_valid_table_name(&request.table_name) {
        return Err(OperationError::InvalidTableName(request.table_name));
    }

    let config = env.import_config();
    let info = ExportArchive::open(env.files(), &request.export_dir)?.info()?;
    match info.export_version {
        Some(version) if version <= config.supported_export_version => {}
        found => {
            return Err(OperationError::IncompatibleExportVersion {
                table: request.table_name,
                found,
                supported: config.supported_export_version,
            });
        }
    }
    match info.data_version {
        Some(version) if version <= config.supported_data_version => {}
        found => {
            return Err(OperationError::IncompatibleDataVersion {
                table: request.table_name,
                found,
                supported: config.supported_data_version,
            });
        }
    }

    Ok(ImportStep::ReserveExportDir(ImportContext::new(
        request.export_dir,
        request.user,
        request.table_name,
    )))
}

/// `name` or `namespace.name`, each part made of ASCII letters, digits and
/// underscores.
#[must_use]
pub fn is_valid_table_name(name: &str) -> bool {
    let valid_part = |part: &str| {
        !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    match name.split_once('.') {
        Some((namespace, table)) => valid_part(namespace) && valid_part(table),
        None => valid_part(name),
    }
}
