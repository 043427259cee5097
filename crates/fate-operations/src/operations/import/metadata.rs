use fate_core::TableId;
use indexmap::IndexMap;

use crate::types::{
    DATAFILE_FAMILY, DIRECTORY_FAMILY, DIRECTORY_QUALIFIER, MetadataEntry, Mutation, end_row_of,
    file_name, metadata_row,
};
use crate::{OperationError, Result};

/// Where rewritten rows point and where they come from.
pub struct RowRewrite<'a> {
    pub table_name: &'a str,
    pub table_id: &'a TableId,
    /// Last component of the import directory, e.g. `b-1a`.
    pub bulk_dir: &'a str,
    pub mapping: &'a IndexMap<String, String>,
    /// Archive the rows were read from, for error messages.
    pub source: &'a str,
}

impl RowRewrite<'_> {
    /// Re-keys exported tablet rows to the new table id, one mutation per
    /// tablet. Data-file columns are renamed through the mapping and every
    /// tablet gets a fresh `/c-<8 hex digits>` directory. Reading stops at
    /// the previous-row column of the last tablet.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::MissingReferencedFile`] for a data file the
    /// mapping does not know, and [`OperationError::MalformedExport`] for a
    /// row that is not a tablet row or a stream without a last tablet.
    pub fn apply(&self, entries: impl IntoIterator<Item = MetadataEntry>) -> Result<Vec<Mutation>> {
        let mut mutations: Vec<Mutation> = Vec::new();
        let mut directories: u32 = 0;
        let mut reached_last_tablet = false;

        for entry in entries {
            let end_row = end_row_of(&entry.row).map_err(|()| OperationError::MalformedExport {
                path: self.source.to_string(),
                reason: format!("'{}' is not a tablet row", entry.row),
            })?;
            let row = metadata_row(self.table_id, end_row);

            if mutations.last().map(Mutation::row) != Some(row.as_str()) {
                let mut mutation = Mutation::new(row);
                mutation.put(
                    DIRECTORY_FAMILY,
                    DIRECTORY_QUALIFIER,
                    format!("/c-{directories:08x}"),
                );
                directories += 1;
                mutations.push(mutation);
            }
            let last_tablet = end_row.is_none() && entry.is_prev_row();
            let Some(mutation) = mutations.last_mut() else {
                continue;
            };

            if entry.family == DATAFILE_FAMILY {
                let old = file_name(&entry.qualifier);
                let new = self.mapping.get(old).ok_or_else(|| {
                    OperationError::MissingReferencedFile {
                        table: self.table_name.to_string(),
                        table_id: self.table_id.clone(),
                        file: old.to_string(),
                    }
                })?;
                mutation.put(
                    DATAFILE_FAMILY,
                    format!("/{}/{new}", self.bulk_dir),
                    entry.value,
                );
            } else if !entry.is_directory() {
                mutation.put(entry.family, entry.qualifier, entry.value);
            }

            if last_tablet {
                reached_last_tablet = true;
                break;
            }
        }

        if !reached_last_tablet {
            return Err(OperationError::MalformedExport {
                path: self.source.to_string(),
                reason: "metadata ends before the last tablet".to_string(),
            });
        }
        Ok(mutations)
    }
}
