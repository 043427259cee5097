use std::fmt;

use fate_core::TableId;
use serde::{Deserialize, Serialize};

/// Name of the table holding tablet metadata.
pub const METADATA_TABLE: &str = "!METADATA";

/// Column family holding one entry per data file of a tablet.
pub const DATAFILE_FAMILY: &str = "file";
/// Column holding the previous tablet's end row.
pub const PREV_ROW_FAMILY: &str = "~tab";
pub const PREV_ROW_QUALIFIER: &str = "~pr";
/// Column holding the tablet's directory.
pub const DIRECTORY_FAMILY: &str = "srv";
pub const DIRECTORY_QUALIFIER: &str = "dir";

/// One cell of the metadata table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub row: String,
    pub family: String,
    pub qualifier: String,
    pub value: String,
}

impl MetadataEntry {
    #[must_use]
    pub fn new(
        row: impl Into<String>,
        family: impl Into<String>,
        qualifier: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            row: row.into(),
            family: family.into(),
            qualifier: qualifier.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn is_prev_row(&self) -> bool {
        self.family == PREV_ROW_FAMILY && self.qualifier == PREV_ROW_QUALIFIER
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.family == DIRECTORY_FAMILY && self.qualifier == DIRECTORY_QUALIFIER
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnUpdate {
    pub family: String,
    pub qualifier: String,
    pub value: String,
}

/// All updates to a single row, applied together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    row: String,
    updates: Vec<ColumnUpdate>,
}

impl Mutation {
    #[must_use]
    pub fn new(row: impl Into<String>) -> Self {
        Self {
            row: row.into(),
            updates: Vec::new(),
        }
    }

    pub fn put(
        &mut self,
        family: impl Into<String>,
        qualifier: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.updates.push(ColumnUpdate {
            family: family.into(),
            qualifier: qualifier.into(),
            value: value.into(),
        });
    }

    #[must_use]
    pub fn row(&self) -> &str {
        &self.row
    }

    #[must_use]
    pub fn updates(&self) -> &[ColumnUpdate] {
        &self.updates
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn into_entries(self) -> impl Iterator<Item = MetadataEntry> {
        let row = self.row;
        self.updates.into_iter().map(move |u| MetadataEntry {
            row: row.clone(),
            family: u.family,
            qualifier: u.qualifier,
            value: u.value,
        })
    }
}

/// Inclusive range of row keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRange {
    start: String,
    end: String,
}

impl RowRange {
    #[must_use]
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Every metadata row of `table`: `<id>;<end row>` rows sort between
    /// `<id>;` and the last tablet's `<id><`.
    #[must_use]
    pub fn table(table: &TableId) -> Self {
        Self::new(format!("{table};"), format!("{table}<"))
    }

    #[must_use]
    pub fn contains(&self, row: &str) -> bool {
        self.start.as_str() <= row && row <= self.end.as_str()
    }
}

/// Metadata row key of the tablet of `table` ending at `end_row`, or of its
/// last tablet when `end_row` is `None`.
#[must_use]
pub fn metadata_row(table: &TableId, end_row: Option<&str>) -> String {
    match end_row {
        Some(end) => format!("{table};{end}"),
        None => format!("{table}<"),
    }
}

/// End row encoded in a metadata row key; `None` for a last tablet.
///
/// # Errors
///
/// Returns `Err(())` if `row` contains neither `;` nor a trailing `<`.
#[allow(clippy::result_unit_err)]
pub fn end_row_of(row: &str) -> Result<Option<&str>, ()> {
    if let Some((_, end)) = row.split_once(';') {
        Ok(Some(end))
    } else if row.ends_with('<') {
        Ok(None)
    } else {
        Err(())
    }
}

/// Policy for writing a namespace node that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeExistsPolicy {
    Overwrite,
    FailIfExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TablePermission {
    Read,
    Write,
    BulkImport,
    AlterTable,
    GrantTable,
    DropTable,
}

impl TablePermission {
    pub const ALL: [Self; 6] = [
        Self::Read,
        Self::Write,
        Self::BulkImport,
        Self::AlterTable,
        Self::GrantTable,
        Self::DropTable,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::BulkImport => "BULK_IMPORT",
            Self::AlterTable => "ALTER_TABLE",
            Self::GrantTable => "GRANT",
            Self::DropTable => "DROP_TABLE",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

impl fmt::Display for TablePermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to import a previously exported table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRequest {
    pub user: String,
    pub table_name: String,
    pub export_dir: String,
}

impl ImportRequest {
    #[must_use]
    pub fn new(
        user: impl Into<String>,
        table_name: impl Into<String>,
        export_dir: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            table_name: table_name.into(),
            export_dir: export_dir.into(),
        }
    }
}

/// Joins a bulk-store directory and a relative name with a single `/`.
#[must_use]
pub fn join_path(dir: &str, name: &str) -> String {
    format!(
        "{}/{}",
        dir.trim_end_matches('/'),
        name.trim_start_matches('/')
    )
}

/// Last component of a bulk-store path.
#[must_use]
pub fn file_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(s: &str) -> TableId {
        s.parse().expect("valid table id")
    }

    #[test]
    fn metadata_rows_of_a_table_fall_in_its_range() {
        let range = RowRange::table(&tid("3"));

        assert!(range.contains(&metadata_row(&tid("3"), Some("m"))));
        assert!(range.contains(&metadata_row(&tid("3"), Some("zzzz"))));
        assert!(range.contains(&metadata_row(&tid("3"), None)));
        assert!(!range.contains(&metadata_row(&tid("31"), Some("a"))));
        assert!(!range.contains(&metadata_row(&tid("2"), None)));
    }

    #[test]
    fn end_row_of_parses_both_row_forms() {
        assert_eq!(end_row_of("1;row_0500"), Ok(Some("row_0500")));
        assert_eq!(end_row_of("1<"), Ok(None));
        assert_eq!(end_row_of("garbage"), Err(()));
    }

    #[test]
    fn mutation_expands_into_entries_of_its_row() {
        let mut m = Mutation::new("1<");
        m.put(DIRECTORY_FAMILY, DIRECTORY_QUALIFIER, "/c-00000000");
        m.put(DATAFILE_FAMILY, "/b-1/I2.rf", "100,10");

        let entries: Vec<MetadataEntry> = m.into_entries().collect();

        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.row == "1<"));
        assert!(entries[0].is_directory());
    }

    #[test]
    fn permission_names_round_trip() {
        for permission in TablePermission::ALL {
            assert_eq!(TablePermission::parse(permission.as_str()), Some(permission));
        }
    }

    #[test]
    fn path_helpers_handle_slashes() {
        assert_eq!(join_path("/tables/1/", "/b-2"), "/tables/1/b-2");
        assert_eq!(file_name("/exports/t/a.rf"), "a.rf");
        assert_eq!(file_name("a.rf"), "a.rf");
    }
}
