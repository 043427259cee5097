//! The durable `oldName:newName` file recording how exported files are
//! renamed on import.

use std::io::{Read, Write};

use indexmap::IndexMap;

use crate::config::ImportConfig;
use crate::traits::BulkFileSystem;
use crate::types::join_path;
use crate::{OperationError, Result};

pub const MAPPING_FILE: &str = "mappings.txt";

#[must_use]
pub fn mapping_path(import_dir: &str) -> String {
    join_path(import_dir, MAPPING_FILE)
}

/// Extension an exported file keeps on import, or `None` if the file is not
/// a data file and stays behind.
#[must_use]
pub fn imported_extension<'a>(file_name: &'a str, config: &'a ImportConfig) -> Option<&'a str> {
    match file_name.rsplit_once('.') {
        Some((_, extension)) => config
            .is_valid_extension(extension)
            .then_some(extension),
        None => Some(config.default_extension.as_str()),
    }
}

/// Writes the mapping under a temporary name and renames it into place, so
/// the file is either complete or absent.
///
/// # Errors
///
/// Returns an error if the file cannot be written or renamed.
pub fn write_mapping(
    files: &dyn BulkFileSystem,
    import_dir: &str,
    mapping: &IndexMap<String, String>,
) -> Result<()> {
    let path = mapping_path(import_dir);
    let temp = format!("{path}.tmp");
    let mut contents = String::new();
    for (old, new) in mapping {
        contents.push_str(old);
        contents.push(':');
        contents.push_str(new);
        contents.push('\n');
    }
    {
        let mut writer = files.create(&temp)?;
        writer
            .write_all(contents.as_bytes())
            .and_then(|()| writer.flush())
            .map_err(|e| OperationError::io(temp.clone(), e))?;
    }
    files.rename(&temp, &path)
}

/// # Errors
///
/// Returns an error if the file cannot be read or a line has no `:`.
pub fn read_mapping(files: &dyn BulkFileSystem, import_dir: &str) -> Result<IndexMap<String, String>> {
    let path = mapping_path(import_dir);
    let mut contents = String::new();
    files
        .open(&path)?
        .read_to_string(&mut contents)
        .map_err(|e| OperationError::io(path.clone(), e))?;

    let mut mapping = IndexMap::new();
    for (index, line) in contents.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let (old, new) = line
            .split_once(':')
            .ok_or_else(|| OperationError::MalformedMapping {
                path: path.clone(),
                line: index + 1,
            })?;
        mapping.insert(old.to_string(), new.to_string());
    }
    Ok(mapping)
}
