//! Export archives: a tar file in the export directory carrying the export
//! manifest, the table configuration and the table's metadata rows.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};

use tar::{Archive, Builder, Header};

use crate::traits::BulkFileSystem;
use crate::types::{MetadataEntry, join_path};
use crate::{OperationError, Result};

pub const EXPORT_FILE: &str = "export_metadata.tar";
pub const INFO_ENTRY: &str = "export_info.txt";
pub const CONFIG_ENTRY: &str = "table_config.txt";
pub const METADATA_ENTRY: &str = "metadata.jsonl";

const EXPORT_VERSION_KEY: &str = "exportVersion";
const DATA_VERSION_KEY: &str = "dataVersion";

/// Contents of `export_info.txt`: `key:value` lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportInfo {
    pub export_version: Option<u32>,
    pub data_version: Option<u32>,
    /// Every other key, kept for diagnostics.
    pub other: BTreeMap<String, String>,
}

impl ExportInfo {
    #[must_use]
    pub fn new(export_version: u32, data_version: u32) -> Self {
        Self {
            export_version: Some(export_version),
            data_version: Some(data_version),
            other: BTreeMap::new(),
        }
    }

    fn parse(text: &str) -> Self {
        let mut info = Self::default();
        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                EXPORT_VERSION_KEY => info.export_version = value.parse().ok(),
                DATA_VERSION_KEY => info.data_version = value.parse().ok(),
                other => {
                    info.other.insert(other.to_string(), value.to_string());
                }
            }
        }
        info
    }

    fn render(&self) -> String {
        let mut text = String::new();
        if let Some(version) = self.export_version {
            text.push_str(&format!("{EXPORT_VERSION_KEY}:{version}\n"));
        }
        if let Some(version) = self.data_version {
            text.push_str(&format!("{DATA_VERSION_KEY}:{version}\n"));
        }
        for (key, value) in &self.other {
            text.push_str(&format!("{key}:{value}\n"));
        }
        text
    }
}

/// Everything an export archive holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportContents {
    pub info: ExportInfo,
    pub table_config: BTreeMap<String, String>,
    pub metadata: Vec<MetadataEntry>,
}

/// The entries of an export archive, read in one pass.
pub struct ExportArchive {
    path: String,
    entries: HashMap<String, Vec<u8>>,
}

impl ExportArchive {
    /// # Errors
    ///
    /// Returns an error if the archive is missing or not a valid tar file.
    pub fn open(files: &dyn BulkFileSystem, export_dir: &str) -> Result<Self> {
        let path = join_path(export_dir, EXPORT_FILE);
        let reader = files.open(&path)?;
        let mut archive = Archive::new(reader);
        let mut entries = HashMap::new();

        for entry in archive.entries().map_err(|e| malformed(&path, &e))? {
            let mut entry = entry.map_err(|e| malformed(&path, &e))?;
            let name = entry
                .path()
                .map_err(|e| malformed(&path, &e))?
                .to_string_lossy()
                .to_string();
            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .map_err(|e| malformed(&path, &e))?;
            entries.insert(name, data);
        }

        Ok(Self { path, entries })
    }

    /// # Errors
    ///
    /// Returns an error if the manifest entry is missing.
    pub fn info(&self) -> Result<ExportInfo> {
        Ok(ExportInfo::parse(self.text(INFO_ENTRY)?))
    }

    /// Exported table properties, in file order. A missing configuration
    /// entry means the table had no properties.
    ///
    /// # Errors
    ///
    /// Returns an error if a line is not `key=value`.
    pub fn table_config(&self) -> Result<Vec<(String, String)>> {
        if !self.entries.contains_key(CONFIG_ENTRY) {
            return Ok(Vec::new());
        }
        self.text(CONFIG_ENTRY)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(index, line)| {
                line.split_once('=')
                    .map(|(key, value)| (key.trim().to_string(), value.to_string()))
                    .ok_or_else(|| OperationError::MalformedExport {
                        path: self.path.clone(),
                        reason: format!("{CONFIG_ENTRY} entry {} is not key=value", index + 1),
                    })
            })
            .collect()
    }

    /// Metadata rows in export order.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is missing or a line does not decode.
    pub fn metadata(&self) -> Result<Vec<MetadataEntry>> {
        self.text(METADATA_ENTRY)?
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|e| OperationError::MalformedExport {
                    path: self.path.clone(),
                    reason: format!("{METADATA_ENTRY} line {}: {e}", index + 1),
                })
            })
            .collect()
    }

    fn text(&self, name: &str) -> Result<&str> {
        let data = self
            .entries
            .get(name)
            .ok_or_else(|| OperationError::MalformedExport {
                path: self.path.clone(),
                reason: format!("missing entry {name}"),
            })?;
        std::str::from_utf8(data).map_err(|_| OperationError::MalformedExport {
            path: self.path.clone(),
            reason: format!("{name} is not valid UTF-8"),
        })
    }
}

/// Writes `contents` as the export archive of `export_dir`.
///
/// # Errors
///
/// Returns an error if the archive cannot be created.
pub fn write_export(
    files: &dyn BulkFileSystem,
    export_dir: &str,
    contents: &ExportContents,
) -> Result<()> {
    let path = join_path(export_dir, EXPORT_FILE);
    let mut metadata = String::new();
    for entry in &contents.metadata {
        let line = serde_json::to_string(entry).map_err(|source| OperationError::Serialization {
            what: "metadata entry",
            source,
        })?;
        metadata.push_str(&line);
        metadata.push('\n');
    }
    let config: String = contents
        .table_config
        .iter()
        .map(|(key, value)| format!("{key}={value}\n"))
        .collect();

    let mut builder = Builder::new(files.create(&path)?);
    append(&mut builder, &path, INFO_ENTRY, contents.info.render().as_bytes())?;
    append(&mut builder, &path, CONFIG_ENTRY, config.as_bytes())?;
    append(&mut builder, &path, METADATA_ENTRY, metadata.as_bytes())?;
    let mut writer = builder
        .into_inner()
        .map_err(|e| OperationError::io(path.clone(), e))?;
    writer.flush().map_err(|e| OperationError::io(path, e))
}

fn append<W: Write>(builder: &mut Builder<W>, archive: &str, name: &str, data: &[u8]) -> Result<()> {
    let mut header = Header::new_gnu();
    header
        .set_path(name)
        .map_err(|e| OperationError::io(archive, e))?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder
        .append(&header, data)
        .map_err(|e| OperationError::io(archive, e))
}

fn malformed(path: &str, error: &std::io::Error) -> OperationError {
    OperationError::MalformedExport {
        path: path.to_string(),
        reason: error.to_string(),
    }
}
