use std::io::{Read, Write};

use crate::Result;

/// Distributed filesystem holding table data files. Paths are absolute and
/// `/`-separated.
pub trait BulkFileSystem: Send + Sync {
    /// Names of the entries directly inside `dir`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` does not exist or cannot be read.
    fn list(&self, dir: &str) -> Result<Vec<String>>;

    /// # Errors
    ///
    /// Returns an error if the check itself fails.
    fn exists(&self, path: &str) -> Result<bool>;

    /// # Errors
    ///
    /// Returns an error if `from` does not exist or `to` cannot be created.
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Creates `path` and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    fn mkdirs(&self, path: &str) -> Result<()>;

    /// Removes `path`; deleting a missing path is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` exists but cannot be removed, or is a
    /// non-empty directory and `recursive` is false.
    fn delete(&self, path: &str, recursive: bool) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if `path` cannot be opened for reading.
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>>;

    /// Creates or truncates `path`, creating missing parents.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` cannot be created.
    fn create(&self, path: &str) -> Result<Box<dyn Write + Send>>;
}
