use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use crate::traits::BulkFileSystem;
use crate::{OperationError, Result};

/// Bulk store backed by a directory of the local filesystem. Absolute store
/// paths are resolved below `root`.
pub struct LocalBulkFileSystem {
    root: PathBuf,
}

impl LocalBulkFileSystem {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(OperationError::io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "path escapes the store root"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl BulkFileSystem for LocalBulkFileSystem {
    fn list(&self, dir: &str) -> Result<Vec<String>> {
        let resolved = self.resolve(dir)?;
        let mut names = Vec::new();
        for entry in fs::read_dir(&resolved).map_err(|e| OperationError::io(dir, e))? {
            let entry = entry.map_err(|e| OperationError::io(dir, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let resolved = self.resolve(path)?;
        resolved
            .try_exists()
            .map_err(|e| OperationError::io(path, e))
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| OperationError::io(to, e))?;
        }
        fs::rename(&source, &target).map_err(|e| OperationError::io(from, e))
    }

    fn mkdirs(&self, path: &str) -> Result<()> {
        let resolved = self.resolve(path)?;
        fs::create_dir_all(&resolved).map_err(|e| OperationError::io(path, e))
    }

    fn delete(&self, path: &str, recursive: bool) -> Result<()> {
        let resolved = self.resolve(path)?;
        let result = if resolved.is_dir() {
            if recursive {
                fs::remove_dir_all(&resolved)
            } else {
                fs::remove_dir(&resolved)
            }
        } else {
            fs::remove_file(&resolved)
        };
        match result {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(OperationError::io(path, e)),
            _ => Ok(()),
        }
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let resolved = self.resolve(path)?;
        let file = fs::File::open(&resolved).map_err(|e| OperationError::io(path, e))?;
        Ok(Box::new(io::BufReader::new(file)))
    }

    fn create(&self, path: &str) -> Result<Box<dyn Write + Send>> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).map_err(|e| OperationError::io(path, e))?;
        }
        let file = fs::File::create(&resolved).map_err(|e| OperationError::io(path, e))?;
        Ok(Box::new(file))
    }
}
