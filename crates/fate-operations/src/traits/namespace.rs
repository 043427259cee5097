use crate::types::NodeExistsPolicy;
use crate::{OperationError, Result};

/// Hierarchical, strongly consistent key/value store used for cluster-wide
/// metadata and locks. Paths are `/`-separated and absolute.
pub trait CoordinationNamespace: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// # Errors
    ///
    /// Returns [`OperationError::NodeExists`] when `policy` is
    /// `FailIfExists` and the node is present.
    fn put(&self, path: &str, value: &[u8], policy: NodeExistsPolicy) -> Result<()>;

    /// Removes the node and everything below it. Deleting a missing node is
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn delete(&self, path: &str) -> Result<()>;

    /// Names of the direct children of `path`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn children(&self, path: &str) -> Result<Vec<String>>;

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_string(&self, path: &str) -> Result<Option<String>> {
        self.get(path)?
            .map(|bytes| {
                String::from_utf8(bytes).map_err(|_| OperationError::CorruptNode {
                    path: path.to_string(),
                    reason: "not valid UTF-8".to_string(),
                })
            })
            .transpose()
    }

    /// Takes the exclusive lock at `path` for `owner`. Taking a lock one
    /// already owns succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be accessed.
    fn try_lock(&self, path: &str, owner: &str) -> Result<bool> {
        match self.put(path, owner.as_bytes(), NodeExistsPolicy::FailIfExists) {
            Ok(()) => Ok(true),
            Err(OperationError::NodeExists { .. }) => {
                Ok(self.lock_owner(path)?.as_deref() == Some(owner))
            }
            Err(e) => Err(e),
        }
    }

    /// Releases a lock held by `owner`; a lock held by someone else is left
    /// alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be accessed.
    fn unlock(&self, path: &str, owner: &str) -> Result<()> {
        if self.lock_owner(path)?.as_deref() == Some(owner) {
            self.delete(path)?;
        }
        Ok(())
    }

    /// Removes a lock regardless of its owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn delete_lock(&self, path: &str) -> Result<()> {
        self.delete(path)
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn lock_owner(&self, path: &str) -> Result<Option<String>> {
        self.get_string(path)
    }
}
