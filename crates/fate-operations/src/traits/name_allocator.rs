use crate::Result;

/// Source of cluster-wide unique names for files and directories.
pub trait UniqueNameAllocator: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if a new block of names cannot be reserved.
    fn next_name(&self) -> Result<String>;
}
