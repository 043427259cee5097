use crate::Result;
use crate::types::{MetadataEntry, Mutation, RowRange};

/// Buffers mutations; nothing becomes visible before `close` returns.
pub trait MutationWriter: Send {
    /// # Errors
    ///
    /// Returns an error if the mutation is rejected.
    fn add(&mut self, mutation: Mutation) -> Result<()>;

    /// Flushes every buffered mutation durably.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be applied; none of it is then
    /// visible.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Sorted row store holding tablet metadata.
pub trait MetadataStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if `target` cannot be written to.
    fn open_writer(&self, target: &str) -> Result<Box<dyn MutationWriter + '_>>;

    /// Deletes every row of `target` in `range`, returning how many cells
    /// were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion cannot be applied.
    fn delete_rows(&self, target: &str, range: &RowRange) -> Result<usize>;

    /// Cells of `target` in `range`, sorted by row, family and qualifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn scan(&self, target: &str, range: &RowRange) -> Result<Vec<MetadataEntry>>;
}
