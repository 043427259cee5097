use std::collections::BTreeSet;

use fate_core::TableId;

use crate::Result;
use crate::types::TablePermission;

pub trait PermissionStore: Send + Sync {
    /// Granting a permission the user already has is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant cannot be stored.
    fn grant_table_permission(
        &self,
        user: &str,
        table: &TableId,
        permission: TablePermission,
    ) -> Result<()>;

    /// Drops every permission of every user on `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the permissions cannot be removed.
    fn delete_table(&self, table: &TableId) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the permissions cannot be read.
    fn table_permissions(&self, user: &str, table: &TableId) -> Result<BTreeSet<TablePermission>>;
}
