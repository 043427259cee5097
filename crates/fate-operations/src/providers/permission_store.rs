use std::collections::BTreeSet;
use std::sync::Arc;

use fate_core::TableId;

use crate::paths;
use crate::traits::{CoordinationNamespace, PermissionStore};
use crate::types::{NodeExistsPolicy, TablePermission};
use crate::{OperationError, Result};

/// Table permissions stored as `/users/<user>/tables/<id>` nodes holding a
/// comma-separated permission list.
pub struct NamespacePermissionStore {
    namespace: Arc<dyn CoordinationNamespace>,
}

impl NamespacePermissionStore {
    #[must_use]
    pub fn new(namespace: Arc<dyn CoordinationNamespace>) -> Self {
        Self { namespace }
    }

    fn node(user: &str, table: &TableId) -> String {
        format!("{}/{user}/tables/{table}", paths::USERS)
    }

    fn read(&self, path: &str) -> Result<BTreeSet<TablePermission>> {
        let Some(value) = self.namespace.get_string(path)? else {
            return Ok(BTreeSet::new());
        };
        value
            .split(',')
            .filter(|p| !p.is_empty())
            .map(|p| {
                TablePermission::parse(p).ok_or_else(|| OperationError::CorruptNode {
                    path: path.to_string(),
                    reason: format!("unknown permission '{p}'"),
                })
            })
            .collect()
    }
}

impl PermissionStore for NamespacePermissionStore {
    fn grant_table_permission(
        &self,
        user: &str,
        table: &TableId,
        permission: TablePermission,
    ) -> Result<()> {
        let path = Self::node(user, table);
        let mut granted = self.read(&path)?;
        if !granted.insert(permission) {
            return Ok(());
        }
        let value = granted
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(",");
        self.namespace
            .put(&path, value.as_bytes(), NodeExistsPolicy::Overwrite)
    }

    fn delete_table(&self, table: &TableId) -> Result<()> {
        for user in self.namespace.children(paths::USERS)? {
            self.namespace.delete(&Self::node(&user, table))?;
        }
        Ok(())
    }

    fn table_permissions(&self, user: &str, table: &TableId) -> Result<BTreeSet<TablePermission>> {
        self.read(&Self::node(user, table))
    }
}
