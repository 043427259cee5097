//! Table registrations kept in the coordination namespace:
//! `/tables/<id>/{name,state,conf/<key>}` plus a `/table_names/<name>` index.

use std::collections::BTreeMap;

use fate_core::{TableId, TableState, from_base36, to_base36};

use crate::paths;
use crate::traits::CoordinationNamespace;
use crate::types::NodeExistsPolicy;
use crate::{OperationError, Result};

const PROPERTY_PREFIX: &str = "table.";

pub struct TableManager<'a> {
    namespace: &'a dyn CoordinationNamespace,
}

impl<'a> TableManager<'a> {
    #[must_use]
    pub fn new(namespace: &'a dyn CoordinationNamespace) -> Self {
        Self { namespace }
    }

    #[must_use]
    pub fn is_valid_property(key: &str) -> bool {
        key.len() > PROPERTY_PREFIX.len() && key.starts_with(PROPERTY_PREFIX)
    }

    /// Allocates the next table id from the namespace counter. Callers
    /// serialise allocation through the table-creation lease.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter is corrupt or cannot be written.
    pub fn next_table_id(&self) -> Result<TableId> {
        let current = match self.namespace.get_string(paths::TABLE_ID_COUNTER)? {
            Some(value) => from_base36(&value).ok_or_else(|| OperationError::CorruptNode {
                path: paths::TABLE_ID_COUNTER.to_string(),
                reason: format!("'{value}' is not a base-36 counter"),
            })?,
            None => 0,
        };
        let next = current + 1;
        self.namespace.put(
            paths::TABLE_ID_COUNTER,
            to_base36(next).as_bytes(),
            NodeExistsPolicy::Overwrite,
        )?;
        Ok(TableId::from_counter(next))
    }

    /// Registers `name` under `id` in state `NEW`, overwriting any
    /// registration left behind by an earlier attempt of the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace cannot be written.
    pub fn add_table(&self, id: &TableId, name: &str) -> Result<()> {
        self.namespace.put(
            &Self::node(id, "name"),
            name.as_bytes(),
            NodeExistsPolicy::Overwrite,
        )?;
        self.namespace.put(
            &Self::node(id, "state"),
            TableState::New.as_str().as_bytes(),
            NodeExistsPolicy::Overwrite,
        )?;
        self.namespace.put(
            &Self::name_node(name),
            id.as_str().as_bytes(),
            NodeExistsPolicy::Overwrite,
        )
    }

    /// # Errors
    ///
    /// Returns an error if the index entry is unreadable.
    pub fn table_id_for_name(&self, name: &str) -> Result<Option<TableId>> {
        let path = Self::name_node(name);
        self.namespace
            .get_string(&path)?
            .map(|value| {
                value.parse().map_err(|_| OperationError::CorruptNode {
                    path: path.clone(),
                    reason: format!("'{value}' is not a table id"),
                })
            })
            .transpose()
    }

    /// # Errors
    ///
    /// Returns an error if the namespace cannot be read.
    pub fn table_name(&self, id: &TableId) -> Result<Option<String>> {
        self.namespace.get_string(&Self::node(id, "name"))
    }

    /// Stores a table property. Returns `false` without writing when `key`
    /// is not a table property.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace cannot be written.
    pub fn set_property(&self, id: &TableId, key: &str, value: &str) -> Result<bool> {
        if !Self::is_valid_property(key) {
            return Ok(false);
        }
        self.namespace.put(
            &format!("{}/{key}", Self::node(id, "conf")),
            value.as_bytes(),
            NodeExistsPolicy::Overwrite,
        )?;
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns an error if the namespace cannot be read.
    pub fn properties(&self, id: &TableId) -> Result<BTreeMap<String, String>> {
        let conf = Self::node(id, "conf");
        let mut properties = BTreeMap::new();
        for key in self.namespace.children(&conf)? {
            if let Some(value) = self.namespace.get_string(&format!("{conf}/{key}"))? {
                properties.insert(key, value);
            }
        }
        Ok(properties)
    }

    /// # Errors
    ///
    /// Returns an error if the namespace cannot be written.
    pub fn transition_state(&self, id: &TableId, state: TableState) -> Result<()> {
        self.namespace.put(
            &Self::node(id, "state"),
            state.as_str().as_bytes(),
            NodeExistsPolicy::Overwrite,
        )
    }

    /// # Errors
    ///
    /// Returns an error if the stored state is unreadable.
    pub fn table_state(&self, id: &TableId) -> Result<Option<TableState>> {
        self.namespace
            .get_string(&Self::node(id, "state"))?
            .map(|value| value.parse().map_err(OperationError::from))
            .transpose()
    }

    /// Removes the registration of `id` and its name index entry if that
    /// entry still points at `id`. Removing a missing table is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace cannot be written.
    pub fn remove_table(&self, id: &TableId) -> Result<()> {
        if let Some(name) = self.table_name(id)? {
            if self.table_id_for_name(&name)?.as_ref() == Some(id) {
                self.namespace.delete(&Self::name_node(&name))?;
            }
        }
        self.namespace
            .delete(&format!("{}/{id}", paths::TABLES))
    }

    fn node(id: &TableId, leaf: &str) -> String {
        format!("{}/{id}/{leaf}", paths::TABLES)
    }

    fn name_node(name: &str) -> String {
        format!("{}/{name}", paths::TABLE_NAMES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::InMemoryNamespace;

    #[test]
    fn table_ids_count_up_in_base36() -> anyhow::Result<()> {
        let ns = InMemoryNamespace::new();
        ns.put(paths::TABLE_ID_COUNTER, b"z", NodeExistsPolicy::Overwrite)?;
        let tables = TableManager::new(&ns);

        assert_eq!(tables.next_table_id()?.as_str(), "10");
        assert_eq!(tables.next_table_id()?.as_str(), "11");
        Ok(())
    }

    #[test]
    fn first_table_id_is_one() -> anyhow::Result<()> {
        let ns = InMemoryNamespace::new();

        assert_eq!(TableManager::new(&ns).next_table_id()?.as_str(), "1");
        Ok(())
    }

    #[test]
    fn registration_round_trip() -> anyhow::Result<()> {
        let ns = InMemoryNamespace::new();
        let tables = TableManager::new(&ns);
        let id: TableId = "4".parse()?;

        tables.add_table(&id, "events")?;
        assert!(tables.set_property(&id, "table.split.threshold", "1G")?);
        assert!(!tables.set_property(&id, "tserver.memory", "1G")?);
        tables.transition_state(&id, TableState::Online)?;

        assert_eq!(tables.table_id_for_name("events")?, Some(id.clone()));
        assert_eq!(tables.table_state(&id)?, Some(TableState::Online));
        assert_eq!(tables.properties(&id)?.len(), 1);

        tables.remove_table(&id)?;

        assert_eq!(tables.table_id_for_name("events")?, None);
        assert_eq!(tables.table_state(&id)?, None);
        Ok(())
    }

    #[test]
    fn remove_keeps_name_owned_by_another_table() -> anyhow::Result<()> {
        let ns = InMemoryNamespace::new();
        let tables = TableManager::new(&ns);
        let old: TableId = "1".parse()?;
        let new: TableId = "2".parse()?;
        tables.add_table(&old, "events")?;
        tables.add_table(&new, "events")?;

        tables.remove_table(&old)?;

        assert_eq!(tables.table_id_for_name("events")?, Some(new));
        Ok(())
    }
}
