use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use fate_core::{TableId, TxId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LeaseError;
use crate::persist::{read_json, write_json_atomic};

/// A named resource that transactions reserve before touching it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum LeaseKey {
    Table(TableId),
    /// A table's display name, reserved while the name is being bound.
    TableName(String),
    Path(String),
    Global(String),
}

impl LeaseKey {
    #[must_use]
    pub fn table(id: &TableId) -> Self {
        Self::Table(id.clone())
    }

    #[must_use]
    pub fn table_name(name: impl Into<String>) -> Self {
        Self::TableName(name.into())
    }

    #[must_use]
    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }

    #[must_use]
    pub fn global(name: impl Into<String>) -> Self {
        Self::Global(name.into())
    }
}

impl fmt::Display for LeaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table(id) => write!(f, "table:{id}"),
            Self::TableName(name) => write!(f, "table-name:{name}"),
            Self::Path(path) => write!(f, "path:{path}"),
            Self::Global(name) => write!(f, "global:{name}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Holders {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exclusive: Option<TxId>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    shared: BTreeSet<TxId>,
}

impl Holders {
    fn is_empty(&self) -> bool {
        self.exclusive.is_none() && self.shared.is_empty()
    }

    fn holds(&self, tx: TxId) -> bool {
        self.exclusive == Some(tx) || self.shared.contains(&tx)
    }

    fn admits(&self, tx: TxId, exclusive: bool) -> bool {
        let exclusive_ok = self.exclusive.is_none_or(|holder| holder == tx);
        if exclusive {
            exclusive_ok && self.shared.iter().all(|&holder| holder == tx)
        } else {
            exclusive_ok
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LeaseSnapshot {
    leases: Vec<(LeaseKey, Holders)>,
}

/// Mutual exclusion between transactions on named resources.
///
/// Holders are transaction ids, not threads, so a lease survives the worker
/// that took it and, when the registry is backed by a file, a restart.
/// Acquisition never blocks; a step that cannot get its lease reports
/// itself not ready and is retried later.
pub struct LeaseRegistry {
    leases: Mutex<BTreeMap<LeaseKey, Holders>>,
    path: Option<PathBuf>,
}

impl LeaseRegistry {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            leases: Mutex::new(BTreeMap::new()),
            path: None,
        }
    }

    /// Loads the lease table from `path`, starting empty if it does not exist.
    /// Every change is written back before it becomes visible.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or decoded.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LeaseError> {
        let path = path.into();
        let snapshot: LeaseSnapshot = read_json(&path)?.unwrap_or_default();
        Ok(Self {
            leases: Mutex::new(snapshot.leases.into_iter().collect()),
            path: Some(path),
        })
    }

    /// Takes `key` for `tx` if no conflicting holder exists. Re-acquiring a
    /// lease `tx` already holds succeeds; a sole shared holder may upgrade to
    /// exclusive.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted; the lease is then
    /// not taken.
    pub fn try_acquire(&self, key: &LeaseKey, tx: TxId, exclusive: bool) -> Result<bool, LeaseError> {
        let mut leases = self.leases.lock();
        let previous = leases.get(key).cloned();
        let holders = leases.entry(key.clone()).or_default();

        if !holders.admits(tx, exclusive) {
            return Ok(false);
        }

        let unchanged = if exclusive {
            holders.exclusive == Some(tx)
        } else {
            holders.holds(tx)
        };
        if unchanged {
            return Ok(true);
        }

        if exclusive {
            holders.shared.remove(&tx);
            holders.exclusive = Some(tx);
        } else {
            holders.shared.insert(tx);
        }

        if let Err(e) = self.persist(&leases) {
            restore(&mut leases, key, previous);
            return Err(e);
        }
        debug!(%tx, lease = %key, exclusive, "lease acquired");
        Ok(true)
    }

    /// Drops whatever `tx` holds on `key`. Releasing a lease that is not held
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    pub fn release(&self, key: &LeaseKey, tx: TxId) -> Result<(), LeaseError> {
        let mut leases = self.leases.lock();
        let Some(holders) = leases.get_mut(key) else {
            return Ok(());
        };
        if !holders.holds(tx) {
            return Ok(());
        }
        let previous = Some(holders.clone());
        if holders.exclusive == Some(tx) {
            holders.exclusive = None;
        }
        holders.shared.remove(&tx);
        if holders.is_empty() {
            leases.remove(key);
        }

        if let Err(e) = self.persist(&leases) {
            restore(&mut leases, key, previous);
            return Err(e);
        }
        debug!(%tx, lease = %key, "lease released");
        Ok(())
    }

    /// Drops every lease held by `tx` and returns their keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    pub fn release_all(&self, tx: TxId) -> Result<Vec<LeaseKey>, LeaseError> {
        let mut leases = self.leases.lock();
        let before = leases.clone();
        let mut released = Vec::new();
        leases.retain(|key, holders| {
            if holders.holds(tx) {
                released.push(key.clone());
                if holders.exclusive == Some(tx) {
                    holders.exclusive = None;
                }
                holders.shared.remove(&tx);
            }
            !holders.is_empty()
        });
        if released.is_empty() {
            return Ok(released);
        }
        if let Err(e) = self.persist(&leases) {
            *leases = before;
            return Err(e);
        }
        Ok(released)
    }

    #[must_use]
    pub fn is_held_by(&self, key: &LeaseKey, tx: TxId) -> bool {
        self.leases.lock().get(key).is_some_and(|h| h.holds(tx))
    }

    /// Keys currently held by `tx`.
    #[must_use]
    pub fn held_by(&self, tx: TxId) -> Vec<LeaseKey> {
        self.leases
            .lock()
            .iter()
            .filter(|(_, holders)| holders.holds(tx))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn persist(&self, leases: &BTreeMap<LeaseKey, Holders>) -> Result<(), LeaseError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot = LeaseSnapshot {
            leases: leases
                .iter()
                .map(|(key, holders)| (key.clone(), holders.clone()))
                .collect(),
        };
        write_json_atomic(path, &snapshot)?;
        Ok(())
    }
}

fn restore(leases: &mut BTreeMap<LeaseKey, Holders>, key: &LeaseKey, previous: Option<Holders>) {
    match previous {
        Some(holders) => {
            leases.insert(key.clone(), holders);
        }
        None => {
            leases.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(id: &str) -> LeaseKey {
        LeaseKey::table(&id.parse().expect("valid table id"))
    }

    #[test]
    fn exclusive_lease_excludes_other_transactions() -> anyhow::Result<()> {
        let registry = LeaseRegistry::in_memory();
        let key = table("1");

        assert!(registry.try_acquire(&key, TxId::new(1), true)?);
        assert!(!registry.try_acquire(&key, TxId::new(2), true)?);
        assert!(!registry.try_acquire(&key, TxId::new(2), false)?);
        Ok(())
    }

    #[test]
    fn acquisition_is_reentrant() -> anyhow::Result<()> {
        let registry = LeaseRegistry::in_memory();
        let key = LeaseKey::path("/exports/a");

        assert!(registry.try_acquire(&key, TxId::new(1), true)?);
        assert!(registry.try_acquire(&key, TxId::new(1), true)?);
        assert!(registry.try_acquire(&key, TxId::new(1), false)?);
        assert!(registry.is_held_by(&key, TxId::new(1)));
        Ok(())
    }

    #[test]
    fn shared_holders_coexist_but_block_exclusive() -> anyhow::Result<()> {
        let registry = LeaseRegistry::in_memory();
        let key = LeaseKey::global("catalog");

        assert!(registry.try_acquire(&key, TxId::new(1), false)?);
        assert!(registry.try_acquire(&key, TxId::new(2), false)?);
        assert!(!registry.try_acquire(&key, TxId::new(3), true)?);

        registry.release(&key, TxId::new(2))?;
        assert!(registry.try_acquire(&key, TxId::new(1), true)?);
        Ok(())
    }

    #[test]
    fn release_is_idempotent() -> anyhow::Result<()> {
        let registry = LeaseRegistry::in_memory();
        let key = table("2");
        registry.try_acquire(&key, TxId::new(1), true)?;

        registry.release(&key, TxId::new(1))?;
        registry.release(&key, TxId::new(1))?;
        registry.release(&key, TxId::new(9))?;

        assert!(registry.try_acquire(&key, TxId::new(2), true)?);
        Ok(())
    }

    #[test]
    fn release_all_returns_every_key_of_the_transaction() -> anyhow::Result<()> {
        let registry = LeaseRegistry::in_memory();
        registry.try_acquire(&table("1"), TxId::new(1), true)?;
        registry.try_acquire(&LeaseKey::path("/x"), TxId::new(1), false)?;
        registry.try_acquire(&table("2"), TxId::new(2), true)?;

        let released = registry.release_all(TxId::new(1))?;

        assert_eq!(released.len(), 2);
        assert!(registry.held_by(TxId::new(1)).is_empty());
        assert_eq!(registry.held_by(TxId::new(2)), vec![table("2")]);
        Ok(())
    }

    #[test]
    fn file_backed_registry_survives_reopen() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("leases.json");
        {
            let registry = LeaseRegistry::open(&path)?;
            registry.try_acquire(&table("5"), TxId::new(3), true)?;
        }

        let reopened = LeaseRegistry::open(&path)?;

        assert!(reopened.is_held_by(&table("5"), TxId::new(3)));
        assert!(!reopened.try_acquire(&table("5"), TxId::new(4), false)?);
        Ok(())
    }

    #[test]
    fn key_display_names_kind() {
        assert_eq!(table("a1").to_string(), "table:a1");
        assert_eq!(LeaseKey::table_name("t").to_string(), "table-name:t");
        assert_eq!(LeaseKey::path("/b").to_string(), "path:/b");
        assert_eq!(LeaseKey::global("ids").to_string(), "global:ids");
    }
}
