use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use fate_saga::{read_json, write_json_atomic};
use parking_lot::Mutex;

use crate::traits::CoordinationNamespace;
use crate::types::NodeExistsPolicy;
use crate::{OperationError, Result};

/// Single-process coordination namespace, optionally persisted to a JSON
/// snapshot that is rewritten after every change.
pub struct InMemoryNamespace {
    nodes: Mutex<BTreeMap<String, Vec<u8>>>,
    snapshot: Option<PathBuf>,
}

impl InMemoryNamespace {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(BTreeMap::new()),
            snapshot: None,
        }
    }

    /// # Errors
    ///
    /// Returns an error if an existing snapshot cannot be read.
    pub fn open(snapshot: impl Into<PathBuf>) -> Result<Self> {
        let snapshot = snapshot.into();
        let nodes = read_json(&snapshot)
            .map_err(|source| OperationError::Persist {
                what: "namespace snapshot",
                source,
            })?
            .unwrap_or_default();
        Ok(Self {
            nodes: Mutex::new(nodes),
            snapshot: Some(snapshot),
        })
    }

    fn commit(
        &self,
        nodes: &mut BTreeMap<String, Vec<u8>>,
        before: BTreeMap<String, Vec<u8>>,
    ) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        if let Err(source) = write_json_atomic(path, &*nodes) {
            *nodes = before;
            return Err(OperationError::Persist {
                what: "namespace snapshot",
                source,
            });
        }
        Ok(())
    }
}

impl Default for InMemoryNamespace {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

impl CoordinationNamespace for InMemoryNamespace {
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.nodes.lock().get(&normalize(path)).cloned())
    }

    fn put(&self, path: &str, value: &[u8], policy: NodeExistsPolicy) -> Result<()> {
        let path = normalize(path);
        let mut nodes = self.nodes.lock();
        if policy == NodeExistsPolicy::FailIfExists && nodes.contains_key(&path) {
            return Err(OperationError::NodeExists { path });
        }
        let before = self.snapshot.as_ref().map(|_| nodes.clone());
        nodes.insert(path, value.to_vec());
        match before {
            Some(before) => self.commit(&mut nodes, before),
            None => Ok(()),
        }
    }

    fn delete(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        let prefix = format!("{path}/");
        let mut nodes = self.nodes.lock();
        let doomed: Vec<String> = nodes
            .keys()
            .filter(|k| **k == path || k.starts_with(&prefix))
            .cloned()
            .collect();
        if doomed.is_empty() {
            return Ok(());
        }
        let before = self.snapshot.as_ref().map(|_| nodes.clone());
        for key in doomed {
            nodes.remove(&key);
        }
        match before {
            Some(before) => self.commit(&mut nodes, before),
            None => Ok(()),
        }
    }

    fn children(&self, path: &str) -> Result<Vec<String>> {
        let path = normalize(path);
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        let nodes = self.nodes.lock();
        let children: BTreeSet<String> = nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| k[prefix.len()..].split('/').next())
            .filter(|child| !child.is_empty())
            .map(str::to_string)
            .collect();
        Ok(children.into_iter().collect())
    }
}
