use std::collections::BTreeMap;
use std::path::PathBuf;

use fate_saga::{read_json, write_json_atomic};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::traits::{MetadataStore, MutationWriter};
use crate::types::{MetadataEntry, Mutation, RowRange};
use crate::{OperationError, Result};

type CellKey = (String, String, String);
type Table = BTreeMap<CellKey, String>;

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    tables: BTreeMap<String, Vec<MetadataEntry>>,
}

/// Sorted in-process row store, optionally persisted to a JSON snapshot.
pub struct InMemoryMetadataStore {
    tables: Mutex<BTreeMap<String, Table>>,
    snapshot: Option<PathBuf>,
}

impl InMemoryMetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(BTreeMap::new()),
            snapshot: None,
        }
    }

    /// # Errors
    ///
    /// Returns an error if an existing snapshot cannot be read.
    pub fn open(snapshot: impl Into<PathBuf>) -> Result<Self> {
        let snapshot = snapshot.into();
        let loaded: Snapshot = read_json(&snapshot)
            .map_err(|source| OperationError::Persist {
                what: "metadata snapshot",
                source,
            })?
            .unwrap_or_default();
        let tables = loaded
            .tables
            .into_iter()
            .map(|(name, entries)| {
                let table = entries
                    .into_iter()
                    .map(|e| ((e.row, e.family, e.qualifier), e.value))
                    .collect();
                (name, table)
            })
            .collect();
        Ok(Self {
            tables: Mutex::new(tables),
            snapshot: Some(snapshot),
        })
    }

    fn persist(&self, tables: &BTreeMap<String, Table>) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let snapshot = Snapshot {
            tables: tables
                .iter()
                .map(|(name, table)| (name.clone(), entries(table.iter())))
                .collect(),
        };
        write_json_atomic(path, &snapshot).map_err(|source| OperationError::Persist {
            what: "metadata snapshot",
            source,
        })
    }

    fn apply(&self, target: &str, mutations: Vec<Mutation>) -> Result<()> {
        let mut tables = self.tables.lock();
        let before = self.snapshot.as_ref().map(|_| tables.clone());
        let table = tables.entry(target.to_string()).or_default();
        for entry in mutations.into_iter().flat_map(Mutation::into_entries) {
            table.insert((entry.row, entry.family, entry.qualifier), entry.value);
        }
        if let Some(before) = before {
            if let Err(e) = self.persist(&tables) {
                *tables = before;
                return Err(e);
            }
        }
        Ok(())
    }
}

impl Default for InMemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

fn entries<'a>(cells: impl Iterator<Item = (&'a CellKey, &'a String)>) -> Vec<MetadataEntry> {
    cells
        .map(|((row, family, qualifier), value)| MetadataEntry {
            row: row.clone(),
            family: family.clone(),
            qualifier: qualifier.clone(),
            value: value.clone(),
        })
        .collect()
}

fn in_range<'a>(
    table: &'a Table,
    range: &'a RowRange,
) -> impl Iterator<Item = (&'a CellKey, &'a String)> + 'a {
    table.iter().filter(move |((row, _, _), _)| range.contains(row))
}

struct BatchWriter<'a> {
    store: &'a InMemoryMetadataStore,
    target: String,
    pending: Vec<Mutation>,
}

impl MutationWriter for BatchWriter<'_> {
    fn add(&mut self, mutation: Mutation) -> Result<()> {
        if !mutation.is_empty() {
            self.pending.push(mutation);
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        let Self {
            store,
            target,
            pending,
        } = *self;
        store.apply(&target, pending)
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn open_writer(&self, target: &str) -> Result<Box<dyn MutationWriter + '_>> {
        Ok(Box::new(BatchWriter {
            store: self,
            target: target.to_string(),
            pending: Vec::new(),
        }))
    }

    fn delete_rows(&self, target: &str, range: &RowRange) -> Result<usize> {
        let mut tables = self.tables.lock();
        let Some(table) = tables.get_mut(target) else {
            return Ok(0);
        };
        let doomed: Vec<CellKey> = in_range(table, range).map(|(k, _)| k.clone()).collect();
        if doomed.is_empty() {
            return Ok(0);
        }
        let before = self.snapshot.as_ref().map(|_| tables.clone());
        if let Some(table) = tables.get_mut(target) {
            for key in &doomed {
                table.remove(key);
            }
        }
        if let Some(before) = before {
            if let Err(e) = self.persist(&tables) {
                *tables = before;
                return Err(e);
            }
        }
        Ok(doomed.len())
    }

    fn scan(&self, target: &str, range: &RowRange) -> Result<Vec<MetadataEntry>> {
        let tables = self.tables.lock();
        Ok(tables
            .get(target)
            .map(|table| entries(in_range(table, range)))
            .unwrap_or_default())
    }
}
