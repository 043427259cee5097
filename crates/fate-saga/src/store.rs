use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use fate_core::TxId;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CheckpointError;
use crate::persist::{read_json, write_json_atomic};
use crate::record::TxRecord;

/// Durable map from transaction id to its record.
///
/// `save` must be atomic with respect to crashes: after a restart `load`
/// returns either the previous or the new record, never a mix.
pub trait CheckpointStore<S>: Send + Sync {
    /// Allocates a fresh id and stores a `NEW` record for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    fn create(&self) -> Result<TxId, CheckpointError>;

    /// # Errors
    ///
    /// Returns [`CheckpointError::NotFound`] for unknown ids.
    fn load(&self, tx: TxId) -> Result<TxRecord<S>, CheckpointError>;

    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    fn save(&self, record: &TxRecord<S>) -> Result<(), CheckpointError>;

    /// Ids of every stored transaction, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    fn list(&self) -> Result<Vec<TxId>, CheckpointError>;

    /// Removes a record. Deleting an unknown id is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be removed.
    fn delete(&self, tx: TxId) -> Result<(), CheckpointError>;
}

/// Process-local store, used in tests and when no storage root is configured.
pub struct MemoryCheckpointStore<S> {
    inner: Mutex<MemoryState<S>>,
}

struct MemoryState<S> {
    next_id: u64,
    records: BTreeMap<TxId, TxRecord<S>>,
}

impl<S> MemoryCheckpointStore<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryState {
                next_id: 1,
                records: BTreeMap::new(),
            }),
        }
    }
}

impl<S> Default for MemoryCheckpointStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Clone + Send + Sync> CheckpointStore<S> for MemoryCheckpointStore<S> {
    fn create(&self) -> Result<TxId, CheckpointError> {
        let mut inner = self.inner.lock();
        let id = TxId::new(inner.next_id);
        inner.next_id += 1;
        inner.records.insert(id, TxRecord::new(id));
        Ok(id)
    }

    fn load(&self, tx: TxId) -> Result<TxRecord<S>, CheckpointError> {
        self.inner
            .lock()
            .records
            .get(&tx)
            .cloned()
            .ok_or(CheckpointError::NotFound(tx))
    }

    fn save(&self, record: &TxRecord<S>) -> Result<(), CheckpointError> {
        self.inner.lock().records.insert(record.id, record.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<TxId>, CheckpointError> {
        Ok(self.inner.lock().records.keys().copied().collect())
    }

    fn delete(&self, tx: TxId) -> Result<(), CheckpointError> {
        self.inner.lock().records.remove(&tx);
        Ok(())
    }
}

const NEXT_ID_FILE: &str = "next-id";
const RECORD_EXTENSION: &str = "json";

/// One JSON file per transaction under a directory, named `<tx>.json`.
pub struct FileCheckpointStore<S> {
    dir: PathBuf,
    allocation: Mutex<()>,
    _steps: PhantomData<fn() -> S>,
}

impl<S> FileCheckpointStore<S> {
    /// Opens (and creates if needed) the checkpoint directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CheckpointError::List {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            allocation: Mutex::new(()),
            _steps: PhantomData,
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, tx: TxId) -> PathBuf {
        self.dir.join(format!("{tx}.{RECORD_EXTENSION}"))
    }
}

impl<S> CheckpointStore<S> for FileCheckpointStore<S>
where
    S: Serialize + DeserializeOwned + Send + Sync,
{
    fn create(&self) -> Result<TxId, CheckpointError> {
        let _guard = self.allocation.lock();
        let counter_path = self.dir.join(NEXT_ID_FILE);
        let mut next: u64 = read_json(&counter_path)?.unwrap_or(1);
        // The counter is written after the record, so a crash in between can
        // leave it pointing at an id that is already taken.
        while self.record_path(TxId::new(next)).exists() {
            next += 1;
        }
        let id = TxId::new(next);
        write_json_atomic(&self.record_path(id), &TxRecord::<S>::new(id))?;
        write_json_atomic(&counter_path, &(next + 1))?;
        Ok(id)
    }

    fn load(&self, tx: TxId) -> Result<TxRecord<S>, CheckpointError> {
        read_json(&self.record_path(tx))?.ok_or(CheckpointError::NotFound(tx))
    }

    fn save(&self, record: &TxRecord<S>) -> Result<(), CheckpointError> {
        write_json_atomic(&self.record_path(record.id), record)?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<TxId>, CheckpointError> {
        let list_err = |source| CheckpointError::List {
            path: self.dir.clone(),
            source,
        };
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(list_err)? {
            let path = entry.map_err(list_err)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<TxId>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn delete(&self, tx: TxId) -> Result<(), CheckpointError> {
        match fs::remove_file(self.record_path(tx)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Delete { tx, source }),
        }
    }
}
