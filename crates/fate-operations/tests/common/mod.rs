//! A standalone master over a temporary bulk store, plus export fixtures.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fate_core::TxId;
use fate_operations::config::ShutdownConfig;
use fate_operations::context::{Collaborators, MasterContext};
use fate_operations::export::{ExportContents, ExportInfo, write_export};
use fate_operations::operations::MasterStep;
use fate_operations::providers::LoggingEventNotifier;
use fate_operations::traits::EventNotifier;
use fate_operations::types::{
    DATAFILE_FAMILY, DIRECTORY_FAMILY, DIRECTORY_QUALIFIER, ImportRequest, MetadataEntry,
    PREV_ROW_FAMILY, PREV_ROW_QUALIFIER,
};
use fate_saga::{
    CancellationToken, CheckpointError, CheckpointStore, Executor, ExecutorConfig, LeaseRegistry,
    MemoryCheckpointStore, TxRecord,
};
use tempfile::TempDir;

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub fn fast_config() -> ExecutorConfig {
    ExecutorConfig {
        worker_threads: 2,
        min_retry_ms: 1,
        max_retry_ms: 20,
        operational_retry_limit: 2,
        operational_backoff_ms: 1,
    }
}

pub struct Cluster {
    pub bulk: TempDir,
    pub collaborators: Collaborators,
    pub events: Arc<LoggingEventNotifier>,
    pub leases: Arc<LeaseRegistry>,
    pub cancel: CancellationToken,
    pub context: Arc<MasterContext>,
    pub store: Arc<dyn CheckpointStore<MasterStep>>,
}

impl Cluster {
    pub fn new() -> anyhow::Result<Self> {
        Self::with(|_| {})
    }

    /// A cluster whose collaborators are adjusted before the context is
    /// built, for wrapping one of them.
    pub fn with(adjust: impl FnOnce(&mut Collaborators)) -> anyhow::Result<Self> {
        let bulk = tempfile::tempdir()?;
        let events = Arc::new(LoggingEventNotifier::new());
        let mut collaborators = Collaborators::standalone(bulk.path());
        collaborators.events = Arc::clone(&events) as Arc<dyn EventNotifier>;
        adjust(&mut collaborators);
        let leases = Arc::new(LeaseRegistry::in_memory());
        let cancel = CancellationToken::new();
        let context = Arc::new(
            MasterContext::new(collaborators.clone(), Arc::clone(&leases), cancel.clone())
                .with_shutdown_config(ShutdownConfig {
                    poll_interval_ms: 1,
                    max_wait_ms: 200,
                }),
        );
        Ok(Self {
            bulk,
            collaborators,
            events,
            leases,
            cancel,
            context,
            store: Arc::new(MemoryCheckpointStore::new()),
        })
    }

    pub fn ctx(&self) -> &MasterContext {
        &self.context
    }

    pub fn executor(&self) -> Executor<MasterStep> {
        self.executor_over(Arc::clone(&self.store))
    }

    pub fn executor_over(&self, store: Arc<dyn CheckpointStore<MasterStep>>) -> Executor<MasterStep> {
        Executor::new(store, Arc::clone(&self.context), fast_config())
            .with_leases(Arc::clone(&self.leases))
    }

    pub fn write_file(&self, path: &str, contents: &[u8]) -> anyhow::Result<()> {
        let mut file = self.collaborators.files.create(path)?;
        file.write_all(contents)?;
        file.flush()?;
        Ok(())
    }

    /// An export of two tablets backed by `a.rf` and `b.rf`, plus a file that
    /// is not a data file.
    pub fn standard_export(&self, dir: &str) -> anyhow::Result<()> {
        self.write_file(&format!("{dir}/a.rf"), b"segment a")?;
        self.write_file(&format!("{dir}/b.rf"), b"segment b")?;
        self.write_file(&format!("{dir}/note.txt"), b"exported by ops")?;
        self.write_export(dir, ExportInfo::new(1, 4), two_tablets("a.rf", "b.rf"))
    }

    pub fn write_export(
        &self,
        dir: &str,
        info: ExportInfo,
        metadata: Vec<MetadataEntry>,
    ) -> anyhow::Result<()> {
        self.write_export_with_config(
            dir,
            info,
            BTreeMap::from([("table.split.threshold".to_string(), "1G".to_string())]),
            metadata,
        )
    }

    pub fn write_export_with_config(
        &self,
        dir: &str,
        info: ExportInfo,
        table_config: BTreeMap<String, String>,
        metadata: Vec<MetadataEntry>,
    ) -> anyhow::Result<()> {
        let contents = ExportContents {
            info,
            table_config,
            metadata,
        };
        write_export(self.collaborators.files.as_ref(), dir, &contents)?;
        Ok(())
    }

    pub fn import_step(&self, table: &str, dir: &str) -> anyhow::Result<MasterStep> {
        Ok(MasterStep::import_table(
            self.ctx(),
            ImportRequest::new("alice", table, dir),
        )?)
    }
}

/// Metadata of exported table `5`: tablet `5;m` holding `first`, and the last
/// tablet holding `second`.
pub fn two_tablets(first: &str, second: &str) -> Vec<MetadataEntry> {
    vec![
        MetadataEntry::new("5;m", DATAFILE_FAMILY, format!("/t-0001/{first}"), "100,10"),
        MetadataEntry::new("5;m", DIRECTORY_FAMILY, DIRECTORY_QUALIFIER, "/t-0001"),
        MetadataEntry::new("5;m", PREV_ROW_FAMILY, PREV_ROW_QUALIFIER, ""),
        MetadataEntry::new("5<", DATAFILE_FAMILY, format!("/t-0002/{second}"), "200,20"),
        MetadataEntry::new("5<", DIRECTORY_FAMILY, DIRECTORY_QUALIFIER, "/t-0002"),
        MetadataEntry::new("5<", PREV_ROW_FAMILY, PREV_ROW_QUALIFIER, "m"),
    ]
}

/// Wraps a store and fails every `save` once `budget` saves went through,
/// like a master dying right after a side effect.
pub struct CrashingStore<S> {
    inner: Arc<dyn CheckpointStore<S>>,
    budget: AtomicUsize,
}

impl<S> CrashingStore<S> {
    pub fn new(inner: Arc<dyn CheckpointStore<S>>, budget: usize) -> Self {
        Self {
            inner,
            budget: AtomicUsize::new(budget),
        }
    }
}

impl<S: Send + Sync> CheckpointStore<S> for CrashingStore<S> {
    fn create(&self) -> Result<TxId, CheckpointError> {
        self.inner.create()
    }

    fn load(&self, tx: TxId) -> Result<TxRecord<S>, CheckpointError> {
        self.inner.load(tx)
    }

    fn save(&self, record: &TxRecord<S>) -> Result<(), CheckpointError> {
        let granted = self
            .budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if granted.is_err() {
            return Err(CheckpointError::Unavailable("master crashed".to_string()));
        }
        self.inner.save(record)
    }

    fn list(&self) -> Result<Vec<TxId>, CheckpointError> {
        self.inner.list()
    }

    fn delete(&self, tx: TxId) -> Result<(), CheckpointError> {
        self.inner.delete(tx)
    }
}
