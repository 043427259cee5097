use std::fs;
use std::path::Path;
use std::sync::Arc;

use fate_operations::context::{Collaborators, MasterContext};
use fate_operations::operations::MasterStep;
use fate_saga::{
    CancellationToken, CheckpointStore, Executor, FileCheckpointStore, LeaseRegistry,
};
use tracing::debug;

use crate::config::MasterConfig;
use crate::error::{CliError, Result};

/// The master's durable state opened from its storage root.
pub(crate) struct Master {
    pub executor: Arc<Executor<MasterStep>>,
    pub cancel: CancellationToken,
}

impl Master {
    pub(crate) fn open(config: &MasterConfig) -> Result<Self> {
        let storage = &config.storage;
        for dir in [storage.state_dir(), storage.bulk_root()] {
            create_dir(&dir)?;
        }

        let collaborators = Collaborators::persistent(&storage.state_dir(), &storage.bulk_root())?;
        let leases = Arc::new(LeaseRegistry::open(storage.lease_file())?);
        let cancel = CancellationToken::new();
        let context = MasterContext::new(collaborators, Arc::clone(&leases), cancel.clone())
            .with_import_config(config.import.clone())
            .with_shutdown_config(config.shutdown.clone());
        let store: Arc<dyn CheckpointStore<MasterStep>> =
            Arc::new(FileCheckpointStore::open(storage.checkpoint_dir())?);
        let executor = Executor::new(store, Arc::new(context), config.executor.clone())
            .with_leases(leases);
        debug!(root = %storage.root.display(), "master state opened");

        Ok(Self {
            executor: Arc::new(executor),
            cancel,
        })
    }
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|source| CliError::Storage {
        path: path.to_path_buf(),
        source,
    })
}
