use std::path::Path;
use std::sync::Arc;

use fate_saga::{CancellationToken, LeaseRegistry};

use crate::Result;
use crate::config::{ImportConfig, ShutdownConfig};
use crate::providers::{
    InMemoryMetadataStore, InMemoryNamespace, LocalBulkFileSystem, LoggingEventNotifier,
    NamespaceNameAllocator, NamespaceNodeView, NamespacePermissionStore,
};
use crate::traits::{
    BulkFileSystem, CoordinationNamespace, EventNotifier, MetadataStore, NodeView,
    PermissionStore, UniqueNameAllocator,
};

/// The external services a master operation talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub namespace: Arc<dyn CoordinationNamespace>,
    pub metadata: Arc<dyn MetadataStore>,
    pub files: Arc<dyn BulkFileSystem>,
    pub names: Arc<dyn UniqueNameAllocator>,
    pub nodes: Arc<dyn NodeView>,
    pub permissions: Arc<dyn PermissionStore>,
    pub events: Arc<dyn EventNotifier>,
}

impl Collaborators {
    /// Volatile collaborators over a bulk store rooted at `bulk_root`.
    #[must_use]
    pub fn standalone(bulk_root: &Path) -> Self {
        let namespace: Arc<dyn CoordinationNamespace> = Arc::new(InMemoryNamespace::new());
        Self::over(namespace, Arc::new(InMemoryMetadataStore::new()), bulk_root)
    }

    /// Collaborators whose namespace and metadata survive a restart, kept as
    /// snapshots under `state_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing snapshot cannot be read.
    pub fn persistent(state_dir: &Path, bulk_root: &Path) -> Result<Self> {
        let namespace: Arc<dyn CoordinationNamespace> =
            Arc::new(InMemoryNamespace::open(state_dir.join("namespace.json"))?);
        let metadata = Arc::new(InMemoryMetadataStore::open(state_dir.join("metadata.json"))?);
        Ok(Self::over(namespace, metadata, bulk_root))
    }

    fn over(
        namespace: Arc<dyn CoordinationNamespace>,
        metadata: Arc<dyn MetadataStore>,
        bulk_root: &Path,
    ) -> Self {
        Self {
            metadata,
            files: Arc::new(LocalBulkFileSystem::new(bulk_root)),
            names: Arc::new(NamespaceNameAllocator::new(Arc::clone(&namespace))),
            nodes: Arc::new(NamespaceNodeView::new(Arc::clone(&namespace))),
            permissions: Arc::new(NamespacePermissionStore::new(Arc::clone(&namespace))),
            events: Arc::new(LoggingEventNotifier::new()),
            namespace,
        }
    }
}

/// Environment threaded through every master step.
pub struct MasterContext {
    collaborators: Collaborators,
    leases: Arc<LeaseRegistry>,
    cancel: CancellationToken,
    import: ImportConfig,
    shutdown: ShutdownConfig,
}

impl MasterContext {
    #[must_use]
    pub fn new(
        collaborators: Collaborators,
        leases: Arc<LeaseRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            collaborators,
            leases,
            cancel,
            import: ImportConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }

    #[must_use]
    pub fn with_import_config(mut self, config: ImportConfig) -> Self {
        self.import = config;
        self
    }

    #[must_use]
    pub fn with_shutdown_config(mut self, config: ShutdownConfig) -> Self {
        self.shutdown = config;
        self
    }

    #[must_use]
    pub fn namespace(&self) -> &dyn CoordinationNamespace {
        self.collaborators.namespace.as_ref()
    }

    #[must_use]
    pub fn metadata(&self) -> &dyn MetadataStore {
        self.collaborators.metadata.as_ref()
    }

    #[must_use]
    pub fn files(&self) -> &dyn BulkFileSystem {
        self.collaborators.files.as_ref()
    }

    #[must_use]
    pub fn names(&self) -> &dyn UniqueNameAllocator {
        self.collaborators.names.as_ref()
    }

    #[must_use]
    pub fn nodes(&self) -> &dyn NodeView {
        self.collaborators.nodes.as_ref()
    }

    #[must_use]
    pub fn permissions(&self) -> &dyn PermissionStore {
        self.collaborators.permissions.as_ref()
    }

    #[must_use]
    pub fn events(&self) -> &dyn EventNotifier {
        self.collaborators.events.as_ref()
    }

    #[must_use]
    pub fn leases(&self) -> &LeaseRegistry {
        &self.leases
    }

    #[must_use]
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn import_config(&self) -> &ImportConfig {
        &self.import
    }

    #[must_use]
    pub fn shutdown_config(&self) -> &ShutdownConfig {
        &self.shutdown
    }
}
