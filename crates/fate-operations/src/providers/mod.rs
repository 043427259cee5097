mod bulk_fs;
mod event_notifier;
mod metadata_store;
mod name_allocator;
mod namespace;
mod node_view;
mod permission_store;

pub use bulk_fs::LocalBulkFileSystem;
pub use event_notifier::LoggingEventNotifier;
pub use metadata_store::InMemoryMetadataStore;
pub use name_allocator::NamespaceNameAllocator;
pub use namespace::InMemoryNamespace;
pub use node_view::NamespaceNodeView;
pub use permission_store::NamespacePermissionStore;
