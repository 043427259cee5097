mod bulk_fs;
mod event_notifier;
mod metadata_store;
mod name_allocator;
mod namespace;
mod node_view;
mod permission_store;

pub use bulk_fs::BulkFileSystem;
pub use event_notifier::EventNotifier;
pub use metadata_store::{MetadataStore, MutationWriter};
pub use name_allocator::UniqueNameAllocator;
pub use namespace::CoordinationNamespace;
pub use node_view::{NodeConnection, NodeView};
pub use permission_store::PermissionStore;
