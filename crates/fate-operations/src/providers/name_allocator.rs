use std::ops::Range;
use std::sync::Arc;

use fate_core::{from_base36, to_base36};
use parking_lot::Mutex;

use crate::paths;
use crate::traits::{CoordinationNamespace, UniqueNameAllocator};
use crate::types::NodeExistsPolicy;
use crate::{OperationError, Result};

const DEFAULT_BLOCK: u64 = 100;

/// Hands out base-36 names from a counter kept in the coordination
/// namespace, reserving them in blocks.
pub struct NamespaceNameAllocator {
    namespace: Arc<dyn CoordinationNamespace>,
    block: u64,
    reserved: Mutex<Range<u64>>,
}

impl NamespaceNameAllocator {
    #[must_use]
    pub fn new(namespace: Arc<dyn CoordinationNamespace>) -> Self {
        Self::with_block_size(namespace, DEFAULT_BLOCK)
    }

    #[must_use]
    pub fn with_block_size(namespace: Arc<dyn CoordinationNamespace>, block: u64) -> Self {
        Self {
            namespace,
            block: block.max(1),
            reserved: Mutex::new(0..0),
        }
    }

    fn reserve_block(&self) -> Result<Range<u64>> {
        let start = match self.namespace.get_string(paths::NEXT_FILE)? {
            Some(value) => from_base36(&value).ok_or_else(|| OperationError::CorruptNode {
                path: paths::NEXT_FILE.to_string(),
                reason: format!("'{value}' is not a base-36 counter"),
            })?,
            None => 0,
        };
        let end = start + self.block;
        self.namespace.put(
            paths::NEXT_FILE,
            to_base36(end).as_bytes(),
            NodeExistsPolicy::Overwrite,
        )?;
        Ok(start..end)
    }
}

impl UniqueNameAllocator for NamespaceNameAllocator {
    fn next_name(&self) -> Result<String> {
        let mut reserved = self.reserved.lock();
        if reserved.is_empty() {
            *reserved = self.reserve_block()?;
        }
        let value = reserved.start;
        reserved.start += 1;
        Ok(to_base36(value))
    }
}
