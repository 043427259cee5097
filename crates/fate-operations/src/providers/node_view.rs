use std::collections::BTreeSet;
use std::sync::Arc;

use fate_core::NodeAddress;

use crate::paths;
use crate::traits::{CoordinationNamespace, NodeConnection, NodeView};
use crate::types::NodeExistsPolicy;
use crate::{OperationError, Result};

/// Liveness derived from the lock nodes under `/tservers`. This master has no
/// tablet server transport, so `connection` always reports a transport error.
pub struct NamespaceNodeView {
    namespace: Arc<dyn CoordinationNamespace>,
}

impl NamespaceNodeView {
    #[must_use]
    pub fn new(namespace: Arc<dyn CoordinationNamespace>) -> Self {
        Self { namespace }
    }
}

impl NodeView for NamespaceNodeView {
    fn online_nodes(&self) -> Result<BTreeSet<NodeAddress>> {
        self.namespace
            .children(paths::TSERVERS)?
            .into_iter()
            .map(|child| child.parse::<NodeAddress>().map_err(OperationError::from))
            .collect()
    }

    fn suppress_assignment(&self, node: &NodeAddress) -> Result<()> {
        self.namespace.put(
            &format!("{}/{node}", paths::SUPPRESSED_TSERVERS),
            b"",
            NodeExistsPolicy::Overwrite,
        )
    }

    fn connection(&self, node: &NodeAddress) -> Result<Arc<dyn NodeConnection>> {
        Err(OperationError::NodeTransport {
            node: node.clone(),
            message: "no tablet server transport configured".to_string(),
        })
    }
}
