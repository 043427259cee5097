use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use fate_core::NodeAddress;
use parking_lot::Mutex;

use crate::traits::{NodeConnection, NodeView};
use crate::{OperationError, Result};

/// Tablet server answering `assigned_work` from a script.
pub struct ScriptedConnection {
    responses: Mutex<VecDeque<Result<usize>>>,
    fallback: Option<usize>,
    polls: Mutex<usize>,
    halted: Mutex<bool>,
}

impl ScriptedConnection {
    #[must_use]
    pub fn new(responses: Vec<Result<usize>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            polls: Mutex::new(0),
            halted: Mutex::new(false),
        }
    }

    /// A server that always reports `work` tablets.
    #[must_use]
    pub fn always(work: usize) -> Self {
        Self {
            fallback: Some(work),
            ..Self::new(Vec::new())
        }
    }

    pub fn polls(&self) -> usize {
        *self.polls.lock()
    }

    pub fn halted(&self) -> bool {
        *self.halted.lock()
    }
}

impl NodeConnection for ScriptedConnection {
    fn assigned_work(&self) -> Result<usize> {
        *self.polls.lock() += 1;
        match self.responses.lock().pop_front() {
            Some(response) => response,
            None => self.fallback.ok_or_else(|| OperationError::NodeRequest {
                node: NodeAddress::new("scripted", 0),
                message: "script exhausted".to_string(),
            }),
        }
    }

    fn halt(&self) -> Result<()> {
        *self.halted.lock() = true;
        Ok(())
    }
}

/// Node view over scripted connections; a halted server drops out of the
/// online set.
#[derive(Default)]
pub struct ScriptedNodeView {
    nodes: BTreeMap<NodeAddress, Arc<ScriptedConnection>>,
    suppressed: Mutex<BTreeSet<NodeAddress>>,
    failing_reads: Mutex<usize>,
    reads: Mutex<usize>,
}

impl ScriptedNodeView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_node(mut self, node: NodeAddress, connection: Arc<ScriptedConnection>) -> Self {
        self.nodes.insert(node, connection);
        self
    }

    /// The first `count` reads of the online set fail.
    #[must_use]
    pub fn with_failing_reads(self, count: usize) -> Self {
        *self.failing_reads.lock() = count;
        self
    }

    pub fn suppressed(&self) -> BTreeSet<NodeAddress> {
        self.suppressed.lock().clone()
    }

    pub fn reads(&self) -> usize {
        *self.reads.lock()
    }
}

impl NodeView for ScriptedNodeView {
    fn online_nodes(&self) -> Result<BTreeSet<NodeAddress>> {
        *self.reads.lock() += 1;
        {
            let mut failing = self.failing_reads.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(OperationError::NodeRequest {
                    node: NodeAddress::new("registry", 0),
                    message: "session expired".to_string(),
                });
            }
        }
        Ok(self
            .nodes
            .iter()
            .filter(|(_, connection)| !connection.halted())
            .map(|(node, _)| node.clone())
            .collect())
    }

    fn suppress_assignment(&self, node: &NodeAddress) -> Result<()> {
        self.suppressed.lock().insert(node.clone());
        Ok(())
    }

    fn connection(&self, node: &NodeAddress) -> Result<Arc<dyn NodeConnection>> {
        match self.nodes.get(node) {
            Some(connection) => Ok(Arc::clone(connection) as Arc<dyn NodeConnection>),
            None => Err(OperationError::NodeTransport {
                node: node.clone(),
                message: "unknown server".to_string(),
            }),
        }
    }
}
