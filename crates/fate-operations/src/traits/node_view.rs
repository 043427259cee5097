use std::collections::BTreeSet;
use std::sync::Arc;

use fate_core::NodeAddress;

use crate::Result;

/// Request channel to one tablet server.
pub trait NodeConnection: Send + Sync {
    /// Number of tablets currently hosted by the server.
    ///
    /// # Errors
    ///
    /// Returns [`crate::OperationError::NodeTransport`] when the server
    /// cannot be reached.
    fn assigned_work(&self) -> Result<usize>;

    /// Asks the server to stop.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be delivered.
    fn halt(&self) -> Result<()>;
}

/// The master's view of live tablet servers.
pub trait NodeView: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if liveness cannot be determined.
    fn online_nodes(&self) -> Result<BTreeSet<NodeAddress>>;

    /// Stops assigning new tablets to `node`.
    ///
    /// # Errors
    ///
    /// Returns an error if the suppression cannot be recorded.
    fn suppress_assignment(&self, node: &NodeAddress) -> Result<()>;

    /// # Errors
    ///
    /// Returns [`crate::OperationError::NodeTransport`] when no connection
    /// can be made.
    fn connection(&self, node: &NodeAddress) -> Result<Arc<dyn NodeConnection>>;
}
