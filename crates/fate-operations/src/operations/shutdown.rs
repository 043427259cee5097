use std::time::Instant;

use fate_core::{NodeAddress, TxId};
use fate_saga::{SagaStep, error_chain};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::context::MasterContext;
use crate::paths;
use crate::traits::NodeView;
use crate::types::NodeExistsPolicy;
use crate::{OperationError, Result};

/// Takes a tablet server out of service.
///
/// A forced shutdown removes the server's liveness lock and records it as
/// dead. A graceful one stops new assignments, waits for the server to
/// unload its tablets and then asks it to halt. Neither is undone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownTServer {
    pub server: NodeAddress,
    pub force: bool,
}

impl ShutdownTServer {
    #[must_use]
    pub fn new(server: NodeAddress, force: bool) -> Self {
        Self { server, force }
    }

    fn force_down(&self, tx: TxId, env: &MasterContext) -> Result<()> {
        let namespace = env.namespace();
        namespace.delete_lock(&format!("{}/{}", paths::TSERVERS, self.server))?;
        namespace.put(
            &format!("{}/{}", paths::DEAD_TSERVERS, self.server),
            b"forced down",
            NodeExistsPolicy::Overwrite,
        )?;
        info!(%tx, server = %self.server, "tablet server forced down");
        Ok(())
    }

    // Polls the server until it leaves the online set or reports no work.
    // Transport errors are expected while the server restarts, and a failed
    // read of the online set only costs one poll.
    fn drain(&self, tx: TxId, env: &MasterContext) -> Result<()> {
        let config = env.shutdown_config();
        let nodes = env.nodes();
        nodes.suppress_assignment(&self.server)?;
        let started = Instant::now();

        loop {
            match nodes.online_nodes() {
                Ok(online) if !online.contains(&self.server) => break,
                Ok(_) => {
                    if self.request_halt(tx, nodes) {
                        break;
                    }
                }
                Err(e) => error!(
                    %tx,
                    server = %self.server,
                    error = %error_chain(&e),
                    "failed to read the online tablet servers"
                ),
            }

            let waited = started.elapsed();
            if waited >= config.max_wait() {
                return Err(OperationError::ShutdownTimedOut {
                    node: self.server.clone(),
                    waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                });
            }
            if env.cancel().wait_timeout(config.poll_interval()) {
                return Err(OperationError::Cancelled);
            }
        }
        Ok(())
    }

    // Returns true once the server reported no work and was told to halt.
    fn request_halt(&self, tx: TxId, nodes: &dyn NodeView) -> bool {
        let polled = nodes.connection(&self.server).and_then(|connection| {
            let work = connection.assigned_work()?;
            if work == 0 {
                connection.halt()?;
            }
            Ok(work)
        });
        match polled {
            Ok(0) => {
                info!(%tx, server = %self.server, "tablet server asked to halt");
                return true;
            }
            Ok(work) => debug!(%tx, server = %self.server, work, "waiting for tablets to unload"),
            Err(OperationError::NodeTransport { .. }) => {
                debug!(%tx, server = %self.server, "tablet server unreachable");
            }
            Err(e) => error!(
                %tx,
                server = %self.server,
                error = %error_chain(&e),
                "error talking to tablet server"
            ),
        }
        false
    }
}

impl SagaStep for ShutdownTServer {
    type Context = MasterContext;
    type Error = OperationError;

    fn name(&self) -> &'static str {
        if self.force {
            "force_shutdown_tserver"
        } else {
            "shutdown_tserver"
        }
    }

    fn execute(&mut self, tx: TxId, env: &MasterContext) -> Result<Option<Self>> {
        if self.force {
            self.force_down(tx, env)?;
        } else {
            self.drain(tx, env)?;
        }
        Ok(None)
    }

    fn result(&self) -> Option<String> {
        Some(self.server.to_string())
    }

    fn compensation_description(&self) -> String {
        format!("nothing, shutdown of {} is not reversible", self.server)
    }
}
