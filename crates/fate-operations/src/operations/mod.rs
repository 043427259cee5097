pub mod import;
mod shutdown;

use fate_core::{NodeAddress, TxId};
use fate_saga::{Readiness, SagaStep};
use serde::{Deserialize, Serialize};

pub use import::{ImportContext, ImportStep, prepare_import};
pub use shutdown::ShutdownTServer;

use crate::context::MasterContext;
use crate::types::ImportRequest;
use crate::{OperationError, Result};

/// Every step the master persists, one variant per operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "step", rename_all = "snake_case")]
pub enum MasterStep {
    ImportTable(ImportStep),
    ShutdownTServer(ShutdownTServer),
}

impl MasterStep {
    /// First step of an import, after the request passed its checks.
    ///
    /// # Errors
    ///
    /// See [`prepare_import`].
    pub fn import_table(env: &MasterContext, request: ImportRequest) -> Result<Self> {
        prepare_import(env, request).map(Self::ImportTable)
    }

    #[must_use]
    pub fn shutdown_tserver(server: NodeAddress, force: bool) -> Self {
        Self::ShutdownTServer(ShutdownTServer::new(server, force))
    }
}

impl From<ImportStep> for MasterStep {
    fn from(step: ImportStep) -> Self {
        Self::ImportTable(step)
    }
}

impl From<ShutdownTServer> for MasterStep {
    fn from(step: ShutdownTServer) -> Self {
        Self::ShutdownTServer(step)
    }
}

impl SagaStep for MasterStep {
    type Context = MasterContext;
    type Error = OperationError;

    fn name(&self) -> &'static str {
        match self {
            Self::ImportTable(step) => step.name(),
            Self::ShutdownTServer(step) => step.name(),
        }
    }

    fn readiness(&self, tx: TxId, env: &MasterContext) -> Result<Readiness> {
        match self {
            Self::ImportTable(step) => step.readiness(tx, env),
            Self::ShutdownTServer(step) => step.readiness(tx, env),
        }
    }

    fn execute(&mut self, tx: TxId, env: &MasterContext) -> Result<Option<Self>> {
        match self {
            Self::ImportTable(step) => Ok(step.execute(tx, env)?.map(Self::ImportTable)),
            Self::ShutdownTServer(step) => Ok(step.execute(tx, env)?.map(Self::ShutdownTServer)),
        }
    }

    fn compensate(&self, tx: TxId, env: &MasterContext) -> Result<()> {
        match self {
            Self::ImportTable(step) => step.compensate(tx, env),
            Self::ShutdownTServer(step) => step.compensate(tx, env),
        }
    }

    fn result(&self) -> Option<String> {
        match self {
            Self::ImportTable(step) => step.result(),
            Self::ShutdownTServer(step) => step.result(),
        }
    }

    fn compensation_description(&self) -> String {
        match self {
            Self::ImportTable(step) => step.compensation_description(),
            Self::ShutdownTServer(step) => step.compensation_description(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_form_names_operation_and_phase() -> anyhow::Result<()> {
        let step = MasterStep::from(ImportStep::AssignTableId(ImportContext::new(
            "/exports/t",
            "root",
            "events",
        )));

        let json = serde_json::to_value(&step)?;

        assert_eq!(json["operation"], "import_table");
        assert_eq!(json["step"]["phase"], "assign_table_id");
        assert_eq!(json["step"]["import"]["table_name"], "events");
        assert_eq!(serde_json::from_value::<MasterStep>(json)?, step);
        Ok(())
    }

    #[test]
    fn names_come_from_the_wrapped_step() {
        let step = MasterStep::shutdown_tserver(NodeAddress::new("ts", 1), true);

        assert_eq!(step.name(), "force_shutdown_tserver");
    }
}
