//! Fault-tolerant execution of multi-step administrative operations.
//!
//! A transaction is a chain of [`SagaStep`]s. Each step is checkpointed before
//! and after it runs, may report that it is not ready yet, and is undone by its
//! compensation if a later step fails. After a crash every unfinished
//! transaction resumes from its last checkpoint by re-evaluating readiness.

mod audit;
mod cancel;
mod config;
mod error;
mod executor;
mod lease;
mod persist;
mod pool;
mod record;
mod step;
mod store;

pub use audit::{SagaAuditLog, StepRecord, StepStatus};
pub use cancel::CancellationToken;
pub use config::ExecutorConfig;
pub use error::{
    CheckpointError, Classify, ErrorClass, ExecutorError, LeaseError, PersistError, error_chain,
};
pub use executor::{Executor, Quantum};
pub use lease::{LeaseKey, LeaseRegistry};
pub use persist::{read_json, write_json_atomic};
pub use pool::ExecutorPool;
pub use record::{CompensationFailure, StepFailure, TxOutcome, TxRecord};
pub use step::{Readiness, SagaStep};
pub use store::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
