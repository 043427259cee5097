use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use fate_core::{TxId, TxStatus};
use tracing::{debug, error, info, warn};

use crate::config::ExecutorConfig;
use crate::error::{Classify, ErrorClass, ExecutorError, error_chain};
use crate::lease::LeaseRegistry;
use crate::record::{CompensationFailure, StepFailure, TxOutcome, TxRecord};
use crate::step::{Readiness, SagaStep};
use crate::store::CheckpointStore;

/// Result of one scheduling quantum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantum {
    /// A step completed; the next one can run right away.
    Advanced,
    /// Run again after the delay.
    Waiting(Duration),
    /// Nothing more to do: terminal, or parked after a failed compensation.
    Finished(TxStatus),
}

/// Drives transactions of step type `S` one quantum at a time.
///
/// The executor itself holds no per-transaction state; everything lives in
/// the checkpoint store, so any executor over the same store can resume any
/// transaction.
pub struct Executor<S: SagaStep> {
    store: Arc<dyn CheckpointStore<S>>,
    context: Arc<S::Context>,
    leases: Option<Arc<LeaseRegistry>>,
    config: ExecutorConfig,
}

impl<S: SagaStep> Executor<S> {
    #[must_use]
    pub fn new(
        store: Arc<dyn CheckpointStore<S>>,
        context: Arc<S::Context>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            context,
            leases: None,
            config,
        }
    }

    /// Leases left behind by a transaction are released when it terminates.
    #[must_use]
    pub fn with_leases(mut self, leases: Arc<LeaseRegistry>) -> Self {
        self.leases = Some(leases);
        self
    }

    #[must_use]
    pub fn context(&self) -> &S::Context {
        &self.context
    }

    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Allocates a transaction in status `NEW`.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint store fails.
    pub fn create(&self) -> Result<TxId, ExecutorError> {
        let tx = self.store.create()?;
        debug!(%tx, "transaction created");
        Ok(tx)
    }

    /// Installs the first step of a `NEW` transaction and makes it runnable.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::InvalidStatus`] if the transaction was already
    /// seeded.
    pub fn seed(&self, tx: TxId, step: S) -> Result<(), ExecutorError> {
        let mut record = self.store.load(tx)?;
        if record.status != TxStatus::New {
            return Err(ExecutorError::InvalidStatus {
                tx,
                status: record.status,
                expected: "NEW",
            });
        }
        let name = step.name();
        record.current_step = Some(step);
        record.status = TxStatus::InProgress;
        record.touch();
        self.store.save(&record)?;
        info!(%tx, step = name, "transaction seeded");
        Ok(())
    }

    /// `create` followed by `seed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint store fails.
    pub fn submit(&self, step: S) -> Result<TxId, ExecutorError> {
        let tx = self.create()?;
        self.seed(tx, step)?;
        Ok(tx)
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn record(&self, tx: TxId) -> Result<TxRecord<S>, ExecutorError> {
        Ok(self.store.load(tx)?)
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn status(&self, tx: TxId) -> Result<TxStatus, ExecutorError> {
        Ok(self.store.load(tx)?.status)
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn outcome(&self, tx: TxId) -> Result<TxOutcome, ExecutorError> {
        Ok(self.store.load(tx)?.outcome())
    }

    /// Every stored transaction, ascending by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint store fails.
    pub fn transactions(&self) -> Result<Vec<TxRecord<S>>, ExecutorError> {
        self.store
            .list()?
            .into_iter()
            .map(|tx| self.store.load(tx).map_err(ExecutorError::from))
            .collect()
    }

    /// Transactions a freshly started executor has to resume.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint store fails.
    pub fn recoverable(&self) -> Result<Vec<TxId>, ExecutorError> {
        Ok(self
            .transactions()?
            .into_iter()
            .filter(TxRecord::is_recoverable)
            .map(|record| record.id)
            .collect())
    }

    /// Deletes the record of a terminal transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::InvalidStatus`] unless the transaction is
    /// `SUCCESSFUL` or `FAILED`.
    pub fn forget(&self, tx: TxId) -> Result<(), ExecutorError> {
        let record = self.store.load(tx)?;
        if !record.status.is_terminal() {
            return Err(ExecutorError::InvalidStatus {
                tx,
                status: record.status,
                expected: "SUCCESSFUL or FAILED",
            });
        }
        self.store.delete(tx)?;
        debug!(%tx, "transaction forgotten");
        Ok(())
    }

    /// Runs quanta until the transaction finishes or `timeout` elapses,
    /// sleeping through waits. Meant for callers without a pool.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Timeout`] if the transaction is still running
    /// at the deadline.
    pub fn run_to_completion(&self, tx: TxId, timeout: Duration) -> Result<TxOutcome, ExecutorError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.run_quantum(tx)? {
                Quantum::Finished(_) => return self.outcome(tx),
                Quantum::Advanced => {}
                Quantum::Waiting(delay) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ExecutorError::Timeout(tx));
                    }
                    std::thread::sleep(delay.min(deadline - now));
                }
            }
            if Instant::now() >= deadline {
                return Err(ExecutorError::Timeout(tx));
            }
        }
    }

    /// Advances a transaction by at most one step, or runs its pending
    /// compensations.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure failures (checkpoint store)
    /// or calls on a transaction that was never seeded. Step errors are
    /// recorded in the transaction instead.
    pub fn run_quantum(&self, tx: TxId) -> Result<Quantum, ExecutorError> {
        let mut record = self.store.load(tx)?;
        match record.status {
            TxStatus::New => {
                return Err(ExecutorError::InvalidStatus {
                    tx,
                    status: record.status,
                    expected: "a seeded transaction",
                });
            }
            TxStatus::Successful | TxStatus::Failed => return Ok(Quantum::Finished(record.status)),
            TxStatus::FailedInProgress => {
                if record.is_parked() {
                    return Ok(Quantum::Finished(record.status));
                }
                return self.compensate(record);
            }
            TxStatus::InProgress | TxStatus::ReadyWait => {}
        }

        let Some(step) = record.current_step.clone() else {
            return Err(ExecutorError::MissingStep {
                tx,
                status: record.status,
            });
        };
        let name = step.name();

        let readiness = match step.readiness(tx, &self.context) {
            Ok(readiness) => readiness,
            Err(e) => match e.class() {
                ErrorClass::Semantic => {
                    record.audit.record_failure(name, Utc::now());
                    return self.fail(record, name, &e);
                }
                ErrorClass::Interrupted => return Ok(Quantum::Waiting(self.config.min_retry())),
                ErrorClass::Operational => {
                    if record.operational_retries >= self.config.operational_retry_limit {
                        record.audit.record_failure(name, Utc::now());
                        return self.fail(record, name, &e);
                    }
                    warn!(%tx, step = name, error = %error_chain(&e), "readiness check failed, backing off");
                    let delay = self.config.operational_backoff(record.operational_retries);
                    record.operational_retries += 1;
                    return self.wait(record, delay);
                }
            },
        };

        if let Readiness::NotReady { retry_after } = readiness {
            let delay = self.config.clamp_retry(retry_after);
            debug!(%tx, step = name, ?delay, "step not ready");
            return self.wait(record, delay);
        }

        let mut executed = step;
        let started_at = Utc::now();
        match executed.execute(tx, &self.context) {
            Ok(next) => {
                record
                    .audit
                    .record_executed(name, started_at, executed.compensation_description());
                let result = executed.result();
                record.completed_steps.push(executed);
                record.operational_retries = 0;
                record.retry_after_ms = None;
                record.touch();
                if let Some(next) = next {
                    debug!(%tx, step = name, next = next.name(), "step executed");
                    record.current_step = Some(next);
                    record.status = TxStatus::InProgress;
                    self.store.save(&record)?;
                    Ok(Quantum::Advanced)
                } else {
                    record.current_step = None;
                    record.status = TxStatus::Successful;
                    record.result = result;
                    self.store.save(&record)?;
                    info!(%tx, step = name, "transaction successful");
                    self.release_leftover_leases(tx);
                    Ok(Quantum::Finished(TxStatus::Successful))
                }
            }
            Err(e) => match e.class() {
                ErrorClass::Interrupted => {
                    debug!(%tx, step = name, "step interrupted");
                    Ok(Quantum::Waiting(self.config.min_retry()))
                }
                ErrorClass::Operational
                    if record.operational_retries < self.config.operational_retry_limit =>
                {
                    let delay = self.config.operational_backoff(record.operational_retries);
                    record.operational_retries += 1;
                    warn!(
                        %tx,
                        step = name,
                        attempt = record.operational_retries,
                        error = %error_chain(&e),
                        "step failed, will retry"
                    );
                    self.wait(record, delay)
                }
                ErrorClass::Operational | ErrorClass::Semantic => {
                    record.audit.record_failure(name, started_at);
                    self.fail(record, name, &e)
                }
            },
        }
    }

    fn wait(&self, mut record: TxRecord<S>, delay: Duration) -> Result<Quantum, ExecutorError> {
        record.status = TxStatus::ReadyWait;
        record.retry_after_ms = Some(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));
        record.touch();
        self.store.save(&record)?;
        Ok(Quantum::Waiting(delay))
    }

    fn fail(
        &self,
        mut record: TxRecord<S>,
        step: &str,
        error: &S::Error,
    ) -> Result<Quantum, ExecutorError> {
        let message = error_chain(error);
        warn!(tx = %record.id, step, error = %message, "step failed, compensating");
        record.failure = Some(StepFailure {
            step: step.to_string(),
            class: error.class(),
            message,
        });
        record.status = TxStatus::FailedInProgress;
        record.retry_after_ms = None;
        record.touch();
        self.store.save(&record)?;
        self.compensate(record)
    }

    // Compensates completed steps newest first, checkpointing after each one
    // so a restart never compensates the same step twice in a row.
    fn compensate(&self, mut record: TxRecord<S>) -> Result<Quantum, ExecutorError> {
        let tx = record.id;
        while let Some(step) = record.completed_steps.last() {
            let name = step.name();
            match step.compensate(tx, &self.context) {
                Ok(()) => {
                    record.audit.record_compensated(name);
                    record.completed_steps.pop();
                    record.touch();
                    self.store.save(&record)?;
                    debug!(%tx, step = name, "step compensated");
                }
                Err(e) if e.class() == ErrorClass::Interrupted => {
                    debug!(%tx, step = name, "compensation interrupted");
                    return Ok(Quantum::Waiting(self.config.min_retry()));
                }
                Err(e) => {
                    let message = error_chain(&e);
                    let description = step.compensation_description();
                    error!(
                        %tx,
                        step = name,
                        compensation = %description,
                        error = %message,
                        "compensation failed, transaction needs manual intervention"
                    );
                    record.audit.record_compensation_failed(name);
                    record.compensation_failure = Some(CompensationFailure {
                        step: name.to_string(),
                        description,
                        message,
                    });
                    record.touch();
                    self.store.save(&record)?;
                    return Ok(Quantum::Finished(TxStatus::FailedInProgress));
                }
            }
        }

        record.status = TxStatus::Failed;
        record.current_step = None;
        record.touch();
        self.store.save(&record)?;
        info!(%tx, "transaction failed, all steps compensated");
        self.release_leftover_leases(tx);
        Ok(Quantum::Finished(TxStatus::Failed))
    }

    fn release_leftover_leases(&self, tx: TxId) {
        let Some(leases) = &self.leases else {
            return;
        };
        match leases.release_all(tx) {
            Ok(released) if !released.is_empty() => {
                let keys: Vec<String> = released.iter().map(ToString::to_string).collect();
                warn!(%tx, leases = ?keys, "released leases left by finished transaction");
            }
            Ok(_) => {}
            Err(e) => warn!(%tx, error = %error_chain(&e), "failed to release leftover leases"),
        }
    }
}
