use std::time::Duration;

use fate_core::TxId;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Classify;

/// Answer of [`SagaStep::readiness`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady { retry_after: Duration },
}

impl Readiness {
    #[must_use]
    pub fn retry_after_millis(millis: u64) -> Self {
        Self::NotReady {
            retry_after: Duration::from_millis(millis),
        }
    }

    #[must_use]
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// One unit of a fault-tolerant transaction.
///
/// A step value is plain data: it is serialized into the checkpoint before it
/// runs, so everything it needs after a restart must live in its fields.
/// Handles to external systems come from `Context`.
///
/// The executor may call `readiness` and `execute` more than once for the same
/// step, for example after a crash between the side effect and the
/// checkpoint. Both must therefore be idempotent.
pub trait SagaStep: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Shared services the step talks to.
    type Context: Send + Sync + 'static;

    type Error: std::error::Error + Classify + Send + Sync + 'static;

    /// Stable name used in logs and the audit trail.
    fn name(&self) -> &'static str;

    /// Reports whether `execute` can run now. Usually acquires the leases the
    /// step needs; must not have any other side effect.
    ///
    /// # Errors
    ///
    /// Returns an error when readiness cannot be determined. Operational
    /// errors are retried with backoff, others fail the transaction.
    fn readiness(&self, tx: TxId, ctx: &Self::Context) -> Result<Readiness, Self::Error> {
        let _ = (tx, ctx);
        Ok(Readiness::Ready)
    }

    /// Performs the step and returns the next one, or `None` when the chain is
    /// complete. May record data it produced into `self`; that state is what
    /// gets checkpointed as completed and later compensated.
    ///
    /// # Errors
    ///
    /// Returns an error if the step fails. The error class decides whether the
    /// transaction is retried, rolled back or left for the next process.
    fn execute(&mut self, tx: TxId, ctx: &Self::Context) -> Result<Option<Self>, Self::Error>;

    /// Undoes the side effects of a completed `execute`. Must tolerate the
    /// effects being partially or entirely absent.
    ///
    /// # Errors
    ///
    /// Returns an error if compensation fails; the transaction is then parked
    /// for an operator.
    fn compensate(&self, tx: TxId, ctx: &Self::Context) -> Result<(), Self::Error> {
        let _ = (tx, ctx);
        Ok(())
    }

    /// Result string stored in the transaction when this is the final step.
    fn result(&self) -> Option<String> {
        None
    }

    fn compensation_description(&self) -> String {
        format!("undo {}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use serde::Deserialize;

    #[derive(Debug, thiserror::Error)]
    #[error("never")]
    struct Never;

    impl Classify for Never {
        fn class(&self) -> ErrorClass {
            ErrorClass::Semantic
        }
    }

    #[derive(Clone, Serialize, Deserialize)]
    struct Noop;

    impl SagaStep for Noop {
        type Context = ();
        type Error = Never;

        fn name(&self) -> &'static str {
            "noop"
        }

        fn execute(&mut self, _tx: TxId, _ctx: &()) -> Result<Option<Self>, Never> {
            Ok(None)
        }
    }

    #[test]
    fn defaults_are_ready_and_compensate_nothing() {
        let step = Noop;

        assert_eq!(
            step.readiness(TxId::new(1), &()).expect("ready"),
            Readiness::Ready
        );
        assert!(step.compensate(TxId::new(1), &()).is_ok());
        assert!(step.result().is_none());
        assert_eq!(step.compensation_description(), "undo noop");
    }

    #[test]
    fn retry_after_millis_is_not_ready() {
        let readiness = Readiness::retry_after_millis(50);

        assert!(!readiness.is_ready());
        assert_eq!(
            readiness,
            Readiness::NotReady {
                retry_after: Duration::from_millis(50)
            }
        );
    }
}
