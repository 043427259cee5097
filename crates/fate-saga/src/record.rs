use chrono::{DateTime, Utc};
use fate_core::{TxId, TxStatus};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::audit::SagaAuditLog;
use crate::error::ErrorClass;

/// The error that moved a transaction to `FAILED_IN_PROGRESS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step: String,
    pub class: ErrorClass,
    pub message: String,
}

/// A compensation that could not be completed. While present the
/// transaction is parked and needs an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationFailure {
    pub step: String,
    pub description: String,
    pub message: String,
}

/// Durable state of one transaction.
///
/// `completed_steps` holds the snapshot of every step whose `execute`
/// returned and whose checkpoint was written, in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "S: Serialize", deserialize = "S: DeserializeOwned"))]
pub struct TxRecord<S> {
    pub id: TxId,
    pub status: TxStatus,
    pub current_step: Option<S>,
    #[serde(default = "Vec::new")]
    pub completed_steps: Vec<S>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    #[serde(default)]
    pub operational_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_failure: Option<CompensationFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default)]
    pub audit: SagaAuditLog,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<S> TxRecord<S> {
    #[must_use]
    pub fn new(id: TxId) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: TxStatus::New,
            current_step: None,
            completed_steps: Vec::new(),
            retry_after_ms: None,
            operational_retries: 0,
            failure: None,
            compensation_failure: None,
            result: None,
            audit: SagaAuditLog::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Compensation failed; the executor will not touch it again.
    #[must_use]
    pub fn is_parked(&self) -> bool {
        self.status == TxStatus::FailedInProgress && self.compensation_failure.is_some()
    }

    /// Whether an executor should pick this transaction up after a restart.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self.status {
            TxStatus::InProgress | TxStatus::ReadyWait => true,
            TxStatus::FailedInProgress => !self.is_parked(),
            TxStatus::New | TxStatus::Failed | TxStatus::Successful => false,
        }
    }

    #[must_use]
    pub fn outcome(&self) -> TxOutcome {
        TxOutcome {
            id: self.id,
            status: self.status,
            result: self.result.clone(),
            failure: self.failure.clone(),
            compensation_failure: self.compensation_failure.clone(),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// What a caller gets to see about a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutcome {
    pub id: TxId,
    pub status: TxStatus,
    pub result: Option<String>,
    pub failure: Option<StepFailure>,
    pub compensation_failure: Option<CompensationFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_not_recoverable() {
        let record: TxRecord<String> = TxRecord::new(TxId::new(1));

        assert_eq!(record.status, TxStatus::New);
        assert!(!record.is_recoverable());
        assert!(!record.is_parked());
    }

    #[test]
    fn failed_in_progress_is_recoverable_until_compensation_fails() {
        let mut record: TxRecord<String> = TxRecord::new(TxId::new(1));
        record.status = TxStatus::FailedInProgress;
        assert!(record.is_recoverable());

        record.compensation_failure = Some(CompensationFailure {
            step: "s".to_string(),
            description: "undo s".to_string(),
            message: "disk gone".to_string(),
        });

        assert!(record.is_parked());
        assert!(!record.is_recoverable());
    }

    #[test]
    fn round_trips_through_json() {
        let mut record: TxRecord<String> = TxRecord::new(TxId::new(7));
        record.status = TxStatus::InProgress;
        record.current_step = Some("second".to_string());
        record.completed_steps.push("first".to_string());

        let json = serde_json::to_string(&record).expect("serialize");
        let back: TxRecord<String> = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(back.id, record.id);
        assert_eq!(back.status, TxStatus::InProgress);
        assert_eq!(back.current_step.as_deref(), Some("second"));
        assert_eq!(back.completed_steps, vec!["first".to_string()]);
    }
}
