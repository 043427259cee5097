use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a step in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum StepStatus {
    /// Step executed successfully.
    Executed,
    /// Step failed during execution.
    Failed,
    /// Step was compensated successfully.
    Compensated,
    /// Step compensation failed.
    CompensationFailed,
}

/// Record of one step of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    /// When execution or compensation last finished.
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_description: Option<String>,
}

/// Audit trail of a transaction, persisted with its checkpoint so it
/// survives restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaAuditLog {
    records: Vec<StepRecord>,
}

impl SagaAuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_executed(
        &mut self,
        name: &str,
        started_at: DateTime<Utc>,
        compensation_description: String,
    ) {
        self.records.push(StepRecord {
            name: name.to_string(),
            status: StepStatus::Executed,
            started_at,
            completed_at: Some(Utc::now()),
            compensation_description: Some(compensation_description),
        });
    }

    pub(crate) fn record_failure(&mut self, name: &str, started_at: DateTime<Utc>) {
        self.records.push(StepRecord {
            name: name.to_string(),
            status: StepStatus::Failed,
            started_at,
            completed_at: Some(Utc::now()),
            compensation_description: None,
        });
    }

    pub(crate) fn record_compensated(&mut self, step_name: &str) {
        self.mark_latest_executed(step_name, StepStatus::Compensated);
    }

    pub(crate) fn record_compensation_failed(&mut self, step_name: &str) {
        self.mark_latest_executed(step_name, StepStatus::CompensationFailed);
    }

    // A chain may run the same step type more than once, so only the most
    // recent still-executed record is updated.
    fn mark_latest_executed(&mut self, step_name: &str, status: StepStatus) {
        if let Some(record) = self
            .records
            .iter_mut()
            .rev()
            .find(|r| r.name == step_name && r.status == StepStatus::Executed)
        {
            record.status = status;
            record.completed_at = Some(Utc::now());
        }
    }

    #[must_use]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// One line per step, prefixed with a status marker.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for record in &self.records {
            let status = match record.status {
                StepStatus::Executed => "✓",
                StepStatus::Failed => "✗",
                StepStatus::Compensated => "↩",
                StepStatus::CompensationFailed => "⚠",
            };
            lines.push(format!("{status} {}", record.name));
        }
        lines.join("\n")
    }
}
