//! Integration tests for failure handling and compensation order.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Script, Scripted, fast_config};
use fate_core::TxStatus;
use fate_saga::{
    CheckpointStore, ErrorClass, Executor, MemoryCheckpointStore, Quantum, StepStatus,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn executor(script: Script) -> Executor<Scripted> {
    let store: Arc<dyn CheckpointStore<Scripted>> = Arc::new(MemoryCheckpointStore::new());
    Executor::new(store, Arc::new(script), fast_config())
}

#[test]
fn successful_chain_stores_final_result() -> anyhow::Result<()> {
    let executor = executor(Script::new(3));

    let tx = executor.submit(Scripted { index: 0 })?;
    let outcome = executor.run_to_completion(tx, TIMEOUT)?;

    assert_eq!(outcome.status, TxStatus::Successful);
    assert_eq!(outcome.result.as_deref(), Some("finished after 2"));
    assert_eq!(
        executor.context().log(),
        vec!["execute 0", "execute 1", "execute 2"]
    );
    let record = executor.record(tx)?;
    assert!(record.current_step.is_none());
    assert_eq!(record.completed_steps.len(), 3);
    Ok(())
}

#[test]
fn semantic_failure_compensates_completed_steps_in_reverse() -> anyhow::Result<()> {
    let executor = executor(Script {
        fail_semantic_at: Some(3),
        ..Script::new(5)
    });

    let tx = executor.submit(Scripted { index: 0 })?;
    let outcome = executor.run_to_completion(tx, TIMEOUT)?;

    assert_eq!(outcome.status, TxStatus::Failed);
    assert_eq!(
        executor.context().log(),
        vec![
            "execute 0",
            "execute 1",
            "execute 2",
            "fail 3",
            "undo 2",
            "undo 1",
            "undo 0"
        ]
    );
    let failure = outcome.failure.expect("failure recorded");
    assert_eq!(failure.step, "scripted");
    assert_eq!(failure.class, ErrorClass::Semantic);
    assert_eq!(failure.message, "step 3 rejected the request");
    assert!(executor.record(tx)?.completed_steps.is_empty());
    Ok(())
}

#[test]
fn failure_of_first_step_fails_without_compensation() -> anyhow::Result<()> {
    let executor = executor(Script {
        fail_semantic_at: Some(0),
        ..Script::new(2)
    });

    let tx = executor.submit(Scripted { index: 0 })?;
    let outcome = executor.run_to_completion(tx, TIMEOUT)?;

    assert_eq!(outcome.status, TxStatus::Failed);
    assert_eq!(executor.context().log(), vec!["fail 0"]);
    Ok(())
}

#[test]
fn failed_compensation_parks_transaction() -> anyhow::Result<()> {
    let executor = executor(Script {
        fail_semantic_at: Some(3),
        failing_compensation: Some(1),
        ..Script::new(4)
    });

    let tx = executor.submit(Scripted { index: 0 })?;
    let outcome = executor.run_to_completion(tx, TIMEOUT)?;

    assert_eq!(outcome.status, TxStatus::FailedInProgress);
    let parked = outcome.compensation_failure.expect("compensation failure");
    assert_eq!(parked.description, "undo scripted");
    assert!(parked.message.contains("step 1"));
    assert_eq!(executor.context().log().last().map(String::as_str), Some("undo 2"));

    let record = executor.record(tx)?;
    assert!(record.is_parked());
    assert_eq!(record.completed_steps.len(), 2);
    assert!(executor.recoverable()?.is_empty());
    assert_eq!(
        executor.run_quantum(tx)?,
        Quantum::Finished(TxStatus::FailedInProgress)
    );
    Ok(())
}

#[test]
fn operational_errors_retry_until_limit_then_fail() -> anyhow::Result<()> {
    let script = Script::new(2);
    script.transient_failures.lock().insert(1, 10);
    let executor = executor(script);

    let tx = executor.submit(Scripted { index: 0 })?;
    let outcome = executor.run_to_completion(tx, TIMEOUT)?;

    assert_eq!(outcome.status, TxStatus::Failed);
    assert_eq!(
        executor.context().log(),
        vec![
            "execute 0",
            "transient 1",
            "transient 1",
            "transient 1",
            "undo 0"
        ]
    );
    assert_eq!(
        outcome.failure.map(|f| f.class),
        Some(ErrorClass::Operational)
    );
    Ok(())
}

#[test]
fn operational_error_within_limit_is_retried_through_readiness() -> anyhow::Result<()> {
    let script = Script::new(2);
    script.transient_failures.lock().insert(1, 1);
    let executor = executor(script);
    let tx = executor.submit(Scripted { index: 0 })?;

    assert_eq!(executor.run_quantum(tx)?, Quantum::Advanced);
    assert!(matches!(executor.run_quantum(tx)?, Quantum::Waiting(_)));
    assert_eq!(executor.status(tx)?, TxStatus::ReadyWait);
    let outcome = executor.run_to_completion(tx, TIMEOUT)?;

    assert_eq!(outcome.status, TxStatus::Successful);
    assert_eq!(executor.record(tx)?.operational_retries, 0);
    Ok(())
}

#[test]
fn audit_log_tracks_execution_and_compensation() -> anyhow::Result<()> {
    let executor = executor(Script {
        fail_semantic_at: Some(2),
        ..Script::new(3)
    });

    let tx = executor.submit(Scripted { index: 0 })?;
    executor.run_to_completion(tx, TIMEOUT)?;
    let record = executor.record(tx)?;
    let statuses: Vec<StepStatus> = record.audit.records().iter().map(|r| r.status).collect();

    assert_eq!(
        statuses,
        vec![
            StepStatus::Compensated,
            StepStatus::Compensated,
            StepStatus::Failed
        ]
    );
    assert!(record.audit.summary().contains("✗ scripted"));
    Ok(())
}

#[test]
fn forget_only_accepts_terminal_transactions() -> anyhow::Result<()> {
    let executor = executor(Script::new(2));
    let tx = executor.submit(Scripted { index: 0 })?;

    assert!(executor.forget(tx).is_err());

    executor.run_to_completion(tx, TIMEOUT)?;
    executor.forget(tx)?;

    assert!(executor.record(tx).is_err());
    Ok(())
}

#[test]
fn seeding_twice_is_rejected() -> anyhow::Result<()> {
    let executor = executor(Script::new(1));
    let tx = executor.create()?;
    executor.seed(tx, Scripted { index: 0 })?;

    let err = executor
        .seed(tx, Scripted { index: 0 })
        .expect_err("already seeded");

    assert!(err.to_string().contains("IN_PROGRESS"));
    Ok(())
}
