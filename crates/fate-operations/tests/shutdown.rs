//! Integration tests for taking tablet servers out of service.

mod common;

use std::thread;
use std::time::Duration;

use common::{Cluster, TIMEOUT};
use fate_core::{NodeAddress, TxStatus};
use fate_operations::operations::MasterStep;
use fate_operations::types::NodeExistsPolicy;
use fate_saga::{ErrorClass, Quantum};

const LOCK: &str = "/tservers/ts1:9997";

fn server() -> NodeAddress {
    NodeAddress::new("ts1", 9997)
}

#[test]
fn forced_shutdown_finishes_in_one_quantum() -> anyhow::Result<()> {
    let cluster = Cluster::new()?;
    cluster
        .ctx()
        .namespace()
        .put(LOCK, b"session-1", NodeExistsPolicy::FailIfExists)?;
    let executor = cluster.executor();

    let tx = executor.submit(MasterStep::shutdown_tserver(server(), true))?;

    assert_eq!(
        executor.run_quantum(tx)?,
        Quantum::Finished(TxStatus::Successful)
    );
    let namespace = cluster.ctx().namespace();
    assert!(namespace.get(LOCK)?.is_none());
    assert!(namespace.get("/dead/tservers/ts1:9997")?.is_some());
    assert_eq!(executor.outcome(tx)?.result.as_deref(), Some("ts1:9997"));
    Ok(())
}

#[test]
fn graceful_shutdown_of_an_absent_server_succeeds() -> anyhow::Result<()> {
    let cluster = Cluster::new()?;
    let executor = cluster.executor();

    let tx = executor.submit(MasterStep::shutdown_tserver(server(), false))?;
    let outcome = executor.run_to_completion(tx, TIMEOUT)?;

    assert_eq!(outcome.status, TxStatus::Successful);
    assert!(
        cluster
            .ctx()
            .namespace()
            .get("/suppressed/tservers/ts1:9997")?
            .is_some()
    );
    Ok(())
}

#[test]
fn graceful_shutdown_completes_once_the_lock_disappears() -> anyhow::Result<()> {
    let cluster = Cluster::new()?;
    let namespace = cluster.collaborators.namespace.clone();
    namespace.put(LOCK, b"session-1", NodeExistsPolicy::FailIfExists)?;
    let executor = cluster.executor();
    let tx = executor.submit(MasterStep::shutdown_tserver(server(), false))?;

    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        namespace.delete(LOCK)
    });
    let outcome = executor.run_to_completion(tx, TIMEOUT)?;
    stopper.join().expect("stopper thread")?;

    assert_eq!(outcome.status, TxStatus::Successful);
    Ok(())
}

#[test]
fn unreachable_server_fails_after_max_wait() -> anyhow::Result<()> {
    let cluster = Cluster::new()?;
    cluster
        .ctx()
        .namespace()
        .put(LOCK, b"session-1", NodeExistsPolicy::FailIfExists)?;
    let executor = cluster.executor();

    let tx = executor.submit(MasterStep::shutdown_tserver(server(), false))?;
    let outcome = executor.run_to_completion(tx, TIMEOUT)?;

    assert_eq!(outcome.status, TxStatus::Failed);
    let failure = outcome.failure.expect("failure recorded");
    assert_eq!(failure.step, "shutdown_tserver");
    assert_eq!(failure.class, ErrorClass::Semantic);
    assert!(failure.message.contains("still online"), "{}", failure.message);
    assert!(cluster.ctx().namespace().get(LOCK)?.is_some());
    Ok(())
}
