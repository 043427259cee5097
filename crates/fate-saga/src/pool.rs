use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use fate_core::{TxId, TxStatus};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, info};

use crate::cancel::CancellationToken;
use crate::error::{ExecutorError, error_chain};
use crate::executor::{Executor, Quantum};
use crate::step::SagaStep;

#[derive(Default)]
struct PoolState {
    ready: VecDeque<TxId>,
    timers: BinaryHeap<Reverse<(Instant, TxId)>>,
    // Everything in `ready`, `timers` or currently running on a worker.
    scheduled: HashSet<TxId>,
    running: usize,
    finished: HashMap<TxId, TxStatus>,
    shutdown: bool,
}

impl PoolState {
    fn promote_due(&mut self, now: Instant) {
        while let Some(Reverse((due, tx))) = self.timers.peek().copied() {
            if due > now {
                break;
            }
            self.timers.pop();
            self.ready.push_back(tx);
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.timers.peek().map(|Reverse((due, _))| *due)
    }

    fn is_idle(&self) -> bool {
        self.ready.is_empty() && self.timers.is_empty() && self.running == 0
    }
}

struct PoolInner<S: SagaStep> {
    executor: Arc<Executor<S>>,
    state: Mutex<PoolState>,
    work_ready: Condvar,
    progress: Condvar,
    cancel: CancellationToken,
}

/// Fixed set of worker threads running transaction quanta.
///
/// A transaction is never run by two workers at once. Waiting transactions
/// sit on a timer heap and do not occupy a worker.
pub struct ExecutorPool<S: SagaStep> {
    inner: Arc<PoolInner<S>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: SagaStep> ExecutorPool<S> {
    /// Spawns `worker-threads` workers named `fate-worker-N` and schedules
    /// every recoverable transaction found in the checkpoint store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be scanned or a thread cannot be
    /// spawned.
    pub fn start(executor: Arc<Executor<S>>, cancel: CancellationToken) -> Result<Self, ExecutorError> {
        let recovered = executor.recoverable()?;
        let num_threads = executor.config().worker_threads.max(1);
        let inner = Arc::new(PoolInner {
            executor,
            state: Mutex::new(PoolState::default()),
            work_ready: Condvar::new(),
            progress: Condvar::new(),
            cancel,
        });

        let pool = Self {
            inner,
            workers: Mutex::new(Vec::with_capacity(num_threads)),
        };
        for i in 0..num_threads {
            let inner = Arc::clone(&pool.inner);
            let handle = std::thread::Builder::new()
                .name(format!("fate-worker-{i}"))
                .spawn(move || worker_loop(&inner))
                .map_err(ExecutorError::Spawn)?;
            pool.workers.lock().push(handle);
        }

        if !recovered.is_empty() {
            info!(count = recovered.len(), "resuming unfinished transactions");
        }
        for tx in recovered {
            pool.enqueue(tx);
        }
        Ok(pool)
    }

    #[must_use]
    pub fn executor(&self) -> &Arc<Executor<S>> {
        &self.inner.executor
    }

    /// Creates, seeds and schedules a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ShutDown`] after `shutdown`, or a checkpoint
    /// error.
    pub fn submit(&self, step: S) -> Result<TxId, ExecutorError> {
        if self.inner.state.lock().shutdown {
            return Err(ExecutorError::ShutDown);
        }
        let tx = self.inner.executor.submit(step)?;
        self.enqueue(tx);
        Ok(tx)
    }

    /// Schedules an already seeded transaction. Scheduling one that is
    /// already queued or running is a no-op.
    pub fn enqueue(&self, tx: TxId) {
        let mut state = self.inner.state.lock();
        if state.shutdown || !state.scheduled.insert(tx) {
            return;
        }
        state.finished.remove(&tx);
        state.ready.push_back(tx);
        self.inner.work_ready.notify_one();
    }

    /// Blocks until `tx` is terminal or parked. A status finished by this
    /// pool is handed out once; later waits read it back from the store.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Timeout`] if that does not happen within
    /// `timeout`.
    pub fn wait_for(&self, tx: TxId, timeout: Duration) -> Result<TxStatus, ExecutorError> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = self.inner.state.lock();
                if let Some(status) = state.finished.remove(&tx) {
                    return Ok(status);
                }
                if state.scheduled.contains(&tx) {
                    if self.wait_for_progress(&mut state, deadline) {
                        return Err(ExecutorError::Timeout(tx));
                    }
                    continue;
                }
            }

            // Not ours right now; the store knows where it stands. Read it
            // without the lock so workers keep running.
            let record = self.inner.executor.record(tx)?;
            if record.status.is_terminal() || record.is_parked() {
                return Ok(record.status);
            }

            let mut state = self.inner.state.lock();
            if state.finished.contains_key(&tx) || state.scheduled.contains(&tx) {
                continue;
            }
            if self.wait_for_progress(&mut state, deadline) {
                return Err(ExecutorError::Timeout(tx));
            }
        }
    }

    /// Returns `true` once `deadline` has passed.
    fn wait_for_progress(&self, state: &mut MutexGuard<'_, PoolState>, deadline: Instant) -> bool {
        self.inner.progress.wait_until(state, deadline).timed_out()
    }

    /// Blocks until no transaction is queued, waiting or running. Returns
    /// `false` on timeout.
    #[must_use]
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while !state.is_idle() {
            if self
                .inner
                .progress
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.is_idle();
            }
        }
        true
    }

    /// Cancels the shared token, stops the workers after their current
    /// quantum and joins them. Unfinished transactions stay in the store for
    /// the next process.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        {
            let mut state = self.inner.state.lock();
            state.shutdown = true;
            self.inner.work_ready.notify_all();
            self.inner.progress.notify_all();
        }
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            if handle.join().is_err() {
                error!("executor worker panicked");
            }
        }
    }
}

impl<S: SagaStep> Drop for ExecutorPool<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop<S: SagaStep>(inner: &PoolInner<S>) {
    loop {
        let tx = {
            let mut state = inner.state.lock();
            loop {
                if state.shutdown {
                    return;
                }
                state.promote_due(Instant::now());
                if let Some(tx) = state.ready.pop_front() {
                    state.running += 1;
                    break tx;
                }
                match state.next_due() {
                    Some(due) => {
                        inner.work_ready.wait_until(&mut state, due);
                    }
                    None => inner.work_ready.wait(&mut state),
                }
            }
        };

        let quantum = inner.executor.run_quantum(tx);

        let mut state = inner.state.lock();
        state.running -= 1;
        match quantum {
            Ok(Quantum::Advanced) => state.ready.push_back(tx),
            Ok(Quantum::Waiting(delay)) => {
                state.timers.push(Reverse((Instant::now() + delay, tx)));
            }
            Ok(Quantum::Finished(status)) => {
                debug!(%tx, %status, "transaction left the pool");
                state.scheduled.remove(&tx);
                state.finished.insert(tx, status);
            }
            Err(e) => {
                let delay = inner.executor.config().min_retry().max(Duration::from_secs(1));
                error!(%tx, error = %error_chain(&e), "quantum failed, retrying later");
                state.timers.push(Reverse((Instant::now() + delay, tx)));
            }
        }
        inner.work_ready.notify_all();
        inner.progress.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::config::ExecutorConfig;
    use crate::error::{Classify, ErrorClass};
    use crate::store::MemoryCheckpointStore;

    const TIMEOUT: Duration = Duration::from_secs(10);

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

    fn pool() -> Result<ExecutorPool<Noop>, ExecutorError> {
        let executor = Executor::new(
            Arc::new(MemoryCheckpointStore::new()),
            Arc::new(()),
            ExecutorConfig::default(),
        );
        ExecutorPool::start(Arc::new(executor), CancellationToken::new())
    }

    #[test]
    fn waiting_forgets_finished_statuses() -> anyhow::Result<()> {
        let pool = pool()?;
        let txs = (0..16)
            .map(|_| pool.submit(Noop))
            .collect::<Result<Vec<_>, _>>()?;

        for tx in &txs {
            assert_eq!(pool.wait_for(*tx, TIMEOUT)?, TxStatus::Successful);
        }

        assert!(pool.wait_idle(TIMEOUT));
        assert!(pool.inner.state.lock().finished.is_empty());
        pool.shutdown();
        Ok(())
    }

    #[test]
    fn second_wait_reads_the_status_from_the_store() -> anyhow::Result<()> {
        let pool = pool()?;
        let tx = pool.submit(Noop)?;

        assert_eq!(pool.wait_for(tx, TIMEOUT)?, TxStatus::Successful);
        assert_eq!(pool.wait_for(tx, TIMEOUT)?, TxStatus::Successful);
        pool.shutdown();
        Ok(())
    }
}
