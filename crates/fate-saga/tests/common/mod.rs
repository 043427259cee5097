//! Scripted step chain shared by the executor integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, mpsc};
use std::sync::atomic::{AtomicUsize, Ordering};

use fate_core::TxId;
use fate_saga::{
    CheckpointError, CheckpointStore, Classify, ErrorClass, ExecutorConfig, Readiness, SagaStep,
    TxRecord,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("step {0} rejected the request")]
    Semantic(usize),
    #[error("step {0} lost its connection")]
    Operational(usize),
    #[error("step {0} interrupted")]
    Interrupted(usize),
}

impl Classify for ScriptError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Semantic(_) => ErrorClass::Semantic,
            Self::Operational(_) => ErrorClass::Operational,
            Self::Interrupted(_) => ErrorClass::Interrupted,
        }
    }
}

/// Behavior of the chain, keyed by step index.
#[derive(Default)]
pub struct Script {
    pub steps: usize,
    pub fail_semantic_at: Option<usize>,
    pub interrupt_at: Option<usize>,
    pub failing_compensation: Option<usize>,
    pub transient_failures: Mutex<HashMap<usize, u32>>,
    pub not_ready: Mutex<HashMap<usize, u32>>,
    pub log: Mutex<Vec<String>>,
}

impl Script {
    pub fn new(steps: usize) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    fn take(counter: &Mutex<HashMap<usize, u32>>, index: usize) -> bool {
        let mut counter = counter.lock();
        match counter.get_mut(&index) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scripted {
    pub index: usize,
}

impl SagaStep for Scripted {
    type Context = Script;
    type Error = ScriptError;

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn readiness(&self, _tx: TxId, ctx: &Script) -> Result<Readiness, ScriptError> {
        if Script::take(&ctx.not_ready, self.index) {
            ctx.log.lock().push(format!("wait {}", self.index));
            return Ok(Readiness::retry_after_millis(1));
        }
        Ok(Readiness::Ready)
    }

    fn execute(&mut self, _tx: TxId, ctx: &Script) -> Result<Option<Self>, ScriptError> {
        if ctx.fail_semantic_at == Some(self.index) {
            ctx.log.lock().push(format!("fail {}", self.index));
            return Err(ScriptError::Semantic(self.index));
        }
        if ctx.interrupt_at == Some(self.index) {
            return Err(ScriptError::Interrupted(self.index));
        }
        if Script::take(&ctx.transient_failures, self.index) {
            ctx.log.lock().push(format!("transient {}", self.index));
            return Err(ScriptError::Operational(self.index));
        }
        ctx.log.lock().push(format!("execute {}", self.index));
        if self.index + 1 < ctx.steps {
            Ok(Some(Self {
                index: self.index + 1,
            }))
        } else {
            Ok(None)
        }
    }

    fn compensate(&self, _tx: TxId, ctx: &Script) -> Result<(), ScriptError> {
        if ctx.failing_compensation == Some(self.index) {
            return Err(ScriptError::Operational(self.index));
        }
        ctx.log.lock().push(format!("undo {}", self.index));
        Ok(())
    }

    fn result(&self) -> Option<String> {
        Some(format!("finished after {}", self.index))
    }
}

pub fn fast_config() -> ExecutorConfig {
    ExecutorConfig {
        worker_threads: 2,
        min_retry_ms: 1,
        max_retry_ms: 20,
        operational_retry_limit: 2,
        operational_backoff_ms: 1,
    }
}

/// Wraps a store and starts failing every `save` once `budget` saves have
/// gone through, like a process dying right after a side effect.
pub struct CrashingStore<S> {
    pub inner: Arc<dyn CheckpointStore<S>>,
    budget: AtomicUsize,
}

impl<S> CrashingStore<S> {
    pub fn new(inner: Arc<dyn CheckpointStore<S>>, budget: usize) -> Self {
        Self {
            inner,
            budget: AtomicUsize::new(budget),
        }
    }
}

impl<S: Send + Sync> CheckpointStore<S> for CrashingStore<S> {
    fn create(&self) -> Result<TxId, CheckpointError> {
        self.inner.create()
    }

    fn load(&self, tx: TxId) -> Result<TxRecord<S>, CheckpointError> {
        self.inner.load(tx)
    }

    fn save(&self, record: &TxRecord<S>) -> Result<(), CheckpointError> {
        let remaining = self.budget.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(CheckpointError::Unavailable("process crashed".to_string()));
        }
        self.budget.store(remaining - 1, Ordering::SeqCst);
        self.inner.save(record)
    }

    fn list(&self) -> Result<Vec<TxId>, CheckpointError> {
        self.inner.list()
    }

    fn delete(&self, tx: TxId) -> Result<(), CheckpointError> {
        self.inner.delete(tx)
    }
}

/// Store whose next `load` of one transaction blocks until released.
pub struct GatedStore<S> {
    pub inner: Arc<dyn CheckpointStore<S>>,
    gate: Mutex<Option<(TxId, mpsc::Sender<()>, mpsc::Receiver<()>)>>,
}

impl<S> GatedStore<S> {
    pub fn new(inner: Arc<dyn CheckpointStore<S>>) -> Self {
        Self {
            inner,
            gate: Mutex::new(None),
        }
    }

    /// Arms the gate for `tx`. The returned receiver fires when a load has
    /// entered the gate; the sender lets it through.
    pub fn close(&self, tx: TxId) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *self.gate.lock() = Some((tx, entered_tx, release_rx));
        (entered_rx, release_tx)
    }
}

impl<S: Send + Sync> CheckpointStore<S> for GatedStore<S> {
    fn create(&self) -> Result<TxId, CheckpointError> {
        self.inner.create()
    }

    fn load(&self, tx: TxId) -> Result<TxRecord<S>, CheckpointError> {
        let gate = {
            let mut gate = self.gate.lock();
            if gate.as_ref().is_some_and(|(gated, ..)| *gated == tx) {
                gate.take()
            } else {
                None
            }
        };
        if let Some((_, entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.recv();
        }
        self.inner.load(tx)
    }

    fn save(&self, record: &TxRecord<S>) -> Result<(), CheckpointError> {
        self.inner.save(record)
    }

    fn list(&self) -> Result<Vec<TxId>, CheckpointError> {
        self.inner.list()
    }

    fn delete(&self, tx: TxId) -> Result<(), CheckpointError> {
        self.inner.delete(tx)
    }
}
