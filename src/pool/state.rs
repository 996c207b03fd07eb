// Per-worker model state.
//
// Each worker owns one WorkerModelState for its whole life. The models are
// built lazily on the first document the worker receives and never shared
// with or moved to another worker.

use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info};

use crate::classifier::traits::{ModelLoader, ModelPair};

/// Lifecycle of a worker:
/// `Unstarted -> Initializing -> Ready <-> Processing -> Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Unstarted,
    Initializing,
    Ready,
    Processing,
    Terminated,
}

/// A worker's private copy of both models, plus its lifecycle phase.
pub struct WorkerModelState {
    worker_id: usize,
    phase: WorkerPhase,
    models: Option<ModelPair>,
    /// Set once a load has been attempted; a failed load is not retried.
    load_attempted: bool,
}

impl WorkerModelState {
    pub fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            phase: WorkerPhase::Unstarted,
            models: None,
            load_attempted: false,
        }
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    pub fn is_loaded(&self) -> bool {
        self.models.is_some()
    }

    /// Load the models if this worker hasn't yet.
    ///
    /// The loader runs at most once per state: after a failed attempt every
    /// later call fails fast without touching the loader again.
    pub fn ensure_loaded(&mut self, loader: &dyn ModelLoader) -> Result<()> {
        if self.models.is_some() {
            return Ok(());
        }
        if self.load_attempted {
            anyhow::bail!("model load already failed on worker {}", self.worker_id);
        }

        self.load_attempted = true;
        self.phase = WorkerPhase::Initializing;
        info!(worker = self.worker_id, "Initializing worker, loading models");

        let started = Instant::now();
        match loader.load() {
            Ok(models) => {
                self.models = Some(models);
                self.phase = WorkerPhase::Ready;
                info!(
                    worker = self.worker_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Models loaded"
                );
                Ok(())
            }
            Err(e) => {
                self.phase = WorkerPhase::Terminated;
                Err(e)
            }
        }
    }

    /// The loaded models, or `None` if initialization never happened.
    pub fn models_mut(&mut self) -> Option<&mut ModelPair> {
        self.models.as_mut()
    }

    /// Mark the start of a document. Only valid from `Ready`.
    pub(crate) fn begin_document(&mut self) {
        if self.phase == WorkerPhase::Ready {
            self.phase = WorkerPhase::Processing;
        }
    }

    /// Mark the end of a document.
    pub(crate) fn end_document(&mut self) {
        if self.phase == WorkerPhase::Processing {
            self.phase = WorkerPhase::Ready;
        }
    }

    /// Release the models and enter `Terminated`.
    pub fn terminate(&mut self) {
        self.models = None;
        self.phase = WorkerPhase::Terminated;
        debug!(worker = self.worker_id, "Worker terminated");
    }
}
