// Worker thread: pulls documents off the shared queue and processes them
// with its own models until the queue drains or the pool shuts down.
//
// Workers are dedicated OS threads, not async tasks: inference is CPU-bound
// and blocks for the whole batch. Results go back to the pool over a bounded
// channel, which also throttles workers if the consumer falls behind.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::state::WorkerModelState;
use crate::classifier::traits::ModelLoader;
use crate::processor::{self, Outcome, ProcessOptions, SkipReason};

/// Why a worker stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    /// No documents left.
    Drained,
    /// The pool's shutdown flag was set.
    Cancelled,
    /// Model initialization failed; this slot can't do useful work. Carries
    /// the load error.
    LoadFailed(String),
    /// Processing panicked; the model state may be inconsistent.
    Panicked,
    /// Nobody is consuming results any more.
    Disconnected,
}

/// Messages from workers to the pool. Each worker sends zero or more `Done`
/// messages followed by exactly one `Exited`.
#[derive(Debug)]
pub(crate) enum WorkerMessage {
    Done(Outcome),
    Exited { worker: usize, exit: WorkerExit },
}

/// Documents waiting for a worker. All documents are queued before the first
/// worker starts; after that the queue only grows when a worker hands back a
/// document it could not process.
#[derive(Clone)]
pub(crate) struct JobQueue {
    pending: Arc<Mutex<VecDeque<PathBuf>>>,
}

impl JobQueue {
    pub(crate) fn new(documents: Vec<PathBuf>) -> Self {
        Self {
            pending: Arc::new(Mutex::new(documents.into())),
        }
    }

    pub(crate) fn next(&self) -> Option<PathBuf> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Put a document back at the front, for another worker to take.
    pub(crate) fn requeue(&self, document: PathBuf) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_front(document);
    }

    /// Take everything still queued.
    pub(crate) fn drain(&self) -> Vec<PathBuf> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}

/// Everything a worker thread needs, cloned per worker.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) loader: Arc<dyn ModelLoader>,
    pub(crate) jobs: JobQueue,
    pub(crate) results: mpsc::Sender<WorkerMessage>,
    pub(crate) shutdown: Arc<AtomicBool>,
    pub(crate) options: ProcessOptions,
}

impl WorkerContext {
    /// Start worker `id` on its own named thread.
    pub(crate) fn spawn(&self, id: usize) -> std::io::Result<()> {
        let ctx = self.clone();
        std::thread::Builder::new()
            .name(format!("slant-worker-{id}"))
            .spawn(move || run(id, ctx))
            .map(|_| ())
    }
}

fn run(id: usize, ctx: WorkerContext) {
    let mut state = WorkerModelState::new(id);
    debug!(worker = id, "Worker started");

    let exit = loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            break WorkerExit::Cancelled;
        }

        let Some(path) = ctx.jobs.next() else {
            break WorkerExit::Drained;
        };

        // Lazy one-time initialization, on the first document this worker gets.
        // On failure the document goes back for a healthy worker; if none is
        // left, the pool reports it along with the rest of the queue.
        if let Err(e) = state.ensure_loaded(ctx.loader.as_ref()) {
            let error = format!("{:#}", e);
            error!(worker = id, error = %error, path = %path.display(), "Model load failed, retiring worker");
            ctx.jobs.requeue(path);
            break WorkerExit::LoadFailed(error);
        }

        state.begin_document();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            processor::process_file(&path, &mut state, &ctx.options)
        }));
        state.end_document();

        let (outcome, panicked) = match result {
            Ok(outcome) => (outcome, false),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    worker = id,
                    path = %path.display(),
                    panic = %message,
                    "Worker panicked while processing document"
                );
                (
                    Outcome::skipped(&path, SkipReason::WorkerPanicked(message)),
                    true,
                )
            }
        };

        if ctx.results.blocking_send(WorkerMessage::Done(outcome)).is_err() {
            warn!(worker = id, "Result consumer went away, stopping");
            break WorkerExit::Disconnected;
        }
        if panicked {
            break WorkerExit::Panicked;
        }
    };

    state.terminate();
    debug!(worker = id, exit = ?exit, "Worker exiting");
    let _ = ctx
        .results
        .blocking_send(WorkerMessage::Exited { worker: id, exit });
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
