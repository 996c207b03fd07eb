// Worker pool: fans documents out to a fixed set of worker threads and
// hands results back in completion order.
//
// Each worker lazily loads its own copy of both models, so `worker_count`
// is bounded by how many model copies fit in memory at once. Workers never
// write output; the caller drains the ResultStream and does the writing.
//
// Supervision rules:
// - A worker that panics reports the document it held and exits; the pool
//   starts a replacement (up to `worker_count` replacements per run).
// - A worker whose model load fails puts the document it held back on the
//   queue and exits without replacement; the pool carries on with fewer
//   workers.
// - When the last worker exits, anything still queued is reported so no
//   document vanishes silently: as cancelled after a shutdown, as
//   model-unavailable when model loading is what took the workers down, and
//   as lost otherwise.
//
// Workers are threads in this process. A panic is contained to its worker,
// but a native abort inside ONNX Runtime takes the whole run down with it.

pub mod state;
mod worker;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, Stream};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::classifier::traits::ModelLoader;
use crate::processor::{Outcome, ProcessOptions, SkipReason};
use worker::{JobQueue, WorkerContext, WorkerExit, WorkerMessage};

/// Pool sizing and per-document options.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Number of parallel workers, each holding both models.
    pub worker_count: usize,
    pub process: ProcessOptions,
}

/// Cooperative shutdown flag shared by the pool, its workers and signal handlers.
///
/// Once triggered, workers finish the document in hand and take no more.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A fixed-size pool of model-holding workers.
pub struct WorkerPool {
    loader: Arc<dyn ModelLoader>,
    options: PoolOptions,
    shutdown: ShutdownHandle,
}

impl WorkerPool {
    pub fn new(loader: Arc<dyn ModelLoader>, options: PoolOptions) -> anyhow::Result<Self> {
        if options.worker_count == 0 {
            anyhow::bail!("worker_count must be at least 1");
        }
        Ok(Self {
            loader,
            options,
            shutdown: ShutdownHandle::default(),
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Start processing `documents`. Results arrive on the returned stream in
    /// the order they complete, not the order they were submitted.
    ///
    /// Never spawns more workers than there are documents.
    pub fn run(&self, documents: Vec<PathBuf>) -> ResultStream {
        let total = documents.len();
        let workers = self.options.worker_count.min(total);
        let (tx, rx) = mpsc::channel(workers.max(1) * 2);

        let ctx = WorkerContext {
            loader: Arc::clone(&self.loader),
            jobs: JobQueue::new(documents),
            results: tx,
            shutdown: Arc::clone(&self.shutdown.0),
            options: self.options.process.clone(),
        };

        let mut live = 0;
        for id in 0..workers {
            match ctx.spawn(id) {
                Ok(()) => live += 1,
                Err(e) => error!(worker = id, error = %e, "Failed to spawn worker thread"),
            }
        }

        info!(documents = total, workers = live, "Worker pool started");

        ResultStream {
            rx,
            ctx,
            live,
            next_id: workers,
            respawns_left: self.options.worker_count,
            load_error: None,
            lost_to_panic: false,
            leftovers: Vec::new(),
            shutdown: self.shutdown.clone(),
            finished: false,
        }
    }
}

/// Completed results from a pool run, in completion order.
///
/// Yields exactly one `Outcome` per submitted document, then ends. Dropping
/// the stream early shuts the run down.
pub struct ResultStream {
    rx: mpsc::Receiver<WorkerMessage>,
    ctx: WorkerContext,
    live: usize,
    next_id: usize,
    respawns_left: usize,
    /// Most recent model load error, if any worker retired on one.
    load_error: Option<String>,
    /// Whether a panicked worker went unreplaced.
    lost_to_panic: bool,
    /// Synthesized outcomes for documents no worker will ever pick up.
    leftovers: Vec<Outcome>,
    shutdown: ShutdownHandle,
    finished: bool,
}

impl ResultStream {
    /// Wait for the next completed document. `None` once every document has
    /// been accounted for.
    pub async fn next(&mut self) -> Option<Outcome> {
        loop {
            if let Some(outcome) = self.leftovers.pop() {
                return Some(outcome);
            }
            if self.finished {
                return None;
            }
            if self.live == 0 {
                self.account_for_unprocessed();
                continue;
            }

            match self.rx.recv().await {
                Some(WorkerMessage::Done(outcome)) => return Some(outcome),
                Some(WorkerMessage::Exited { worker, exit }) => {
                    self.live -= 1;
                    self.handle_exit(worker, exit);
                }
                // Unreachable while we hold a sender, but don't hang if it happens
                None => self.live = 0,
            }
        }
    }

    /// Adapt into a `futures::Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> impl Stream<Item = Outcome> {
        stream::unfold(self, |mut results| async move {
            results.next().await.map(|outcome| (outcome, results))
        })
    }

    fn handle_exit(&mut self, worker: usize, exit: WorkerExit) {
        match exit {
            WorkerExit::Drained | WorkerExit::Cancelled | WorkerExit::Disconnected => {
                info!(worker, exit = ?exit, "Worker finished");
            }
            WorkerExit::LoadFailed(load_error) => {
                error!(
                    worker,
                    remaining_workers = self.live,
                    "Worker retired after model load failure, continuing with reduced capacity"
                );
                self.load_error = Some(load_error);
            }
            WorkerExit::Panicked => {
                if self.respawns_left == 0 || self.shutdown.is_triggered() {
                    warn!(worker, "Worker panicked, not replacing");
                    self.lost_to_panic = true;
                    return;
                }
                let id = self.next_id;
                self.next_id += 1;
                match self.ctx.spawn(id) {
                    Ok(()) => {
                        self.respawns_left -= 1;
                        self.live += 1;
                        warn!(worker, replacement = id, "Worker panicked, started replacement");
                    }
                    Err(e) => {
                        error!(worker, error = %e, "Worker panicked and replacement failed to spawn");
                        self.lost_to_panic = true;
                    }
                }
            }
        }
    }

    fn account_for_unprocessed(&mut self) {
        let remaining = self.ctx.jobs.drain();
        if !remaining.is_empty() {
            let reason = if self.shutdown.is_triggered() {
                warn!(count = remaining.len(), "Run cancelled with documents still queued");
                SkipReason::Cancelled
            } else if let (Some(load_error), false) = (&self.load_error, self.lost_to_panic) {
                error!(
                    count = remaining.len(),
                    error = %load_error,
                    "No worker could load models, documents left unprocessed"
                );
                SkipReason::ModelUnavailable(load_error.clone())
            } else {
                error!(
                    count = remaining.len(),
                    "All workers terminated with documents still queued"
                );
                SkipReason::WorkerLost
            };
            self.leftovers = remaining
                .iter()
                .rev()
                .map(|path| Outcome::skipped(path, reason.clone()))
                .collect();
        }
        self.finished = true;
    }
}

impl Drop for ResultStream {
    fn drop(&mut self) {
        if !self.finished {
            self.shutdown.trigger();
        }
    }
}
