// Analysis pipeline: article directory in, CSV rows out.
//
// The pool does the scoring on its own threads; this side only drains the
// completion stream and appends rows. The writer is owned here and nowhere
// else, so each row is written by exactly one caller in the order results
// complete.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

use crate::article::list_article_files;
use crate::classifier::traits::ModelLoader;
use crate::output::writer::ResultWriter;
use crate::pool::{PoolOptions, ResultStream, ShutdownHandle, WorkerPool};
use crate::processor::Outcome;

/// What happened during one `analyse` run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Article files found in the input directory
    pub documents: usize,
    /// Rows appended to the output file
    pub scored: usize,
    /// Skipped documents, keyed by `SkipReason::kind`
    pub skipped: BTreeMap<&'static str, usize>,
    /// Skips that indicate a problem (everything except empty text)
    pub failures: Vec<(PathBuf, String)>,
    pub elapsed: Duration,
    pub output: PathBuf,
    /// Whether the run was interrupted before every document was processed
    pub cancelled: bool,
}

impl RunSummary {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    /// Documents accounted for per second of wall time.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.scored + self.skipped_total()) as f64 / secs
        } else {
            0.0
        }
    }

    fn record(&mut self, outcome: &Outcome) {
        if let Outcome::Skipped { source, reason } = outcome {
            *self.skipped.entry(reason.kind()).or_insert(0) += 1;
            if reason.is_failure() {
                self.failures.push((source.clone(), reason.to_string()));
            }
        }
    }
}

/// Score every article file in `input_dir`, appending one row per scored
/// article to `output_file`.
///
/// Ctrl-C stops the run gracefully: documents already being processed
/// finish and are written, the rest are reported as cancelled. A second
/// Ctrl-C exits immediately; rows already written are on disk.
pub async fn analyse_dir(
    input_dir: &Path,
    output_file: &Path,
    loader: Arc<dyn ModelLoader>,
    options: PoolOptions,
) -> Result<RunSummary> {
    let pool = WorkerPool::new(loader, options)?;
    let shutdown = pool.shutdown_handle();

    let listener = tokio::spawn(handle_interrupts(tokio::signal::ctrl_c, shutdown, || {
        std::process::exit(130)
    }));

    let result = analyse_with(&pool, input_dir, output_file).await;
    listener.abort();
    result
}

/// Trigger `shutdown` on the first interrupt and call `abort` on the second.
async fn handle_interrupts<F, Fut>(mut interrupt: F, shutdown: ShutdownHandle, abort: impl FnOnce())
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return;
    }
    warn!("Interrupt received, finishing in-flight documents (Ctrl-C again to abort)");
    shutdown.trigger();

    if interrupt().await.is_ok() {
        error!("Second interrupt received, aborting");
        abort();
    }
}

/// Like `analyse_dir`, but on a caller-built pool. Use the pool's
/// `shutdown_handle` to stop the run early.
pub async fn analyse_with(
    pool: &WorkerPool,
    input_dir: &Path,
    output_file: &Path,
) -> Result<RunSummary> {
    let started = Instant::now();

    let documents = list_article_files(input_dir)
        .with_context(|| format!("Failed to list articles in {}", input_dir.display()))?;
    let mut writer = ResultWriter::open(output_file)?;

    info!(
        input = %input_dir.display(),
        output = %output_file.display(),
        documents = documents.len(),
        "Starting analysis"
    );

    let mut summary = RunSummary {
        documents: documents.len(),
        output: output_file.to_path_buf(),
        ..Default::default()
    };

    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  Analysing [{bar:30}] {pos}/{len} ({eta})")
            .expect("valid template"),
    );

    let results = pool.run(documents);
    let drained = drain(results, &mut writer, &mut summary, &pb).await;
    pb.finish_and_clear();
    drained?;

    summary.cancelled = pool.shutdown_handle().is_triggered();
    summary.elapsed = started.elapsed();

    info!(
        scored = summary.scored,
        skipped = summary.skipped_total(),
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Analysis complete"
    );
    Ok(summary)
}

/// Drain the completion stream into the writer. A write failure stops the
/// run immediately: a completed row that can't be persisted is fatal.
async fn drain(
    mut results: ResultStream,
    writer: &mut ResultWriter,
    summary: &mut RunSummary,
    pb: &ProgressBar,
) -> Result<()> {
    while let Some(outcome) = results.next().await {
        pb.inc(1);
        summary.record(&outcome);

        match outcome {
            Outcome::Scored(row) => {
                writer.append(&row)?;
                summary.scored += 1;
                debug!(url = %row.url, subjectivity = row.subjectivity, sentiment = row.sentiment, "Row written");
            }
            Outcome::Skipped { source, reason } => {
                if reason.is_failure() {
                    warn!(path = %source.display(), reason = %reason, "Skipped document");
                } else {
                    debug!(path = %source.display(), reason = %reason, "Skipped document");
                }
            }
        }
    }
    Ok(())
}
