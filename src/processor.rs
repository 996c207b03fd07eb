// Document processor: the per-article unit of work run inside a worker.
//
// Given an article file and the worker's model state, this module:
// 1. Reads and validates the record
// 2. Skips it if there's no text
// 3. Chunks the text separately for each model
// 4. Classifies the chunks in batches
// 5. Reduces both chunk-score sequences to a DocumentScore
// 6. Returns the finished output row
//
// Every failure along the way becomes a Skip with a reason. Nothing here
// returns an error to the worker loop, so one bad article never costs the
// pool a worker.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::article::{self, ArticleRecord};
use crate::classifier::traits::{self, DeadlineExceeded, LoadedModel};
use crate::output::truncate_chars;
use crate::pool::state::WorkerModelState;
use crate::scoring::{self, DocumentScore};

/// Knobs for per-document processing.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Maximum chunk size, in tokens or words depending on the chunker.
    pub max_chunk_size: usize,
    /// Chunks per inference call.
    pub batch_size: usize,
    /// Optional wall-clock budget per document, checked between batches.
    pub timeout: Option<Duration>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            max_chunk_size: 200,
            batch_size: 8,
            timeout: None,
        }
    }
}

/// One scored article, in output column order.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    pub url: String,
    pub media_name: String,
    pub publish_date: String,
    pub tags: Vec<String>,
    pub title: String,
    pub subjectivity: f64,
    pub sentiment: f64,
}

impl OutputRow {
    pub fn new(article: ArticleRecord, score: DocumentScore) -> Self {
        Self {
            url: article.url,
            media_name: article.media_name,
            publish_date: article.publish_date,
            tags: article.tags,
            title: article.title,
            subjectivity: score.subjectivity,
            sentiment: score.sentiment,
        }
    }

    /// The row as CSV fields. Tags are encoded as a JSON array so the column
    /// stays a single field.
    pub fn to_record(&self) -> [String; 7] {
        let tags = serde_json::to_string(&self.tags).unwrap_or_else(|_| "[]".to_string());
        [
            self.url.clone(),
            self.media_name.clone(),
            self.publish_date.clone(),
            tags,
            self.title.clone(),
            self.subjectivity.to_string(),
            self.sentiment.to_string(),
        ]
    }
}

/// Why a document produced no row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The file couldn't be read or parsed.
    Unreadable(String),
    /// No text to score (expected for failed retrievals).
    EmptyText,
    /// Chunking or inference failed.
    Inference(String),
    /// The worker had no models loaded.
    ModelUnavailable(String),
    /// The per-document timeout expired.
    Timeout,
    /// The worker panicked while processing this document.
    WorkerPanicked(String),
    /// Every worker terminated before this document was picked up.
    WorkerLost,
    /// The run was cancelled before this document was picked up.
    Cancelled,
}

impl SkipReason {
    /// Short stable name, used for summaries and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::Unreadable(_) => "unreadable",
            SkipReason::EmptyText => "empty-text",
            SkipReason::Inference(_) => "inference-error",
            SkipReason::ModelUnavailable(_) => "model-unavailable",
            SkipReason::Timeout => "timeout",
            SkipReason::WorkerPanicked(_) => "worker-panicked",
            SkipReason::WorkerLost => "worker-lost",
            SkipReason::Cancelled => "cancelled",
        }
    }

    /// Whether this skip is a failure worth reporting, as opposed to
    /// ordinary data sparsity.
    pub fn is_failure(&self) -> bool {
        !matches!(self, SkipReason::EmptyText)
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Unreadable(detail)
            | SkipReason::Inference(detail)
            | SkipReason::ModelUnavailable(detail)
            | SkipReason::WorkerPanicked(detail) => write!(f, "{}: {}", self.kind(), detail),
            _ => write!(f, "{}", self.kind()),
        }
    }
}

/// Result of processing one document: a row, or a skip.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Scored(OutputRow),
    Skipped { source: PathBuf, reason: SkipReason },
}

impl Outcome {
    pub fn skipped(source: &Path, reason: SkipReason) -> Self {
        Outcome::Skipped {
            source: source.to_path_buf(),
            reason,
        }
    }
}

/// Read one article file and score it.
pub fn process_file(path: &Path, state: &mut WorkerModelState, options: &ProcessOptions) -> Outcome {
    let article = match article::read_article(path) {
        Ok(article) => article,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable article, skipping");
            return Outcome::skipped(path, SkipReason::Unreadable(e.to_string()));
        }
    };

    process_article(path, article, state, options)
}

/// Score an already-parsed article. `source` identifies it in skip reports.
pub fn process_article(
    source: &Path,
    article: ArticleRecord,
    state: &mut WorkerModelState,
    options: &ProcessOptions,
) -> Outcome {
    if !article.has_text() {
        debug!(url = %article.url, "No text, skipping");
        return Outcome::skipped(source, SkipReason::EmptyText);
    }

    let worker = state.worker_id();
    let Some(models) = state.models_mut() else {
        warn!(
            worker,
            url = %article.url,
            "Worker models not initialized, skipping"
        );
        return Outcome::skipped(
            source,
            SkipReason::ModelUnavailable("worker models not initialized".to_string()),
        );
    };

    info!(
        worker,
        title = %truncate_chars(&article.title, 60),
        "Processing article"
    );

    // A timeout too large to land on the clock is no deadline at all
    let deadline = options.timeout.and_then(|t| Instant::now().checked_add(t));

    let subjectivity = match score_with(&mut models.subjectivity, &article.text, options, deadline) {
        Ok(Some(score)) => score,
        Ok(None) => return no_signal(source, &article),
        Err(reason) => return failed(source, &article, reason),
    };
    let sentiment = match score_with(&mut models.sentiment, &article.text, options, deadline) {
        Ok(Some(score)) => score,
        Ok(None) => return no_signal(source, &article),
        Err(reason) => return failed(source, &article, reason),
    };

    debug!(url = %article.url, subjectivity, sentiment, "Scored article");

    Outcome::Scored(OutputRow::new(
        article,
        DocumentScore {
            subjectivity,
            sentiment,
        },
    ))
}

/// Chunk, classify and aggregate `text` with one model.
///
/// `Ok(None)` means the chunker produced nothing, i.e. no signal.
fn score_with(
    model: &mut LoadedModel,
    text: &str,
    options: &ProcessOptions,
    deadline: Option<Instant>,
) -> Result<Option<f64>, SkipReason> {
    let chunks = model
        .chunker
        .chunk(text, options.max_chunk_size)
        .map_err(|e| SkipReason::Inference(format!("{:#}", e)))?;

    if chunks.is_empty() {
        return Ok(None);
    }

    let results = traits::classify(
        &chunks,
        model.classifier.as_mut(),
        options.batch_size,
        deadline,
    )
    .map_err(|e| {
        if e.downcast_ref::<DeadlineExceeded>().is_some() {
            SkipReason::Timeout
        } else {
            SkipReason::Inference(format!("{:#}", e))
        }
    })?;

    Ok(scoring::aggregate(&results))
}

fn no_signal(source: &Path, article: &ArticleRecord) -> Outcome {
    debug!(url = %article.url, "Text produced no chunks, skipping");
    Outcome::skipped(source, SkipReason::EmptyText)
}

fn failed(source: &Path, article: &ArticleRecord, reason: SkipReason) -> Outcome {
    warn!(
        path = %source.display(),
        url = %article.url,
        reason = %reason,
        "Failed to score article, skipping"
    );
    Outcome::skipped(source, reason)
}
