// Classifier trait: the seam between the pipeline and the model runtime.
//
// The default implementation runs local ONNX exports of the two HuggingFace
// models. Tests plug in deterministic fakes through the same trait, so the
// worker pool and processor never know which runtime they're driving.

use std::time::Instant;

use anyhow::Result;

use crate::chunker::Chunker;

/// Which of the two models a classifier implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Subjectivity,
    Sentiment,
}

impl ModelKind {
    /// The model's two labels, indexed by output class.
    pub fn labels(&self) -> [Label; 2] {
        match self {
            ModelKind::Subjectivity => [Label::Fact, Label::Opinion],
            ModelKind::Sentiment => [Label::Negative, Label::Positive],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Subjectivity => "subjectivity",
            ModelKind::Sentiment => "sentiment",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A predicted label. Each model only ever produces its own pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Opinion,
    Fact,
    Positive,
    Negative,
}

impl Label {
    /// +1 for the label at the "positive" end of its model's axis, -1 otherwise.
    pub fn sign(&self) -> f64 {
        match self {
            Label::Opinion | Label::Positive => 1.0,
            Label::Fact | Label::Negative => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Opinion => "opinion",
            Label::Fact => "fact",
            Label::Positive => "positive",
            Label::Negative => "negative",
        }
    }
}

/// Output of one classifier call on one chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationResult {
    pub label: Label,
    /// Probability of `label`, 0.0 to 1.0.
    pub confidence: f64,
}

/// A loaded text classification model.
///
/// Implementations are owned by exactly one worker and called from that
/// worker's thread only, so `classify_batch` takes `&mut self` and needs
/// `Send` but not `Sync`.
pub trait TextClassifier: Send {
    fn kind(&self) -> ModelKind;

    /// Classify a batch of texts, returning one result per input in order.
    fn classify_batch(&mut self, texts: &[String]) -> Result<Vec<ClassificationResult>>;
}

/// A classifier plus the chunking strategy that matches its input limits.
pub struct LoadedModel {
    pub classifier: Box<dyn TextClassifier>,
    pub chunker: Chunker,
}

/// Both models a worker needs to score a document.
pub struct ModelPair {
    pub subjectivity: LoadedModel,
    pub sentiment: LoadedModel,
}

/// Builds a fresh `ModelPair`. Called once per worker, on that worker's thread.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<ModelPair>;
}

/// Returned when a document's deadline passes between batches.
#[derive(Debug, thiserror::Error)]
#[error("document deadline exceeded after {completed} of {total} chunks")]
pub struct DeadlineExceeded {
    pub completed: usize,
    pub total: usize,
}

/// Classify `chunks` in batches of `batch_size`, one result per chunk, same order.
///
/// An empty `chunks` slice returns an empty result without touching the model;
/// callers treat that as "no signal". If `deadline` passes between batches the
/// call stops with `DeadlineExceeded`.
pub fn classify(
    chunks: &[String],
    model: &mut dyn TextClassifier,
    batch_size: usize,
    deadline: Option<Instant>,
) -> Result<Vec<ClassificationResult>> {
    let mut results = Vec::with_capacity(chunks.len());

    for batch in chunks.chunks(batch_size.max(1)) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(DeadlineExceeded {
                completed: results.len(),
                total: chunks.len(),
            }
            .into());
        }

        let batch_results = model.classify_batch(batch)?;
        if batch_results.len() != batch.len() {
            anyhow::bail!(
                "{} model returned {} results for a batch of {}",
                model.kind(),
                batch_results.len(),
                batch.len()
            );
        }
        results.extend(batch_results);
    }

    Ok(results)
}
