// Local ONNX text classifiers for subjectivity and sentiment.
//
// Both models are two-class sequence classifiers exported to ONNX:
//   subjectivity: GroNLP/mdebertav3-subjectivity-multilingual (0 = fact, 1 = opinion)
//   sentiment:    distilbert-base-uncased-finetuned-sst-2-english (0 = negative, 1 = positive)
//
// Inference runs on the calling worker's thread. Each worker owns its own
// session and tokenizer, so there is no locking here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::debug;

use super::download;
use super::traits::{
    ClassificationResult, LoadedModel, ModelKind, ModelLoader, ModelPair, TextClassifier,
};
use crate::chunker::Chunker;
use crate::config::ChunkingMode;

/// Hard cap on model input length, in tokens (both models are 512-position).
const MAX_MODEL_TOKENS: usize = 512;

/// ONNX-backed two-class text classifier.
pub struct OnnxClassifier {
    kind: ModelKind,
    session: Session,
    /// Truncating tokenizer for model input.
    tokenizer: Tokenizer,
    pad_id: i64,
}

impl OnnxClassifier {
    /// Load a model from `model_dir`, returning the classifier and an
    /// untruncated copy of its tokenizer for chunking.
    ///
    /// Expects `model.onnx` and `tokenizer.json` in `model_dir`.
    pub fn load(kind: ModelKind, model_dir: &Path) -> Result<(Self, Tokenizer)> {
        let model_path = model_dir.join(download::MODEL_FILE);
        let tokenizer_path = model_dir.join(download::TOKENIZER_FILE);

        if !model_path.exists() {
            anyhow::bail!(
                "{kind} model file not found: {}\nRun `slant download-models` to download it.",
                model_path.display()
            );
        }
        if !tokenizer_path.exists() {
            anyhow::bail!(
                "{kind} tokenizer file not found: {}\nRun `slant download-models` to download it.",
                tokenizer_path.display()
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))?;

        let mut chunking_tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load {kind} tokenizer: {}", e))?;
        chunking_tokenizer.with_padding(None);
        chunking_tokenizer
            .with_truncation(None)
            .map_err(|e| anyhow::anyhow!("Failed to configure {kind} tokenizer: {}", e))?;

        let mut tokenizer = chunking_tokenizer.clone();
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_MODEL_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure {kind} tokenizer: {}", e))?;

        // Both BERT-family vocabularies pad with id 0 unless the tokenizer says otherwise
        let pad_id = tokenizer
            .get_padding()
            .map(|p| p.pad_id as i64)
            .or_else(|| tokenizer.token_to_id("[PAD]").map(i64::from))
            .unwrap_or(0);

        debug!(model = %kind, dir = %model_dir.display(), "Loaded ONNX classifier");

        Ok((
            Self {
                kind,
                session,
                tokenizer,
                pad_id,
            },
            chunking_tokenizer,
        ))
    }
}

impl TextClassifier for OnnxClassifier {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    /// Tokenize the batch, right-pad to the longest sequence, run one forward
    /// pass and softmax the two logits per row.
    fn classify_batch(&mut self, texts: &[String]) -> Result<Vec<ClassificationResult>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings: Vec<_> = texts
            .iter()
            .map(|t| {
                self.tokenizer
                    .encode(t.as_str(), true)
                    .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))
            })
            .collect::<Result<Vec<_>>>()?;

        let batch_size = encodings.len();
        let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        if max_len == 0 {
            anyhow::bail!("{} batch tokenized to empty sequences", self.kind);
        }

        // Shape: [batch_size, max_len]
        let mut input_ids_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);
        let mut attention_mask_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);

        for enc in &encodings {
            let ids = enc.get_ids();
            let mask = enc.get_attention_mask();
            let pad_len = max_len - ids.len();

            input_ids_flat.extend(ids.iter().map(|&id| id as i64));
            attention_mask_flat.extend(mask.iter().map(|&m| m as i64));
            input_ids_flat.extend(std::iter::repeat_n(self.pad_id, pad_len));
            attention_mask_flat.extend(std::iter::repeat_n(0i64, pad_len));
        }

        let shape = [batch_size as i64, max_len as i64];

        let input_ids_tensor = Tensor::from_array((shape, input_ids_flat))
            .context("Failed to create input_ids tensor")?;
        let attention_mask_tensor = Tensor::from_array((shape, attention_mask_flat))
            .context("Failed to create attention_mask tensor")?;

        let outputs = self
            .session
            .run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor
            })
            .with_context(|| format!("{} inference failed", self.kind))?;

        // Output shape: [batch_size, 2] raw logits
        let (_out_shape, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract output tensor")?;

        if logits.len() != batch_size * 2 {
            anyhow::bail!(
                "{} model returned {} logits for a batch of {}",
                self.kind,
                logits.len(),
                batch_size
            );
        }

        let labels = self.kind.labels();
        let results: Vec<ClassificationResult> = logits
            .chunks(2)
            .map(|row| {
                let (class, confidence) = softmax_argmax(row[0] as f64, row[1] as f64);
                ClassificationResult {
                    label: labels[class],
                    confidence,
                }
            })
            .collect();

        debug!(model = %self.kind, batch_size, "ONNX classified batch");

        Ok(results)
    }
}

/// Two-class softmax; returns the winning class index and its probability.
/// Ties go to class 0.
fn softmax_argmax(logit0: f64, logit1: f64) -> (usize, f64) {
    let max = logit0.max(logit1);
    let e0 = (logit0 - max).exp();
    let e1 = (logit1 - max).exp();
    let sum = e0 + e1;
    if e1 > e0 {
        (1, e1 / sum)
    } else {
        (0, e0 / sum)
    }
}

/// Loads both ONNX models from `<model_dir>/<kind>/`.
pub struct OnnxModelLoader {
    model_dir: PathBuf,
    chunking: ChunkingMode,
}

impl OnnxModelLoader {
    pub fn new(model_dir: PathBuf, chunking: ChunkingMode) -> Self {
        Self { model_dir, chunking }
    }

    fn load_one(&self, kind: ModelKind) -> Result<LoadedModel> {
        let dir = download::model_subdir(&self.model_dir, kind);
        let (classifier, tokenizer) = OnnxClassifier::load(kind, &dir)?;
        let chunker = match self.chunking {
            ChunkingMode::Tokens => Chunker::Tokens(Arc::new(tokenizer)),
            ChunkingMode::Words => Chunker::Words,
        };
        Ok(LoadedModel {
            classifier: Box::new(classifier),
            chunker,
        })
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self) -> Result<ModelPair> {
        Ok(ModelPair {
            subjectivity: self.load_one(ModelKind::Subjectivity)?,
            sentiment: self.load_one(ModelKind::Sentiment)?,
        })
    }
}
