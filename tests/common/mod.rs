// Shared fakes for integration tests: deterministic classifiers and a
// loader that counts how often it's asked for models. No model files needed.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use slant::article::ArticleRecord;
use slant::chunker::Chunker;
use slant::classifier::traits::{
    ClassificationResult, Label, LoadedModel, ModelKind, ModelLoader, ModelPair, TextClassifier,
};

/// Text markers the fake classifier reacts to.
pub const PANIC_MARKER: &str = "PANIC";
pub const FAIL_MARKER: &str = "FAIL";
pub const SLOW_MARKER: &str = "SLOW";

/// Returns the same label and confidence for every chunk.
///
/// Panics on chunks containing `PANIC`, errors on `FAIL`, and sleeps for
/// `slow_delay` on `SLOW` (or on every batch if `delay_every_batch`).
pub struct FixedClassifier {
    kind: ModelKind,
    result: ClassificationResult,
    calls: Arc<AtomicUsize>,
    slow_delay: Duration,
    delay_every_batch: bool,
}

impl TextClassifier for FixedClassifier {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn classify_batch(&mut self, texts: &[String]) -> Result<Vec<ClassificationResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if texts.iter().any(|t| t.contains(PANIC_MARKER)) {
            panic!("fake classifier asked to panic");
        }
        if texts.iter().any(|t| t.contains(FAIL_MARKER)) {
            anyhow::bail!("fake inference failure");
        }
        if self.delay_every_batch || texts.iter().any(|t| t.contains(SLOW_MARKER)) {
            std::thread::sleep(self.slow_delay);
        }
        Ok(vec![self.result; texts.len()])
    }
}

/// Hands out `FixedClassifier` pairs and counts loads and classifier calls.
pub struct FakeLoader {
    pub subjectivity: ClassificationResult,
    pub sentiment: ClassificationResult,
    pub loads: AtomicUsize,
    /// Total `classify_batch` calls across every model this loader built.
    pub calls: Arc<AtomicUsize>,
    /// Loads with an index below this fail.
    pub failing_loads: usize,
    pub slow_delay: Duration,
    pub delay_every_batch: bool,
}

impl FakeLoader {
    pub fn new(subjectivity: (Label, f64), sentiment: (Label, f64)) -> Self {
        Self {
            subjectivity: ClassificationResult {
                label: subjectivity.0,
                confidence: subjectivity.1,
            },
            sentiment: ClassificationResult {
                label: sentiment.0,
                confidence: sentiment.1,
            },
            loads: AtomicUsize::new(0),
            calls: Arc::new(AtomicUsize::new(0)),
            failing_loads: 0,
            slow_delay: Duration::from_millis(300),
            delay_every_batch: false,
        }
    }

    /// Opinionated (0.8) and positive (0.7) for everything.
    pub fn standard() -> Self {
        Self::new((Label::Opinion, 0.8), (Label::Positive, 0.7))
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn model(&self, kind: ModelKind, result: ClassificationResult) -> LoadedModel {
        LoadedModel {
            classifier: Box::new(FixedClassifier {
                kind,
                result,
                calls: Arc::clone(&self.calls),
                slow_delay: self.slow_delay,
                delay_every_batch: self.delay_every_batch,
            }),
            chunker: Chunker::Words,
        }
    }
}

impl ModelLoader for FakeLoader {
    fn load(&self) -> Result<ModelPair> {
        let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failing_loads {
            anyhow::bail!("fake model load failure #{attempt}");
        }
        Ok(ModelPair {
            subjectivity: self.model(ModelKind::Subjectivity, self.subjectivity),
            sentiment: self.model(ModelKind::Sentiment, self.sentiment),
        })
    }
}

pub fn article(url: &str, text: &str) -> ArticleRecord {
    ArticleRecord {
        url: url.to_string(),
        media_name: "Example News".to_string(),
        publish_date: "2024-01-01".to_string(),
        title: format!("Story at {url}"),
        tags: vec!["politics".to_string()],
        text: text.to_string(),
    }
}

/// Write `articles` as `0.json`, `1.json`, ... into `dir`.
pub fn write_articles(dir: &Path, articles: &[ArticleRecord]) -> Vec<PathBuf> {
    std::fs::create_dir_all(dir).unwrap();
    articles
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let path = dir.join(format!("{i}.json"));
            std::fs::write(&path, serde_json::to_string_pretty(a).unwrap()).unwrap();
            path
        })
        .collect()
}

/// Read every row of a headerless output CSV.
pub fn read_output(path: &Path) -> Vec<csv::StringRecord> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap()
        .records()
        .map(|r| r.unwrap())
        .collect()
}
