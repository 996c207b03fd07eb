// Score mapping and document-level aggregation.
//
// Each chunk's (label, confidence) becomes a signed scalar in [-1, 1]; a
// document's score on each axis is the median of those scalars. The median
// keeps one misclassified chunk from dragging a long article's score.

use crate::classifier::traits::ClassificationResult;

/// Document-level scores, each in [-1, 1].
///
/// Subjectivity: +1 is pure opinion, -1 pure fact.
/// Sentiment: +1 is positive, -1 negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocumentScore {
    pub subjectivity: f64,
    pub sentiment: f64,
}

/// `sign(label) * confidence`.
pub fn signed_score(result: &ClassificationResult) -> f64 {
    result.label.sign() * result.confidence
}

/// Median of a sequence; the mean of the two middle values for even lengths.
///
/// Returns `None` for an empty slice. NaNs sort last under `total_cmp`.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Reduce one model's chunk results to a document score.
///
/// The processor never calls this with an empty slice (empty chunk lists are
/// skipped upstream); `None` marks that contract violation rather than
/// inventing a neutral zero.
pub fn aggregate(results: &[ClassificationResult]) -> Option<f64> {
    let signed: Vec<f64> = results.iter().map(signed_score).collect();
    median(&signed).map(|m| m.clamp(-1.0, 1.0))
}
