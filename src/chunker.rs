// Document chunking: split article text into bounded windows for the models.
//
// Both strategies return contiguous slices of the input, so the text inside a
// chunk keeps its original separators and chunk boundaries only ever fall on
// whitespace (words) or token boundaries (tokenizer). Chunking is a pure
// function of (text, max_size, tokenizer): the same document always produces
// the same chunks, which keeps the per-document median reproducible.

use std::sync::Arc;

use anyhow::Result;
use tokenizers::Tokenizer;

/// How a model's input text gets split.
#[derive(Clone)]
pub enum Chunker {
    /// Windows of whitespace-delimited words. Used when no tokenizer is
    /// available or when explicitly configured.
    Words,
    /// Windows of the model's own sub-word tokens, which bounds the true
    /// model input length.
    Tokens(Arc<Tokenizer>),
}

impl Chunker {
    /// Split `text` into windows of at most `max_size` units.
    pub fn chunk(&self, text: &str, max_size: usize) -> Result<Vec<String>> {
        match self {
            Chunker::Words => Ok(chunk_words(text, max_size)),
            Chunker::Tokens(tokenizer) => chunk_tokens(tokenizer, text, max_size),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Chunker::Words => "words",
            Chunker::Tokens(_) => "tokens",
        }
    }
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Chunker::{}", self.name())
    }
}

/// Split on whitespace into consecutive windows of at most `max_size` words.
///
/// Empty (or whitespace-only) input yields no chunks. A `max_size` of zero is
/// treated as one, so every chunk holds at least one word.
pub fn chunk_words(text: &str, max_size: usize) -> Vec<String> {
    let spans = word_spans(text);
    windows_to_slices(text, &spans, max_size)
}

/// Split into windows of at most `max_size` tokenizer tokens.
///
/// The text is encoded without special tokens and without truncation; each
/// window is the source slice from its first token's start offset to its last
/// token's end offset.
pub fn chunk_tokens(tokenizer: &Tokenizer, text: &str, max_size: usize) -> Result<Vec<String>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let encoding = tokenizer
        .encode(text, false)
        .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

    token_slices(text, encoding.get_offsets(), max_size)
}

/// Group token byte offsets into windows of at most `max_size` and slice
/// `text` accordingly.
fn token_slices(text: &str, offsets: &[(usize, usize)], max_size: usize) -> Result<Vec<String>> {
    // Zero-width spans come from tokens with no source text (e.g. a bare
    // word-start marker); they can't anchor a slice.
    let spans: Vec<(usize, usize)> = offsets
        .iter()
        .copied()
        .filter(|(start, end)| end > start)
        .collect();

    if spans.iter().any(|&(start, end)| text.get(start..end).is_none()) {
        anyhow::bail!("Tokenizer offsets do not fall on character boundaries");
    }

    Ok(windows_to_slices(text, &spans, max_size))
}

/// Byte spans of each whitespace-delimited word in `text`.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }

    spans
}

fn windows_to_slices(text: &str, spans: &[(usize, usize)], max_size: usize) -> Vec<String> {
    spans
        .chunks(max_size.max(1))
        .filter_map(|window| {
            let (start, _) = window.first()?;
            let (_, end) = window.last()?;
            let slice = text[*start..*end].trim();
            (!slice.is_empty()).then(|| slice.to_string())
        })
        .collect()
}
