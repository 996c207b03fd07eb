use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::pool::PoolOptions;
use crate::processor::ProcessOptions;

/// Default MediaCloud API root.
pub const DEFAULT_MEDIACLOUD_API_URL: &str = "https://search.mediacloud.org/api";

/// How article text is split into chunks before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkingMode {
    /// Windows of model tokens (default). Chunks line up with what the
    /// model actually sees.
    Tokens,
    /// Windows of whitespace-delimited words. No tokenizer needed.
    Words,
}

impl FromStr for ChunkingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tokens" | "token" => Ok(Self::Tokens),
            "words" | "word" => Ok(Self::Words),
            other => anyhow::bail!("Unknown chunking mode '{other}' (expected 'tokens' or 'words')"),
        }
    }
}

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded at startup via dotenvy, so anything here can be
/// set there instead of in the shell. CLI flags override the numeric knobs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Parallel workers, each with its own copy of both models
    pub worker_count: usize,
    /// Maximum chunk length, in tokens or words depending on `chunking`
    pub max_chunk_size: usize,
    /// Chunks per inference call
    pub batch_size: usize,
    pub document_timeout: Option<Duration>,
    pub chunking: ChunkingMode,
    /// Directory holding `subjectivity/` and `sentiment/` model files
    pub model_dir: PathBuf,
    pub mediacloud_api_key: String,
    pub mediacloud_api_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Everything has a default. Malformed numbers are an error rather than
    /// silently falling back, so a typo in .env doesn't go unnoticed.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let number = |key: &str, default: usize| -> Result<usize> {
            match lookup(key) {
                Some(raw) if !raw.trim().is_empty() => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{key} must be a non-negative integer, got '{raw}'")),
                _ => Ok(default),
            }
        };

        let document_timeout = match lookup("SLANT_DOC_TIMEOUT_SECS") {
            Some(raw) if !raw.trim().is_empty() => {
                let secs: f64 = raw.trim().parse().with_context(|| {
                    format!("SLANT_DOC_TIMEOUT_SECS must be a number of seconds, got '{raw}'")
                })?;
                timeout_from_secs(secs)?
            }
            _ => None,
        };

        let chunking = match lookup("SLANT_CHUNKING") {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => ChunkingMode::Tokens,
        };

        let model_dir = lookup("SLANT_MODEL_DIR")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(crate::classifier::download::default_model_dir);

        Ok(Self {
            worker_count: number("SLANT_WORKERS", 4)?,
            max_chunk_size: number("SLANT_MAX_CHUNK", 200)?,
            batch_size: number("SLANT_BATCH_SIZE", 8)?,
            document_timeout,
            chunking,
            model_dir,
            mediacloud_api_key: lookup("MEDIACLOUD_API_KEY").unwrap_or_default(),
            mediacloud_api_url: lookup("MEDIACLOUD_API_URL")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_MEDIACLOUD_API_URL.to_string()),
        })
    }

    /// Reject settings the pipeline can't run with.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            anyhow::bail!("Worker count must be at least 1 (SLANT_WORKERS / --workers)");
        }
        if self.max_chunk_size == 0 {
            anyhow::bail!("Maximum chunk size must be at least 1 (SLANT_MAX_CHUNK / --max-chunk)");
        }
        if self.batch_size == 0 {
            anyhow::bail!("Batch size must be at least 1 (SLANT_BATCH_SIZE / --batch-size)");
        }
        Ok(())
    }

    /// Check that both models have been downloaded.
    pub fn require_models(&self) -> Result<()> {
        if !crate::classifier::download::all_models_present(&self.model_dir) {
            anyhow::bail!(
                "Model files not found in {}\n\
                 Run `slant download-models` to download them,\n\
                 or set SLANT_MODEL_DIR to where they already live.",
                self.model_dir.display()
            );
        }
        Ok(())
    }

    /// Check that the MediaCloud API key is configured.
    pub fn require_mediacloud(&self) -> Result<()> {
        if self.mediacloud_api_key.is_empty() {
            anyhow::bail!(
                "MEDIACLOUD_API_KEY not set. Add it to your .env file.\n\
                 Keys are issued from your MediaCloud account page."
            );
        }
        Ok(())
    }

    pub fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            max_chunk_size: self.max_chunk_size,
            batch_size: self.batch_size,
            timeout: self.document_timeout,
        }
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            worker_count: self.worker_count,
            process: self.process_options(),
        }
    }
}

/// Zero disables the timeout; negative, non-finite or unrepresentably large
/// values are rejected.
pub fn timeout_from_secs(secs: f64) -> Result<Option<Duration>> {
    if !secs.is_finite() || secs < 0.0 {
        anyhow::bail!("Timeout must be a non-negative number of seconds, got {secs}");
    }
    if secs == 0.0 {
        return Ok(None);
    }
    let timeout = Duration::try_from_secs_f64(secs)
        .map_err(|e| anyhow::anyhow!("Timeout of {secs} seconds is out of range: {e}"))?;
    Ok(Some(timeout))
}
