// Model download helper for the two ONNX classifiers.
//
// Downloads from HuggingFace:
// 1. GroNLP/mdebertav3-subjectivity-multilingual: subjectivity, fact vs opinion
// 2. distilbert-base-uncased-finetuned-sst-2-english: sentiment, negative vs positive
//
// Each model lives in its own subdirectory of the model dir
// (~/.local/share/slant/models/<kind>/ on Linux) so they persist across runs.
// If an upstream repo has no ONNX export, export one with `optimum-cli export onnx`
// and drop `model.onnx` + `tokenizer.json` into the same subdirectory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use super::traits::ModelKind;

/// File names every model subdirectory must contain.
pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// HuggingFace repo for the subjectivity model.
const SUBJECTIVITY_HF_URL: &str =
    "https://huggingface.co/GroNLP/mdebertav3-subjectivity-multilingual/resolve/main";

/// HuggingFace repo for the sentiment model.
const SENTIMENT_HF_URL: &str =
    "https://huggingface.co/distilbert/distilbert-base-uncased-finetuned-sst-2-english/resolve/main";

/// Path of the ONNX graph inside each HuggingFace repo.
const REMOTE_MODEL_PATH: &str = "onnx/model.onnx";

/// Returns the default directory for storing model files.
/// Uses the platform data directory: ~/.local/share/slant/models/ on Linux.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("slant")
        .join("models")
}

/// Subdirectory within the model dir for one model.
pub fn model_subdir(base: &Path, kind: ModelKind) -> PathBuf {
    base.join(kind.as_str())
}

/// Check whether both files for one model exist.
pub fn model_files_present(base: &Path, kind: ModelKind) -> bool {
    let dir = model_subdir(base, kind);
    dir.join(MODEL_FILE).exists() && dir.join(TOKENIZER_FILE).exists()
}

/// Check whether both models are ready to load.
pub fn all_models_present(base: &Path) -> bool {
    model_files_present(base, ModelKind::Subjectivity)
        && model_files_present(base, ModelKind::Sentiment)
}

fn repo_url(kind: ModelKind) -> &'static str {
    match kind {
        ModelKind::Subjectivity => SUBJECTIVITY_HF_URL,
        ModelKind::Sentiment => SENTIMENT_HF_URL,
    }
}

/// Download both models.
///
/// Shows progress bars for large files. Skips files that already exist.
/// Creates directories as needed.
pub async fn download_models(base: &Path) -> Result<()> {
    for kind in [ModelKind::Subjectivity, ModelKind::Sentiment] {
        println!("\n{} model:", kind);

        let dir = model_subdir(base, kind);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create model directory: {}", dir.display()))?;

        let tokenizer_path = dir.join(TOKENIZER_FILE);
        if tokenizer_path.exists() {
            info!(model = %kind, "Tokenizer already exists, skipping");
            println!("  {} (already exists)", TOKENIZER_FILE);
        } else {
            println!("  Downloading {}...", TOKENIZER_FILE);
            download_file(
                &format!("{}/{}", repo_url(kind), TOKENIZER_FILE),
                &tokenizer_path,
                false,
            )
            .await?;
        }

        let model_path = dir.join(MODEL_FILE);
        if model_path.exists() {
            info!(model = %kind, "Model already exists, skipping");
            println!("  {} (already exists)", MODEL_FILE);
        } else {
            println!("  Downloading {}...", MODEL_FILE);
            download_file(
                &format!("{}/{}", repo_url(kind), REMOTE_MODEL_PATH),
                &model_path,
                true,
            )
            .await?;
        }
    }

    Ok(())
}

/// Download a single file from a URL to a local path.
/// If `show_progress` is true, display a progress bar.
async fn download_file(url: &str, dest: &Path, show_progress: bool) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!(
            "Download failed with status {}: {}\n\
             If the repo has no ONNX export, export it with `optimum-cli export onnx` \
             and place the files in {}",
            response.status(),
            url,
            dest.parent().unwrap_or(dest).display()
        );
    }

    let total_size = response.content_length();

    let pb = if show_progress {
        let pb = match total_size {
            Some(size) => {
                let pb = ProgressBar::new(size);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("    [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                        .expect("valid template")
                        .progress_chars("=> "),
                );
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("    {spinner} {bytes}")
                        .expect("valid template"),
                );
                pb
            }
        };
        Some(pb)
    } else {
        None
    };

    let bytes = response
        .bytes()
        .await
        .context("Failed to read response body")?;

    if let Some(ref pb) = pb {
        pb.set_position(bytes.len() as u64);
    }

    // Stage in a sibling file; only a complete download gets the real name
    let partial = dest.with_extension("partial");
    std::fs::write(&partial, &bytes)
        .with_context(|| format!("Failed to write {}", partial.display()))?;
    std::fs::rename(&partial, dest)
        .with_context(|| format!("Failed to move download into {}", dest.display()))?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    info!("Downloaded {} to {}", url, dest.display());
    Ok(())
}
