// System status display: model files and effective configuration.

use colored::Colorize;

use crate::classifier::download::{model_files_present, model_subdir};
use crate::classifier::traits::ModelKind;
use crate::config::Config;
use crate::output::terminal::presence;

/// Display system status to the terminal.
pub fn show(config: &Config) {
    println!("{}", "Models".bold());
    println!("  Directory: {}", config.model_dir.display());
    let mut missing = false;
    for kind in [ModelKind::Subjectivity, ModelKind::Sentiment] {
        let present = model_files_present(&config.model_dir, kind);
        missing |= !present;
        println!(
            "  {:<13} {}  ({})",
            kind.as_str(),
            presence(present),
            model_subdir(&config.model_dir, kind).display()
        );
    }
    if missing {
        println!("  Run `slant download-models` to fetch them");
    }

    println!("\n{}", "Analysis".bold());
    println!("  Workers:        {}", config.worker_count);
    println!("  Chunking:       {:?}, up to {} per chunk", config.chunking, config.max_chunk_size);
    println!("  Batch size:     {}", config.batch_size);
    match config.document_timeout {
        Some(timeout) => println!("  Doc timeout:    {:.1}s", timeout.as_secs_f64()),
        None => println!("  Doc timeout:    none"),
    }

    println!("\n{}", "MediaCloud".bold());
    println!("  API URL:        {}", config.mediacloud_api_url);
    if config.mediacloud_api_key.is_empty() {
        println!("  API key:        {}", "not set".red());
    } else {
        println!("  API key:        {}", "set".green());
    }
}
