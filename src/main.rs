use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use slant::classifier::onnx::OnnxModelLoader;
use slant::config::{self, Config};
use slant::sources::directory::DirectoryClient;
use slant::sources::fetch::{self, HttpFetcher};
use slant::sources::rate_limiter::RateLimiter;

/// Slant: subjectivity and sentiment scoring for news articles.
///
/// Collects stories from a MediaCloud collection, retrieves their text, and
/// scores each article for how opinionated and how positive it reads.
#[derive(Parser)]
#[command(name = "slant", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save story metadata for a MediaCloud collection as batch files
    Stories {
        /// MediaCloud collection id
        #[arg(long)]
        collection: u64,

        /// Full-text search query (default: everything)
        #[arg(long, default_value = "*")]
        query: String,

        /// First publish date to include (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Last publish date to include (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,

        /// Directory for the story batch files
        #[arg(long)]
        out: PathBuf,
    },

    /// Retrieve article text for saved story batches
    Fetch {
        /// Directory of story batch files
        #[arg(long)]
        input: PathBuf,

        /// Directory for the per-article JSON files
        #[arg(long)]
        output: PathBuf,

        /// Articles to download in parallel (default: 8)
        #[arg(long, default_value = "8")]
        concurrency: usize,

        /// Per-request timeout in seconds (default: 30)
        #[arg(long, default_value = "30")]
        request_timeout: u64,
    },

    /// Score every article in a directory, appending rows to a CSV file
    Analyse {
        /// Directory of per-article JSON files
        #[arg(long)]
        input: PathBuf,

        /// CSV file to append results to
        #[arg(long)]
        output: PathBuf,

        /// Parallel workers, each holding both models (overrides SLANT_WORKERS)
        #[arg(long)]
        workers: Option<usize>,

        /// Maximum chunk length (overrides SLANT_MAX_CHUNK)
        #[arg(long)]
        max_chunk: Option<usize>,

        /// Chunks per inference call (overrides SLANT_BATCH_SIZE)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Give up on a document after this many seconds, 0 for no limit
        /// (overrides SLANT_DOC_TIMEOUT_SECS)
        #[arg(long)]
        timeout: Option<f64>,
    },

    /// Download the subjectivity and sentiment ONNX models
    DownloadModels,

    /// Show model files and effective configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("slant=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Stories {
            collection,
            query,
            start,
            end,
            out,
        } => {
            if end < start {
                anyhow::bail!("--end ({end}) is before --start ({start})");
            }
            let config = Config::load()?;
            config.require_mediacloud()?;

            println!("Listing stories for collection {collection} ({start} to {end})...");
            let client = DirectoryClient::new(
                &config.mediacloud_api_url,
                &config.mediacloud_api_key,
                RateLimiter::per_second(1.0),
            )?;
            let (batches, stories) = client
                .download_stories(collection, &query, start, end, &out)
                .await?;

            println!(
                "\n{} {} stories in {} batch files under {}",
                "Saved".bold(),
                stories,
                batches,
                out.display()
            );
            println!("Next: `slant fetch --input {} --output <dir>`", out.display());
        }

        Commands::Fetch {
            input,
            output,
            concurrency,
            request_timeout,
        } => {
            let fetcher = HttpFetcher::new(Duration::from_secs(request_timeout))?;
            let summary =
                fetch::expand_story_batches(&input, &output, &fetcher, concurrency).await?;

            println!(
                "\n{} {} articles to {} ({} with text)",
                "Wrote".bold(),
                summary.articles,
                output.display(),
                summary.with_text
            );
            let missing = summary.articles - summary.with_text;
            if missing > 0 {
                println!(
                    "  {}",
                    format!("{missing} articles had no retrievable text and will be skipped").yellow()
                );
            }
        }

        Commands::Analyse {
            input,
            output,
            workers,
            max_chunk,
            batch_size,
            timeout,
        } => {
            let mut config = Config::load()?;
            if let Some(workers) = workers {
                config.worker_count = workers;
            }
            if let Some(max_chunk) = max_chunk {
                config.max_chunk_size = max_chunk;
            }
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }
            if let Some(secs) = timeout {
                config.document_timeout = config::timeout_from_secs(secs)?;
            }
            config.validate()?;
            config.require_models()?;

            info!(
                workers = config.worker_count,
                max_chunk = config.max_chunk_size,
                batch_size = config.batch_size,
                chunking = ?config.chunking,
                "Starting analysis"
            );
            println!(
                "Analysing {} with {} workers...",
                input.display(),
                config.worker_count
            );

            let loader = Arc::new(OnnxModelLoader::new(
                config.model_dir.clone(),
                config.chunking,
            ));
            let summary =
                slant::pipeline::analyse_dir(&input, &output, loader, config.pool_options())
                    .await?;
            slant::output::terminal::display_summary(&summary);
        }

        Commands::DownloadModels => {
            let config = Config::load()?;
            let model_dir = &config.model_dir;

            println!("Downloading ONNX models...");
            println!("  Destination: {}", model_dir.display());

            slant::classifier::download::download_models(model_dir).await?;

            println!("\n{}", "Models downloaded successfully.".bold());
            println!("You can now run `slant analyse --input <dir> --output <file.csv>`.");
        }

        Commands::Status => {
            let config = Config::load()?;
            slant::status::show(&config);
        }
    }

    Ok(())
}
