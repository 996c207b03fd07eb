// Streaming result writer: appends one CSV row per scored article.
//
// The file is opened once per run in append mode and never truncated, so
// successive runs extend the same file. Every append is flushed and synced
// before it returns: if the process dies right after, that row is on disk
// and complete.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::processor::OutputRow;

/// Append-only CSV sink for output rows. No header row is written.
pub struct ResultWriter {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows_written: usize,
}

impl ResultWriter {
    /// Open (creating if needed) `path` for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open output file {}", path.display()))?;

        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        debug!(path = %path.display(), "Opened output file in append mode");

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            rows_written: 0,
        })
    }

    /// Write one row, then flush and sync it to disk before returning.
    pub fn append(&mut self, row: &OutputRow) -> Result<()> {
        self.writer
            .write_record(row.to_record())
            .with_context(|| format!("Failed to write row for {}", row.url))?;
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        self.writer
            .get_ref()
            .sync_data()
            .with_context(|| format!("Failed to sync {}", self.path.display()))?;

        self.rows_written += 1;
        Ok(())
    }

    /// Rows appended through this writer (not counting earlier runs).
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
