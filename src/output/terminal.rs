// Colored terminal output for run summaries and status.

use colored::Colorize;

use crate::pipeline::RunSummary;

/// How many failed documents to list individually before summarizing.
const MAX_LISTED_FAILURES: usize = 10;

/// Display the outcome of an analysis run.
pub fn display_summary(summary: &RunSummary) {
    println!("\n{}", "=== Analysis Summary ===".bold());
    println!("  Documents:  {}", summary.documents);
    println!(
        "  Scored:     {}",
        summary.scored.to_string().green().bold()
    );

    let skipped = summary.skipped_total();
    if skipped == 0 {
        println!("  Skipped:    0");
    } else {
        println!("  Skipped:    {}", skipped.to_string().yellow());
        for (kind, count) in &summary.skipped {
            println!("    {:<20} {}", kind.dimmed(), count);
        }
    }

    println!(
        "  Elapsed:    {:.1}s ({:.2} docs/s)",
        summary.elapsed.as_secs_f64(),
        summary.throughput()
    );
    println!("  Output:     {}", summary.output.display());

    if !summary.failures.is_empty() {
        println!(
            "\n  {} {} documents failed:",
            "!".red().bold(),
            summary.failures.len()
        );
        for (path, reason) in summary.failures.iter().take(MAX_LISTED_FAILURES) {
            println!(
                "    {}  {}",
                path.display(),
                super::truncate_chars(reason, 100).dimmed()
            );
        }
        if summary.failures.len() > MAX_LISTED_FAILURES {
            println!(
                "    {}",
                format!(
                    "... and {} more (see logs)",
                    summary.failures.len() - MAX_LISTED_FAILURES
                )
                .dimmed()
            );
        }
    }

    if summary.cancelled {
        println!(
            "\n  {}",
            "Run was interrupted. Rows written so far are complete; rerun to continue."
                .yellow()
        );
    }
}

/// Render a present/missing marker for status output.
pub fn presence(present: bool) -> colored::ColoredString {
    if present {
        "present".green()
    } else {
        "missing".red()
    }
}
