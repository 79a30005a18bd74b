//! Bubble Extract CLI - dialogue extraction for vertical comics
//!
//! Command-line front end for the tiling, OCR and bubble clustering pipeline.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::config::ConfigCommand;
use commands::extract::ExtractCommand;
use commands::tiles::TilesCommand;

#[derive(Parser)]
#[command(
    name = "bubble-extract",
    version,
    about = "Extract speech-bubble dialogue from long comic pages",
    long_about = "Splits tall scroll pages into overlapping strips, runs OCR on each strip,\n\
                  filters recognizer noise and regroups text lines into speech bubbles\n\
                  in reading order. Writes one Markdown, text, JSON or DOCX document per run.",
    after_help = "EXAMPLES:\n  \
                  # Extract a chapter folder to <folder>/<folder>_extraction.md\n  \
                  bubble-extract extract ./chapter_35\n\n  \
                  # Korean and English, Word output, custom title\n  \
                  bubble-extract extract ./chapter_35 --lang korean --lang english \\\n      \
                  --format docx --title \"The Detective Agency\" --subtitle \"Chapter 35\"\n\n  \
                  # Use a config file and a custom OCR wrapper\n  \
                  bubble-extract extract ./chapter_35 --config extract.yaml --ocr-command ./ocr.sh\n\n  \
                  # Inspect tiles and preprocessing for one page\n  \
                  bubble-extract tiles ./chapter_35/001.jpg --output-dir ./tiles\n\n  \
                  # Print the default configuration\n  \
                  bubble-extract config > extract.yaml"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract dialogue from a folder (or list) of page images
    Extract(ExtractCommand),

    /// Write the tiles and preprocessed tiles of one page for inspection
    Tiles(TilesCommand),

    /// Print the default configuration as YAML
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keep YAML output on stdout clean
    let log_level = match &cli.command {
        Commands::Config(_) => Level::WARN,
        _ => {
            if cli.verbose {
                Level::DEBUG
            } else {
                Level::INFO
            }
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Extract(cmd) => cmd.execute(),
        Commands::Tiles(cmd) => cmd.execute(),
        Commands::Config(cmd) => cmd.execute(),
    }
}
