//! Extract command - folder of pages in, one dialogue document out

use super::load_config;
use anyhow::{Context as _, Result};
use bubble_common::PageStatus;
use bubble_extract_core::image_io::is_page_image;
use bubble_extract_core::{
    default_output_path, discover_pages, emitter_for, ExtractionConfig, ExtractionDocument,
    ExtractionRun, OutputFormat, PageAggregator,
};
use bubble_ocr::{build_recognizers, BackendConfig};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Args)]
pub struct ExtractCommand {
    /// A folder of page images, or individual page images in reading order
    #[arg(value_name = "PATH", required = true)]
    inputs: Vec<PathBuf>,

    /// YAML configuration file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// OCR language, repeat for several (default: korean)
    #[arg(short, long = "lang", value_name = "LANG")]
    languages: Vec<String>,

    /// Tallest strip handed to OCR, in pixels
    #[arg(long)]
    max_tile_height: Option<u32>,

    /// Rows shared by consecutive strips
    #[arg(long)]
    overlap: Option<u32>,

    /// Detections must score strictly above this (0-1)
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Max vertical gap between lines of one bubble, in pixels
    #[arg(long)]
    vertical_threshold: Option<f64>,

    /// Skip contrast enhancement and denoising
    #[arg(long)]
    no_preprocess: bool,

    /// Keep bubbles recognized twice in a tile overlap
    #[arg(long)]
    no_dedupe: bool,

    /// External OCR program printing PaddleOCR JSON
    #[arg(long, value_name = "PROGRAM")]
    ocr_command: Option<PathBuf>,

    /// Argument for the OCR program, repeat for several; supports {image},
    /// {lang}, {det_thresh}, {box_thresh}, {unclip_ratio}, {textline_orientation}
    #[arg(long = "ocr-arg", value_name = "ARG", allow_hyphen_values = true)]
    ocr_args: Vec<String>,

    /// Seconds before a running OCR command is killed
    #[arg(long)]
    timeout: Option<u64>,

    /// Use the built-in Tesseract engine (needs the `tesseract` feature)
    #[arg(long, conflicts_with = "ocr_command")]
    tesseract: bool,

    /// Output format: markdown, text, json or docx
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Output file (default: <folder>/<folder-name>_extraction.<ext>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Document title
    #[arg(long)]
    title: Option<String>,

    /// Document subtitle, e.g. the chapter
    #[arg(long)]
    subtitle: Option<String>,
}

impl ExtractCommand {
    pub fn execute(self) -> Result<()> {
        info!("=== Bubble Extract ===");

        let mut config = load_config(self.config.as_deref())?;
        self.apply_overrides(&mut config);
        config.validate().context("Invalid configuration")?;

        let (pages, folder) = self.collect_pages()?;
        if pages.is_empty() {
            anyhow::bail!("No page images (.jpg, .jpeg, .png) found");
        }
        info!("Pages: {}", pages.len());
        info!("Languages: {}", config.enabled_languages().join(", "));

        let format = config.output.format;
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(&folder, format));

        let recognizers = build_recognizers(&config.recognizer, &config.enabled_languages())
            .context("Failed to initialize OCR")?;
        let aggregator =
            PageAggregator::new(&config, &recognizers).context("Invalid configuration")?;

        let report = ExtractionRun::new(aggregator).execute(&pages, |progress| {
            match &progress.result.status {
                PageStatus::Processed => info!(
                    "✓ [{}/{}] {} - {} bubbles",
                    progress.current,
                    progress.total,
                    progress.source.display(),
                    progress.result.bubble_count()
                ),
                PageStatus::Failed(reason) => warn!(
                    "✗ [{}/{}] {} - FAILED: {}",
                    progress.current,
                    progress.total,
                    progress.source.display(),
                    reason
                ),
            }
        });

        let summary = report.summary.clone();
        let document = ExtractionDocument::from_report(
            config.output.title.clone(),
            config.output.subtitle.clone(),
            report,
        );
        emitter_for(format)
            .write(&document, &output)
            .with_context(|| format!("Failed to write {}", output.display()))?;

        info!("=== Extraction Complete ===");
        info!("Pages processed: {}/{}", summary.pages_processed, summary.pages_found);
        if summary.pages_failed > 0 {
            info!("Pages failed: {}", summary.pages_failed);
        }
        if summary.failed_recognitions > 0 {
            warn!("Tile recognitions failed: {}", summary.failed_recognitions);
        }
        info!("Bubbles: {}", summary.total_bubbles);
        if let Some(confidence) = summary.average_confidence {
            info!("Average confidence: {:.1}%", confidence * 100.0);
        }
        info!("Elapsed: {}", summary.elapsed_display());
        info!("Saved: {}", output.display());

        Ok(())
    }

    fn apply_overrides(&self, config: &mut ExtractionConfig) {
        if !self.languages.is_empty() {
            config.languages = self.languages.clone();
        }
        if let Some(height) = self.max_tile_height {
            config.tiling.max_tile_height = height;
        }
        if let Some(overlap) = self.overlap {
            config.tiling.overlap = overlap;
        }
        if let Some(min_confidence) = self.min_confidence {
            config.filter.min_confidence = min_confidence;
        }
        if let Some(threshold) = self.vertical_threshold {
            config.clustering.vertical_threshold = threshold;
        }
        if self.no_preprocess {
            config.preprocess.enabled = false;
        }
        if self.no_dedupe {
            config.clustering.dedupe_overlap = false;
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if let Some(title) = &self.title {
            config.output.title = title.clone();
        }
        if let Some(subtitle) = &self.subtitle {
            config.output.subtitle = Some(subtitle.clone());
        }

        let backend = &mut config.recognizer.backend;
        if self.tesseract {
            *backend = BackendConfig::tesseract();
        }
        if let Some(program) = &self.ocr_command {
            *backend = match std::mem::take(backend) {
                BackendConfig::Command {
                    args, timeout_secs, ..
                } => BackendConfig::Command {
                    program: program.clone(),
                    args,
                    timeout_secs,
                },
                BackendConfig::Tesseract { .. } => BackendConfig::command(program.clone()),
            };
        }
        if !self.ocr_args.is_empty() || self.timeout.is_some() {
            match backend {
                BackendConfig::Command {
                    args, timeout_secs, ..
                } => {
                    if !self.ocr_args.is_empty() {
                        *args = self.ocr_args.clone();
                    }
                    if let Some(timeout) = self.timeout {
                        *timeout_secs = timeout;
                    }
                }
                BackendConfig::Tesseract { .. } => {
                    warn!("--ocr-arg and --timeout only apply to an OCR command, ignoring")
                }
            }
        }
    }

    /// Pages in run order, plus the folder the default output goes to
    fn collect_pages(&self) -> Result<(Vec<PathBuf>, PathBuf)> {
        if let [single] = self.inputs.as_slice() {
            if single.is_dir() {
                let pages = discover_pages(single)
                    .with_context(|| format!("Failed to list {}", single.display()))?;
                return Ok((pages, single.clone()));
            }
        }

        let pages: Vec<PathBuf> = self
            .inputs
            .iter()
            .filter(|path| {
                if !path.is_file() {
                    warn!("Skipping non-existent file: {}", path.display());
                    false
                } else if !is_page_image(path) {
                    warn!("Skipping non-image file: {}", path.display());
                    false
                } else {
                    true
                }
            })
            .cloned()
            .collect();

        let folder = pages
            .first()
            .and_then(|p| p.parent())
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok((pages, folder))
    }
}
