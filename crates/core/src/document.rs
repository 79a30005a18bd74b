//! Document emitters
//!
//! One document per run. Every page gets a `Page N` heading followed by its
//! bubbles as a numbered list (restarting at 1 on each page), or the
//! `[No text detected]` marker when nothing survived.

use crate::run::{RunReport, RunSummary};
use bubble_common::{PageResult, PageStatus};
use docx_rs::{Docx, Paragraph, Run};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

/// Marker written for a page without bubbles
pub const NO_TEXT_MARKER: &str = "[No text detected]";

/// Bubble text colour in DOCX output
const BUBBLE_COLOR: &str = "0000FF";

/// 11 pt, in the half-points DOCX uses
const BODY_SIZE: usize = 22;
const TITLE_SIZE: usize = 40;
const SUBTITLE_SIZE: usize = 32;
const PAGE_HEADING_SIZE: usize = 26;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write DOCX: {0}")]
    Docx(String),
}

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Text,
    Json,
    Docx,
}

impl OutputFormat {
    /// File extension, without the dot
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Text => "txt",
            OutputFormat::Json => "json",
            OutputFormat::Docx => "docx",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "docx" | "word" => Ok(OutputFormat::Docx),
            other => Err(format!(
                "unknown output format '{other}' (expected markdown, text, json or docx)"
            )),
        }
    }
}

/// Everything an emitter needs for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionDocument {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub pages: Vec<PageResult>,
    pub summary: RunSummary,
}

impl ExtractionDocument {
    pub fn from_report(title: impl Into<String>, subtitle: Option<String>, report: RunReport) -> Self {
        Self {
            title: title.into(),
            subtitle,
            pages: report.pages,
            summary: report.summary,
        }
    }
}

/// A sink for a finished run
pub trait DocumentEmitter {
    fn format(&self) -> OutputFormat;

    fn write(&self, document: &ExtractionDocument, path: &Path) -> Result<(), DocumentError>;
}

/// Emitter for `format`
pub fn emitter_for(format: OutputFormat) -> Box<dyn DocumentEmitter> {
    match format {
        OutputFormat::Markdown => Box::new(MarkdownEmitter),
        OutputFormat::Text => Box::new(TextEmitter),
        OutputFormat::Json => Box::new(JsonEmitter),
        OutputFormat::Docx => Box::new(DocxEmitter),
    }
}

/// `<folder>/<folder-name>_extraction.<ext>`
pub fn default_output_path(folder: &Path, format: OutputFormat) -> std::path::PathBuf {
    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "manhwa".to_string());
    folder.join(format!("{name}_extraction.{}", format.extension()))
}

fn page_note(page: &PageResult) -> Option<&str> {
    match &page.status {
        PageStatus::Processed => None,
        PageStatus::Failed(reason) => Some(reason),
    }
}

/// Footer suffix counting failed tile recognitions, empty when there were none
fn recognition_failures(summary: &RunSummary) -> String {
    match summary.failed_recognitions {
        0 => String::new(),
        n => format!(", {n} tile recognitions failed"),
    }
}

fn confidence_line(summary: &RunSummary) -> String {
    match summary.average_confidence {
        Some(c) => format!("{:.1}%", c * 100.0),
        None => "n/a".to_string(),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownEmitter;

impl MarkdownEmitter {
    #[must_use]
    pub fn render(&self, document: &ExtractionDocument) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# {}\n", document.title);
        if let Some(subtitle) = &document.subtitle {
            let _ = writeln!(out, "## {}\n", subtitle);
        }
        let _ = writeln!(out, "Extraction of {} pages\n", document.summary.pages_found);

        for page in &document.pages {
            let _ = writeln!(out, "### Page {}\n", page.number);
            if let Some(reason) = page_note(page) {
                let _ = writeln!(out, "<!-- page failed: {} -->", reason);
            }
            if page.failed_recognitions > 0 {
                let _ = writeln!(
                    out,
                    "<!-- {} tile recognitions failed -->",
                    page.failed_recognitions
                );
            }
            if page.bubbles.is_empty() {
                let _ = writeln!(out, "{}\n", NO_TEXT_MARKER);
            } else {
                for (idx, bubble) in page.bubbles.iter().enumerate() {
                    let _ = writeln!(out, "{}. {}", idx + 1, bubble.text);
                }
                out.push('\n');
            }
        }

        let summary = &document.summary;
        let _ = writeln!(out, "---\n");
        let _ = writeln!(
            out,
            "{} pages processed, {} failed, {} bubbles, average confidence {}, elapsed {}{}{}",
            summary.pages_processed,
            summary.pages_failed,
            summary.total_bubbles,
            confidence_line(summary),
            summary.elapsed_display(),
            recognition_failures(summary),
            if summary.interrupted { " (interrupted)" } else { "" }
        );
        out
    }
}

impl DocumentEmitter for MarkdownEmitter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Markdown
    }

    fn write(&self, document: &ExtractionDocument, path: &Path) -> Result<(), DocumentError> {
        fs::write(path, self.render(document))?;
        info!("Saved Markdown to {}", path.display());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextEmitter;

impl TextEmitter {
    #[must_use]
    pub fn render(&self, document: &ExtractionDocument) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", document.title);
        if let Some(subtitle) = &document.subtitle {
            let _ = writeln!(out, "{}", subtitle);
        }
        let _ = writeln!(out, "Extraction of {} pages\n", document.summary.pages_found);

        for page in &document.pages {
            let _ = writeln!(out, "Page {}", page.number);
            if page.bubbles.is_empty() {
                let _ = writeln!(out, "{}", NO_TEXT_MARKER);
            }
            for (idx, bubble) in page.bubbles.iter().enumerate() {
                let _ = writeln!(out, "{}. {}", idx + 1, bubble.text);
            }
            out.push('\n');
        }

        let summary = &document.summary;
        let _ = writeln!(
            out,
            "Total: {} bubbles on {} pages ({} failed), average confidence {}, elapsed {}{}",
            summary.total_bubbles,
            summary.pages_processed,
            summary.pages_failed,
            confidence_line(summary),
            summary.elapsed_display(),
            recognition_failures(summary)
        );
        out
    }
}

impl DocumentEmitter for TextEmitter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Text
    }

    fn write(&self, document: &ExtractionDocument, path: &Path) -> Result<(), DocumentError> {
        fs::write(path, self.render(document))?;
        info!("Saved text to {}", path.display());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEmitter;

impl DocumentEmitter for JsonEmitter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Json
    }

    fn write(&self, document: &ExtractionDocument, path: &Path) -> Result<(), DocumentError> {
        let json = serde_json::to_string_pretty(document)?;
        fs::write(path, json)?;
        info!("Saved JSON to {}", path.display());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocxEmitter;

impl DocxEmitter {
    fn heading(text: &str, size: usize) -> Paragraph {
        Paragraph::new().add_run(Run::new().add_text(text).bold().size(size))
    }

    #[must_use]
    pub fn build(&self, document: &ExtractionDocument) -> Docx {
        let mut docx = Docx::new().add_paragraph(Self::heading(&document.title, TITLE_SIZE));
        if let Some(subtitle) = &document.subtitle {
            docx = docx.add_paragraph(Self::heading(subtitle, SUBTITLE_SIZE));
        }
        docx = docx
            .add_paragraph(Paragraph::new().add_run(
                Run::new().add_text(format!("Extraction of {} pages", document.summary.pages_found)),
            ))
            .add_paragraph(Paragraph::new());

        for page in &document.pages {
            docx = docx.add_paragraph(Self::heading(
                &format!("Page {}", page.number),
                PAGE_HEADING_SIZE,
            ));

            if page.bubbles.is_empty() {
                docx = docx
                    .add_paragraph(Paragraph::new().add_run(Run::new().add_text(NO_TEXT_MARKER)));
            } else {
                for (idx, bubble) in page.bubbles.iter().enumerate() {
                    docx = docx.add_paragraph(
                        Paragraph::new()
                            .add_run(
                                Run::new()
                                    .add_text(format!("{}. ", idx + 1))
                                    .bold()
                                    .size(BODY_SIZE),
                            )
                            .add_run(
                                Run::new()
                                    .add_text(&bubble.text)
                                    .size(BODY_SIZE)
                                    .color(BUBBLE_COLOR),
                            ),
                    );
                }
            }
            docx = docx.add_paragraph(Paragraph::new());
        }

        docx
    }
}

impl DocumentEmitter for DocxEmitter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Docx
    }

    fn write(&self, document: &ExtractionDocument, path: &Path) -> Result<(), DocumentError> {
        let file = File::create(path)?;
        self.build(document)
            .build()
            .pack(file)
            .map_err(|e| DocumentError::Docx(e.to_string()))?;
        info!("Saved DOCX to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bubble_common::Bubble;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn bubble(text: &str, confidence: f64) -> Bubble {
        Bubble {
            text: text.to_string(),
            average_confidence: confidence,
            top: 0.0,
            fragment_count: 1,
        }
    }

    fn document() -> ExtractionDocument {
        ExtractionDocument {
            title: "The Detective Agency".to_string(),
            subtitle: Some("Chapter 35".to_string()),
            pages: vec![
                PageResult {
                    number: 1,
                    source: PathBuf::from("001.jpg"),
                    dimensions: (720, 5000),
                    tile_count: 2,
                    failed_recognitions: 0,
                    bubbles: vec![bubble("안녕하세요", 0.95), bubble("누구세요?", 0.85)],
                    status: PageStatus::Processed,
                },
                PageResult::failed(2, PathBuf::from("002.jpg"), "corrupt"),
                PageResult {
                    number: 3,
                    source: PathBuf::from("003.jpg"),
                    dimensions: (720, 1200),
                    tile_count: 1,
                    failed_recognitions: 0,
                    bubbles: vec![bubble("잘 가", 0.9)],
                    status: PageStatus::Processed,
                },
            ],
            summary: RunSummary {
                pages_found: 3,
                pages_processed: 2,
                pages_failed: 1,
                total_bubbles: 3,
                failed_recognitions: 0,
                average_confidence: Some(0.9),
                elapsed_secs: 125.0,
                interrupted: false,
            },
        }
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("md".parse::<OutputFormat>(), Ok(OutputFormat::Markdown));
        assert_eq!("DOCX".parse::<OutputFormat>(), Ok(OutputFormat::Docx));
        assert_eq!("txt".parse::<OutputFormat>(), Ok(OutputFormat::Text));
        assert!("pdf".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_default_output_path() {
        let path = default_output_path(Path::new("/data/chapter_35"), OutputFormat::Docx);
        assert_eq!(path, PathBuf::from("/data/chapter_35/chapter_35_extraction.docx"));
    }

    #[test]
    fn test_markdown_layout() {
        let md = MarkdownEmitter.render(&document());
        assert!(md.starts_with("# The Detective Agency\n\n## Chapter 35\n\nExtraction of 3 pages\n"));
        assert!(md.contains("### Page 1\n\n1. 안녕하세요\n2. 누구세요?\n"));
        assert!(md.contains("### Page 2\n"));
        // Numbering restarts on every page
        assert!(md.contains("### Page 3\n\n1. 잘 가\n"));
        assert!(md.contains("2 pages processed, 1 failed, 3 bubbles, average confidence 90.0%, elapsed 2m 5s"));
    }

    #[test]
    fn test_failed_recognitions_reported() {
        let mut doc = document();
        doc.pages[2].failed_recognitions = 1;
        doc.summary.failed_recognitions = 1;

        let md = MarkdownEmitter.render(&doc);
        assert!(md.contains("### Page 3\n\n<!-- 1 tile recognitions failed -->\n1. 잘 가\n"));
        assert!(md.contains("elapsed 2m 5s, 1 tile recognitions failed"));

        let text = TextEmitter.render(&doc);
        assert!(text.contains("elapsed 2m 5s, 1 tile recognitions failed"));

        let clean = MarkdownEmitter.render(&document());
        assert!(!clean.contains("tile recognitions failed"));
    }

    #[test]
    fn test_empty_page_marker() {
        let md = MarkdownEmitter.render(&document());
        let page2 = md.split("### Page 2").nth(1).unwrap();
        let page2 = page2.split("### Page 3").next().unwrap();
        assert!(page2.contains(NO_TEXT_MARKER));

        let text = TextEmitter.render(&document());
        assert!(text.contains("Page 2\n[No text detected]\n"));
    }

    #[test]
    fn test_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        JsonEmitter.write(&document(), &path).unwrap();

        let parsed: ExtractionDocument =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, document());
    }

    #[test]
    fn test_docx_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.docx");
        emitter_for(OutputFormat::Docx)
            .write(&document(), &path)
            .unwrap();

        let bytes = fs::read(&path).unwrap();
        // DOCX is a ZIP container
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_emitter_for_matches_format() {
        for format in [
            OutputFormat::Markdown,
            OutputFormat::Text,
            OutputFormat::Json,
            OutputFormat::Docx,
        ] {
            assert_eq!(emitter_for(format).format(), format);
        }
    }
}
