//! Run driver: a sequence of pages in, per-page results and a summary out
//!
//! Pages are processed one at a time in the given order. An unreadable page
//! is recorded as failed and the run moves on; the only way to stop early is
//! the external stop flag, checked between pages.

use crate::aggregator::PageAggregator;
use bubble_common::{PageResult, PageStatus};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Progress report handed to the caller after each page
#[derive(Debug)]
pub struct PageProgress<'a> {
    /// 1-based index of the page just finished
    pub current: usize,
    pub total: usize,
    pub source: &'a Path,
    pub result: &'a PageResult,
}

/// Totals for a finished (or interrupted) run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub pages_found: usize,
    pub pages_processed: usize,
    pub pages_failed: usize,
    pub total_bubbles: usize,
    /// Tile recognitions that failed across all processed pages
    #[serde(default)]
    pub failed_recognitions: usize,
    /// Mean of bubble confidences across the run; `None` without bubbles
    pub average_confidence: Option<f64>,
    pub elapsed_secs: f64,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn from_pages(
        pages: &[PageResult],
        pages_found: usize,
        elapsed: Duration,
        interrupted: bool,
    ) -> Self {
        let pages_processed = pages.iter().filter(|p| p.is_processed()).count();
        let confidences: Vec<f64> = pages
            .iter()
            .flat_map(|p| p.bubbles.iter().map(|b| b.average_confidence))
            .collect();
        let average_confidence = if confidences.is_empty() {
            None
        } else {
            Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
        };

        Self {
            pages_found,
            pages_processed,
            pages_failed: pages.len() - pages_processed,
            total_bubbles: confidences.len(),
            failed_recognitions: pages.iter().map(|p| p.failed_recognitions).sum(),
            average_confidence,
            elapsed_secs: elapsed.as_secs_f64(),
            interrupted,
        }
    }

    /// Elapsed time as `Xm Ys`
    #[must_use]
    pub fn elapsed_display(&self) -> String {
        let secs = self.elapsed_secs.max(0.0).round() as u64;
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Pages in run order plus the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub pages: Vec<PageResult>,
    pub summary: RunSummary,
}

/// One pass over a list of pages with a shared aggregator
pub struct ExtractionRun<'a> {
    aggregator: PageAggregator<'a>,
    stop: Option<Arc<AtomicBool>>,
}

impl<'a> ExtractionRun<'a> {
    pub fn new(aggregator: PageAggregator<'a>) -> Self {
        Self {
            aggregator,
            stop: None,
        }
    }

    /// Stop before the next page once `flag` is set
    #[must_use]
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Process `pages` in order, calling `on_page` after each one
    pub fn execute<F>(&self, pages: &[PathBuf], mut on_page: F) -> RunReport
    where
        F: FnMut(&PageProgress<'_>),
    {
        let start = Instant::now();
        let total = pages.len();
        let mut results = Vec::with_capacity(total);
        let mut interrupted = false;

        info!("Processing {} pages", total);

        for (i, path) in pages.iter().enumerate() {
            if self.stop_requested() {
                warn!("Stop requested, {} of {} pages left unprocessed", total - i, total);
                interrupted = true;
                break;
            }

            let number = i + 1;
            let result = self.process_one(number, path);
            on_page(&PageProgress {
                current: number,
                total,
                source: path,
                result: &result,
            });
            results.push(result);
        }

        let summary = RunSummary::from_pages(&results, total, start.elapsed(), interrupted);
        info!(
            "Run finished: {}/{} pages, {} bubbles in {}",
            summary.pages_processed,
            summary.pages_found,
            summary.total_bubbles,
            summary.elapsed_display()
        );

        RunReport {
            pages: results,
            summary,
        }
    }

    fn process_one(&self, number: usize, path: &Path) -> PageResult {
        match self.aggregator.process_page(path) {
            Ok(page) => {
                info!(
                    "Page {} ({}): {} bubbles",
                    number,
                    path.display(),
                    page.bubbles.len()
                );
                if page.failed_recognitions > 0 {
                    warn!(
                        "Page {}: {} tile recognitions failed",
                        number, page.failed_recognitions
                    );
                }
                PageResult {
                    number,
                    source: path.to_path_buf(),
                    dimensions: page.dimensions,
                    tile_count: page.tile_count,
                    failed_recognitions: page.failed_recognitions,
                    bubbles: page.bubbles,
                    status: PageStatus::Processed,
                }
            }
            Err(e) => {
                warn!("Page {} ({}) skipped: {}", number, path.display(), e);
                PageResult::failed(number, path.to_path_buf(), e.to_string())
            }
        }
    }
}
