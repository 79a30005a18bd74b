//! Common types shared by the recognition adapters and the bubble pipeline

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Processing errors
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for processing operations
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Axis-aligned box in tile-local pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Smallest box enclosing a polygon (PaddleOCR emits 4-point quads)
    #[must_use]
    pub fn from_points(points: &[(f64, f64)]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bbox = Self::new(first.0, first.1, first.0, first.1);
        for &(x, y) in rest {
            bbox.x0 = bbox.x0.min(x);
            bbox.y0 = bbox.y0.min(y);
            bbox.x1 = bbox.x1.max(x);
            bbox.y1 = bbox.y1.max(y);
        }
        Some(bbox)
    }

    /// Top edge, used as the fragment's vertical position
    #[inline]
    #[must_use]
    pub const fn top(&self) -> f64 {
        self.y0
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }
}

/// One raw recognized text unit as returned by a recognizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Recognized text content
    pub text: String,
    /// Recognition confidence score (0.0-1.0)
    pub confidence: f64,
    /// Bounding box in tile-local pixels
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(text: impl Into<String>, confidence: f64, bbox: BoundingBox) -> Self {
        Self {
            text: text.into(),
            confidence,
            bbox,
        }
    }
}

/// A detection that survived filtering, reduced to what clustering needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    /// Top-y of the source detection, tile-local
    pub vertical_position: f64,
    pub confidence: f64,
}

impl Fragment {
    pub fn new(text: impl Into<String>, vertical_position: f64, confidence: f64) -> Self {
        Self {
            text: text.into(),
            vertical_position,
            confidence,
        }
    }
}

impl From<&Detection> for Fragment {
    fn from(detection: &Detection) -> Self {
        Self {
            text: detection.text.clone(),
            vertical_position: detection.bbox.top(),
            confidence: detection.confidence,
        }
    }
}

/// One logical dialogue unit built from vertically chained fragments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bubble {
    /// Merged, whitespace-normalized text (never empty)
    pub text: String,
    /// Mean confidence of the merged fragments
    pub average_confidence: f64,
    /// Vertical position of the first fragment, in page coordinates
    pub top: f64,
    /// Number of fragments merged into this bubble
    pub fragment_count: usize,
}

impl Bubble {
    /// Move the bubble from tile-local into page coordinates
    #[must_use]
    pub fn offset_by(mut self, offset_y: f64) -> Self {
        self.top += offset_y;
        self
    }
}

/// Outcome of processing one page image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum PageStatus {
    Processed,
    Failed(String),
}

/// Bubbles extracted from one page, in reading order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-based position in the run
    pub number: usize,
    pub source: PathBuf,
    /// (width, height) in pixels; (0, 0) if the page could not be read
    pub dimensions: (u32, u32),
    pub tile_count: usize,
    /// Recognizer invocations that failed on this page's tiles
    #[serde(default)]
    pub failed_recognitions: usize,
    pub bubbles: Vec<Bubble>,
    pub status: PageStatus,
}

impl PageResult {
    /// A page that could not be decoded: zero bubbles, status records why
    pub fn failed(number: usize, source: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            number,
            source,
            dimensions: (0, 0),
            tile_count: 0,
            failed_recognitions: 0,
            bubbles: Vec::new(),
            status: PageStatus::Failed(reason.into()),
        }
    }

    #[must_use]
    pub fn is_processed(&self) -> bool {
        self.status == PageStatus::Processed
    }

    #[must_use]
    pub fn bubble_count(&self) -> usize {
        self.bubbles.len()
    }
}
