//! Recognition adapters for comic page tiles
//!
//! The OCR engine itself is an external collaborator. This crate owns the
//! boundary: it invokes an engine on one tile and normalizes whatever comes
//! back into a [`RecognitionOutput`], so the bubble pipeline never has to
//! check for missing keys or mismatched arrays.
//!
//! # Backends
//! - [`CommandRecognizer`]: runs an external program (typically a PaddleOCR
//!   wrapper) on a temporary PNG of the tile and parses PaddleOCR-shaped JSON
//!   from its stdout
//! - `TesseractRecognizer` (feature `tesseract`): in-process Tesseract 5.x via
//!   leptess, fed from memory
//!
//! # Example
//! ```no_run
//! use bubble_ocr::{build_recognizers, RecognizerSettings, TextRecognizer};
//! use image::DynamicImage;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = RecognizerSettings::default();
//! let recognizers = build_recognizers(&settings, &["korean".to_string()])?;
//!
//! let tile = DynamicImage::new_luma8(800, 1200);
//! for recognizer in recognizers.iter() {
//!     let output = recognizer.recognize(&tile)?;
//!     println!("{}: {} detections", recognizer.language(), output.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod paddle;
pub mod set;
#[cfg(feature = "tesseract")]
pub mod tesseract;

pub use command::{CommandRecognizer, TileArtifact};
pub use paddle::parse_paddle_json;
pub use set::{build_recognizers, BackendConfig, RecognizerSet, RecognizerSettings};
#[cfg(feature = "tesseract")]
pub use tesseract::TesseractRecognizer;

use bubble_common::Detection;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Detection-stage settings forwarded to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Pixel threshold for the text detection map
    #[serde(default = "default_det_thresh")]
    pub det_thresh: f32,
    /// Minimum mean score for a detected box to be kept
    #[serde(default = "default_box_thresh")]
    pub box_thresh: f32,
    /// How far detected regions are expanded before recognition
    #[serde(default = "default_unclip_ratio")]
    pub unclip_ratio: f32,
    /// Let the engine classify and rotate upside-down text lines
    #[serde(default = "default_textline_orientation")]
    pub use_textline_orientation: bool,
}

fn default_det_thresh() -> f32 {
    0.25
}

fn default_box_thresh() -> f32 {
    0.55
}

fn default_unclip_ratio() -> f32 {
    1.6
}

fn default_textline_orientation() -> bool {
    true
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            det_thresh: default_det_thresh(),
            box_thresh: default_box_thresh(),
            unclip_ratio: default_unclip_ratio(),
            use_textline_orientation: default_textline_orientation(),
        }
    }
}

/// Errors raised while invoking a recognizer on one tile
///
/// All of these are recoverable at tile scope except `NoLanguages`, which
/// only `RecognizerSet` construction produces.
#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("Failed to start OCR command '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OCR command exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    #[error("OCR command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed OCR output: {0}")]
    MalformedOutput(String),

    #[error("OCR engine error: {0}")]
    Engine(String),

    #[error("Failed to write tile artifact: {0}")]
    Artifact(String),

    #[error("No OCR language selected")]
    NoLanguages,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Normalized result of one recognizer invocation
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RecognitionOutput {
    /// Engine ran but reported nothing usable
    #[default]
    NoDetections,
    Detections(Vec<Detection>),
}

impl RecognitionOutput {
    /// Collapse an empty detection list into `NoDetections`
    pub fn from_detections(detections: Vec<Detection>) -> Self {
        if detections.is_empty() {
            Self::NoDetections
        } else {
            Self::Detections(detections)
        }
    }

    #[must_use]
    pub fn detections(&self) -> &[Detection] {
        match self {
            Self::NoDetections => &[],
            Self::Detections(detections) => detections,
        }
    }

    #[must_use]
    pub fn into_detections(self) -> Vec<Detection> {
        match self {
            Self::NoDetections => Vec::new(),
            Self::Detections(detections) => detections,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.detections().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One OCR engine instance bound to one language
///
/// Implementations are used sequentially; the pipeline never calls
/// `recognize` concurrently on the same instance.
pub trait TextRecognizer {
    /// Language this instance was built for, as configured
    fn language(&self) -> &str;

    /// Run detection and recognition on one tile
    fn recognize(&self, tile: &DynamicImage) -> Result<RecognitionOutput, RecognitionError>;
}

/// Map a configured language name to PaddleOCR's `lang` value
pub fn paddle_language_code(language: &str) -> &str {
    match language.to_lowercase().as_str() {
        "korean" | "ko" | "kor" => "korean",
        "english" | "en" | "eng" => "en",
        "japanese" | "ja" | "jpn" => "japan",
        "chinese" | "zh" | "ch" | "chi_sim" => "ch",
        "french" | "fr" | "fra" => "fr",
        "german" | "de" | "deu" => "german",
        "spanish" | "es" | "spa" => "es",
        _ => language,
    }
}

/// Map a configured language name to a Tesseract traineddata code
pub fn tesseract_language_code(language: &str) -> &str {
    match language.to_lowercase().as_str() {
        "korean" | "ko" | "kor" => "kor",
        "english" | "en" | "eng" => "eng",
        "japanese" | "ja" | "jpn" => "jpn",
        "chinese" | "zh" | "ch" | "chi_sim" => "chi_sim",
        "french" | "fr" | "fra" => "fra",
        "german" | "de" | "deu" => "deu",
        "spanish" | "es" | "spa" => "spa",
        _ => language,
    }
}
