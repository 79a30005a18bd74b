//! Bubble Extract Core - dialogue reconstruction for vertical comics
//!
//! Takes long scroll pages, cuts them into overlapping strips, cleans each
//! strip up, runs OCR through a [`bubble_ocr::TextRecognizer`], throws away
//! recognizer noise and regroups the surviving text lines into speech
//! bubbles in reading order.
//!
//! ```text
//! page -> tiler -> preprocess -> recognize -> validate/filter -> cluster
//!      -> aggregator (dedupe, concatenate) -> run summary -> document
//! ```

pub mod aggregator;
pub mod cluster;
pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod image_io;
pub mod preprocess;
pub mod run;
pub mod tiler;

pub use aggregator::{PageAggregator, PageExtraction, TileOutcome};
pub use cluster::{cluster_fragments, normalize_whitespace};
pub use config::{
    ClusterConfig, ExtractionConfig, FilterConfig, OutputConfig, PreprocessConfig, TilingConfig,
};
pub use document::{
    default_output_path, emitter_for, DocumentEmitter, DocumentError, ExtractionDocument,
    OutputFormat, NO_TEXT_MARKER,
};
pub use error::{ConfigError, PageError};
pub use filter::{is_noise, is_noise_with, validate_detections, DetectionFilter, NOISE_TOKENS};
pub use image_io::{discover_pages, load_page};
pub use preprocess::{PreprocessError, Preprocessor};
pub use run::{ExtractionRun, PageProgress, RunReport, RunSummary};
pub use tiler::{tile_image, tile_ranges, Tile, TileRange};
