//! Error types for the extraction pipeline

use bubble_common::ProcessingError;
use thiserror::Error;

/// Configuration problems detected before any page is processed
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid tiling: overlap ({overlap}px) must be smaller than max tile height ({max_tile_height}px)")]
    InvalidTiling { max_tile_height: u32, overlap: u32 },

    #[error("No OCR language selected")]
    NoLanguage,

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A page that could not be processed; the run records it and moves on
#[derive(Error, Debug)]
pub enum PageError {
    #[error("Unreadable page image: {0}")]
    Unreadable(#[from] ProcessingError),

    #[error("Cannot tile page: {0}")]
    Tiling(#[from] ConfigError),
}
