pub mod config;
pub mod extract;
pub mod tiles;

use anyhow::{Context as _, Result};
use bubble_extract_core::ExtractionConfig;
use std::path::Path;

/// Configuration from `--config`, or defaults
pub fn load_config(path: Option<&Path>) -> Result<ExtractionConfig> {
    match path {
        Some(path) => ExtractionConfig::from_yaml(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(ExtractionConfig::default()),
    }
}
