//! Tiles command - dump a page's strips and their preprocessed versions
//!
//! Useful when tuning `max_tile_height`, `overlap` and the CLAHE/NLM
//! parameters: what gets written here is exactly what the recognizer sees.

use super::load_config;
use anyhow::{Context as _, Result};
use bubble_extract_core::{load_page, tile_image, Preprocessor};
use clap::Args;
use image::ImageFormat;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Args)]
pub struct TilesCommand {
    /// Page image to split
    #[arg(value_name = "IMAGE")]
    input: PathBuf,

    /// Directory for the tile images
    #[arg(short, long, default_value = "./tiles")]
    output_dir: PathBuf,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tallest strip, in pixels
    #[arg(long)]
    max_tile_height: Option<u32>,

    /// Rows shared by consecutive strips
    #[arg(long)]
    overlap: Option<u32>,

    /// Only write raw tiles
    #[arg(long)]
    no_preprocess: bool,
}

impl TilesCommand {
    pub fn execute(self) -> Result<()> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(height) = self.max_tile_height {
            config.tiling.max_tile_height = height;
        }
        if let Some(overlap) = self.overlap {
            config.tiling.overlap = overlap;
        }
        if self.no_preprocess {
            config.preprocess.enabled = false;
        }
        config.validate().context("Invalid configuration")?;

        let page = load_page(&self.input)
            .with_context(|| format!("Failed to load {}", self.input.display()))?;
        let tiles = tile_image(&page, config.tiling.max_tile_height, config.tiling.overlap)?;
        info!(
            "{}: {}x{} -> {} tiles",
            self.input.display(),
            page.width(),
            page.height(),
            tiles.len()
        );

        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create output directory {}", self.output_dir.display())
        })?;

        let stem = self
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "page".to_string());
        let preprocessor = config
            .preprocess
            .enabled
            .then(|| Preprocessor::from_config(&config.preprocess));

        for tile in &tiles {
            let raw_path = self
                .output_dir
                .join(format!("{stem}_tile{:02}.png", tile.index + 1));
            tile.image
                .save_with_format(&raw_path, ImageFormat::Png)
                .with_context(|| format!("Failed to write {}", raw_path.display()))?;
            info!(
                "Tile {} rows {}..{} -> {}",
                tile.index + 1,
                tile.range.start,
                tile.range.end,
                raw_path.display()
            );

            if let Some(preprocessor) = &preprocessor {
                match preprocessor.preprocess(&tile.image) {
                    Ok(processed) => {
                        let path = self
                            .output_dir
                            .join(format!("{stem}_tile{:02}_preprocessed.png", tile.index + 1));
                        processed
                            .save_with_format(&path, ImageFormat::Png)
                            .with_context(|| format!("Failed to write {}", path.display()))?;
                    }
                    Err(e) => warn!("Preprocessing failed on tile {}: {}", tile.index + 1, e),
                }
            }
        }

        Ok(())
    }
}
