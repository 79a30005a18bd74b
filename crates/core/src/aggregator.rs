//! Page aggregator
//!
//! Drives one page through tiling, preprocessing, recognition, filtering and
//! clustering, and stitches the per-tile bubble lists back together in
//! reading order.

use crate::cluster::cluster_fragments;
use crate::config::{ClusterConfig, ExtractionConfig, TilingConfig};
use crate::error::{ConfigError, PageError};
use crate::filter::{validate_detections, DetectionFilter};
use crate::image_io::load_page;
use crate::preprocess::Preprocessor;
use crate::tiler::{tile_image, Tile, TileRange};
use bubble_common::Bubble;
use bubble_ocr::{RecognizerSet, TextRecognizer};
use image::{DynamicImage, RgbImage};
use std::path::Path;
use tracing::{debug, warn};

/// Result of one recognizer invocation on one tile
///
/// Any temporary artifacts are already gone by the time this is built.
#[derive(Debug, Clone, PartialEq)]
pub enum TileOutcome {
    /// Bubbles in page coordinates, top-to-bottom
    Recognized(Vec<Bubble>),
    /// Recognition failed; the tile contributes nothing for this language
    Failed(String),
}

impl TileOutcome {
    #[must_use]
    pub fn into_bubbles(self) -> Vec<Bubble> {
        match self {
            TileOutcome::Recognized(bubbles) => bubbles,
            TileOutcome::Failed(_) => Vec::new(),
        }
    }
}

/// Everything extracted from one decoded page
#[derive(Debug, Clone, PartialEq)]
pub struct PageExtraction {
    pub dimensions: (u32, u32),
    pub tile_count: usize,
    /// Recognizer invocations that failed (per tile and language)
    pub failed_recognitions: usize,
    pub bubbles: Vec<Bubble>,
}

/// Per-page pipeline bound to one run's recognizers
pub struct PageAggregator<'a> {
    recognizers: &'a RecognizerSet,
    tiling: TilingConfig,
    preprocessor: Option<Preprocessor>,
    filter: DetectionFilter,
    clustering: ClusterConfig,
}

impl<'a> PageAggregator<'a> {
    /// Validates `config`, so a bad configuration fails here and never
    /// half-way through a chapter
    pub fn new(config: &ExtractionConfig, recognizers: &'a RecognizerSet) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            recognizers,
            tiling: config.tiling.clone(),
            preprocessor: config
                .preprocess
                .enabled
                .then(|| Preprocessor::from_config(&config.preprocess)),
            filter: DetectionFilter::from_config(&config.filter),
            clustering: config.clustering.clone(),
        })
    }

    /// Replace the preprocessor built from the configuration
    ///
    /// `None` hands raw tiles to the recognizers. The replacement is not
    /// validated; if it fails on a tile, that tile goes out unprocessed.
    #[must_use]
    pub fn with_preprocessor(mut self, preprocessor: Option<Preprocessor>) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// Decode and process one page image
    pub fn process_page(&self, path: &Path) -> Result<PageExtraction, PageError> {
        let page = load_page(path)?;
        self.process_image(&page)
    }

    /// Process an already decoded page
    pub fn process_image(&self, page: &RgbImage) -> Result<PageExtraction, PageError> {
        let tiles = tile_image(page, self.tiling.max_tile_height, self.tiling.overlap)?;
        let tile_count = tiles.len();
        debug!(
            "Split {}x{} page into {} tiles",
            page.width(),
            page.height(),
            tile_count
        );

        let mut failed_recognitions = 0;
        let mut per_tile: Vec<(TileRange, Vec<Bubble>)> = Vec::with_capacity(tile_count);

        for tile in tiles {
            let range = tile.range;
            let outcomes = self.process_tile(tile, tile_count);

            let mut bubbles = Vec::new();
            for outcome in outcomes {
                if matches!(outcome, TileOutcome::Failed(_)) {
                    failed_recognitions += 1;
                }
                bubbles.extend(outcome.into_bubbles());
            }
            per_tile.push((range, bubbles));
        }

        let bubbles = if self.clustering.dedupe_overlap {
            dedupe_overlap(per_tile, self.clustering.vertical_threshold)
        } else {
            per_tile.into_iter().flat_map(|(_, b)| b).collect()
        };

        Ok(PageExtraction {
            dimensions: page.dimensions(),
            tile_count,
            failed_recognitions,
            bubbles,
        })
    }

    /// Preprocess a tile once, then run every recognizer on it in order
    fn process_tile(&self, tile: Tile, tile_count: usize) -> Vec<TileOutcome> {
        let Tile {
            index,
            range,
            image,
        } = tile;
        debug!(
            "Tile {}/{} rows {}..{}",
            index + 1,
            tile_count,
            range.start,
            range.end
        );

        let prepared = match &self.preprocessor {
            Some(preprocessor) => match preprocessor.preprocess(&image) {
                Ok(gray) => DynamicImage::ImageLuma8(gray),
                Err(e) => {
                    warn!("Preprocessing failed on tile {}, using raw tile: {}", index + 1, e);
                    DynamicImage::ImageRgb8(image)
                }
            },
            None => DynamicImage::ImageRgb8(image),
        };

        self.recognizers
            .iter()
            .map(|recognizer| self.recognize(recognizer, &prepared, index, range))
            .collect()
    }

    fn recognize(
        &self,
        recognizer: &dyn TextRecognizer,
        prepared: &DynamicImage,
        index: usize,
        range: TileRange,
    ) -> TileOutcome {
        let output = match recognizer.recognize(prepared) {
            Ok(output) => output,
            Err(e) => {
                warn!(
                    "OCR ({}) failed on tile {}: {}",
                    recognizer.language(),
                    index + 1,
                    e
                );
                return TileOutcome::Failed(e.to_string());
            }
        };

        let detections = validate_detections(output.into_detections(), range.height());
        let fragments = self.filter.apply(&detections);
        let offset = f64::from(range.start);
        let bubbles: Vec<Bubble> = cluster_fragments(&fragments, self.clustering.vertical_threshold)
            .into_iter()
            .map(|bubble| bubble.offset_by(offset))
            .collect();

        for bubble in &bubbles {
            debug!("  -> {}", bubble.text);
        }
        TileOutcome::Recognized(bubbles)
    }
}

/// Concatenate tile bubble lists, dropping bubbles seen twice in an overlap
///
/// A bubble from tile `k` is a duplicate when it starts above the end of tile
/// `k - 1` and tile `k - 1` produced the same text within `threshold` pixels.
fn dedupe_overlap(per_tile: Vec<(TileRange, Vec<Bubble>)>, threshold: f64) -> Vec<Bubble> {
    let mut merged = Vec::new();
    let mut previous: Option<(TileRange, Vec<Bubble>)> = None;

    for (range, bubbles) in per_tile {
        let kept: Vec<Bubble> = match &previous {
            Some((prev_range, prev_bubbles)) => bubbles
                .iter()
                .filter(|bubble| {
                    let in_overlap = bubble.top < f64::from(prev_range.end);
                    let seen = prev_bubbles
                        .iter()
                        .any(|p| p.text == bubble.text && (p.top - bubble.top).abs() < threshold);
                    if in_overlap && seen {
                        debug!("Dropping overlap duplicate '{}'", bubble.text);
                        false
                    } else {
                        true
                    }
                })
                .cloned()
                .collect(),
            None => bubbles.clone(),
        };
        merged.extend(kept);
        previous = Some((range, bubbles));
    }

    merged
}
