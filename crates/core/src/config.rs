//! Extraction configuration
//!
//! Every field has a default, so a YAML file only needs the keys it changes.
//! `validate` performs all checks that must stop a run before the first page.

use crate::document::OutputFormat;
use crate::error::ConfigError;
use crate::preprocess::MAX_DENOISE_RADIUS;
use bubble_ocr::RecognizerSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tile geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilingConfig {
    /// Tallest strip handed to the recognizer
    #[serde(default = "default_max_tile_height")]
    pub max_tile_height: u32,
    /// Rows shared by consecutive strips
    #[serde(default = "default_overlap")]
    pub overlap: u32,
}

fn default_max_tile_height() -> u32 {
    3000
}

fn default_overlap() -> u32 {
    200
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            max_tile_height: default_max_tile_height(),
            overlap: default_overlap(),
        }
    }
}

/// Contrast enhancement and denoising applied to each tile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// CLAHE clip limit, relative to a flat histogram
    #[serde(default = "default_clip_limit")]
    pub clip_limit: f32,
    /// CLAHE contextual regions per axis
    #[serde(default = "default_grid_size")]
    pub grid_size: u32,
    /// Non-local-means filter strength `h`
    #[serde(default = "default_denoise_strength")]
    pub denoise_strength: f32,
    /// Half-size of the comparison patch (3 => 7x7)
    #[serde(default = "default_patch_radius")]
    pub patch_radius: u32,
    /// Half-size of the search window (5 => 11x11)
    #[serde(default = "default_search_radius")]
    pub search_radius: u32,
}

fn default_true() -> bool {
    true
}

fn default_clip_limit() -> f32 {
    1.5
}

fn default_grid_size() -> u32 {
    8
}

fn default_denoise_strength() -> f32 {
    7.0
}

fn default_patch_radius() -> u32 {
    3
}

fn default_search_radius() -> u32 {
    5
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            clip_limit: default_clip_limit(),
            grid_size: default_grid_size(),
            denoise_strength: default_denoise_strength(),
            patch_radius: default_patch_radius(),
            search_radius: default_search_radius(),
        }
    }
}

/// Detection filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Detections must score strictly above this
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Treat backticks as punctuation noise too
    #[serde(default = "default_true")]
    pub backtick_is_noise: bool,
}

fn default_min_confidence() -> f64 {
    0.70
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            backtick_is_noise: true,
        }
    }
}

/// Bubble clustering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Max gap (px) between consecutive fragments of one bubble
    #[serde(default = "default_vertical_threshold")]
    pub vertical_threshold: f64,
    /// Drop bubbles recognized twice in the band shared by two tiles
    #[serde(default = "default_true")]
    pub dedupe_overlap: bool,
}

fn default_vertical_threshold() -> f64 {
    100.0
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            vertical_threshold: default_vertical_threshold(),
            dedupe_overlap: true,
        }
    }
}

/// Output document settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
}

fn default_title() -> String {
    "Manhwa Extraction".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            title: default_title(),
            subtitle: None,
        }
    }
}

/// Complete configuration for one extraction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// OCR languages, run in this order on every tile
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default)]
    pub tiling: TilingConfig,
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub clustering: ClusterConfig,
    #[serde(default)]
    pub recognizer: RecognizerSettings,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_languages() -> Vec<String> {
    vec!["korean".to_string()]
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            tiling: TilingConfig::default(),
            preprocess: PreprocessConfig::default(),
            filter: FilterConfig::default(),
            clustering: ClusterConfig::default(),
            recognizer: RecognizerSettings::default(),
            output: OutputConfig::default(),
        }
    }
}

impl ExtractionConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml(yaml_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(yaml_path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check everything that would make the run meaningless or non-terminating
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tiling = &self.tiling;
        if tiling.max_tile_height == 0 || tiling.overlap >= tiling.max_tile_height {
            return Err(ConfigError::InvalidTiling {
                max_tile_height: tiling.max_tile_height,
                overlap: tiling.overlap,
            });
        }

        if self.languages.iter().all(|l| l.trim().is_empty()) {
            return Err(ConfigError::NoLanguage);
        }

        if !(0.0..=1.0).contains(&self.filter.min_confidence) {
            return Err(ConfigError::InvalidValue {
                field: "filter.min_confidence",
                reason: format!("{} is outside [0, 1]", self.filter.min_confidence),
            });
        }

        let threshold = self.clustering.vertical_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "clustering.vertical_threshold",
                reason: format!("{threshold} must be a positive number of pixels"),
            });
        }

        let pre = &self.preprocess;
        if pre.enabled {
            if pre.grid_size == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "preprocess.grid_size",
                    reason: "must be at least 1".to_string(),
                });
            }
            if !(pre.clip_limit > 0.0) {
                return Err(ConfigError::InvalidValue {
                    field: "preprocess.clip_limit",
                    reason: format!("{} must be positive", pre.clip_limit),
                });
            }
            for (field, radius) in [
                ("preprocess.patch_radius", pre.patch_radius),
                ("preprocess.search_radius", pre.search_radius),
            ] {
                if radius > MAX_DENOISE_RADIUS {
                    return Err(ConfigError::InvalidValue {
                        field,
                        reason: format!("{radius} exceeds the maximum of {MAX_DENOISE_RADIUS}"),
                    });
                }
            }
            if !(pre.denoise_strength >= 0.0) {
                return Err(ConfigError::InvalidValue {
                    field: "preprocess.denoise_strength",
                    reason: format!("{} must not be negative", pre.denoise_strength),
                });
            }
        }

        Ok(())
    }

    /// Languages with blank entries removed
    #[must_use]
    pub fn enabled_languages(&self) -> Vec<String> {
        self.languages
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(ToString::to_string)
            .collect()
    }
}
