//! Per-run recognizer ownership
//!
//! One engine instance per enabled language, built once before the first
//! page and handed to the pipeline by reference.

use crate::{CommandRecognizer, RecognitionConfig, RecognitionError, TextRecognizer};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Which engine to run, and how to reach it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// External program printing PaddleOCR JSON on stdout
    Command {
        program: PathBuf,
        #[serde(default = "default_command_args")]
        args: Vec<String>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// In-process Tesseract (requires the `tesseract` feature)
    Tesseract {
        #[serde(default = "default_page_segmentation_mode")]
        page_segmentation_mode: u32,
    },
}

fn default_command_program() -> PathBuf {
    PathBuf::from("paddleocr-json")
}

fn default_command_args() -> Vec<String> {
    [
        "--image",
        "{image}",
        "--lang",
        "{lang}",
        "--det-thresh",
        "{det_thresh}",
        "--box-thresh",
        "{box_thresh}",
        "--unclip-ratio",
        "{unclip_ratio}",
        "--textline-orientation",
        "{textline_orientation}",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_page_segmentation_mode() -> u32 {
    // PSM_AUTO (fully automatic)
    3
}

impl BackendConfig {
    /// External command with the default PaddleOCR-style argument list
    pub fn command(program: impl Into<PathBuf>) -> Self {
        Self::Command {
            program: program.into(),
            args: default_command_args(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// In-process Tesseract with automatic page segmentation
    #[must_use]
    pub fn tesseract() -> Self {
        Self::Tesseract {
            page_segmentation_mode: default_page_segmentation_mode(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::command(default_command_program())
    }
}

/// Recognizer section of the extraction config
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecognizerSettings {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub detection: RecognitionConfig,
}

/// Recognizers for every enabled language, in configured order
pub struct RecognizerSet {
    recognizers: Vec<Box<dyn TextRecognizer>>,
}

impl std::fmt::Debug for RecognizerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognizerSet")
            .field("languages", &self.languages())
            .finish()
    }
}

impl RecognizerSet {
    /// At least one recognizer is required
    pub fn new(recognizers: Vec<Box<dyn TextRecognizer>>) -> Result<Self, RecognitionError> {
        if recognizers.is_empty() {
            return Err(RecognitionError::NoLanguages);
        }
        Ok(Self { recognizers })
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn TextRecognizer> {
        self.recognizers.iter().map(|r| r.as_ref())
    }

    #[must_use]
    pub fn languages(&self) -> Vec<&str> {
        self.iter().map(|r| r.language()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.recognizers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recognizers.is_empty()
    }
}

/// Build one recognizer per language from settings
pub fn build_recognizers(
    settings: &RecognizerSettings,
    languages: &[String],
) -> Result<RecognizerSet, RecognitionError> {
    let mut recognizers: Vec<Box<dyn TextRecognizer>> = Vec::with_capacity(languages.len());

    for language in languages {
        let recognizer: Box<dyn TextRecognizer> = match &settings.backend {
            BackendConfig::Command {
                program,
                args,
                timeout_secs,
            } => Box::new(CommandRecognizer::new(
                language.clone(),
                program.clone(),
                args.clone(),
                settings.detection.clone(),
                Duration::from_secs(*timeout_secs),
            )),
            #[cfg(feature = "tesseract")]
            BackendConfig::Tesseract {
                page_segmentation_mode,
            } => Box::new(crate::TesseractRecognizer::new(
                language,
                *page_segmentation_mode,
            )?),
            #[cfg(not(feature = "tesseract"))]
            BackendConfig::Tesseract { .. } => {
                return Err(RecognitionError::Engine(
                    "Tesseract backend requested but bubble-ocr was built without the `tesseract` feature"
                        .to_string(),
                ))
            }
        };
        info!("Initialized OCR engine for language '{}'", language);
        recognizers.push(recognizer);
    }

    RecognizerSet::new(recognizers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backend_is_command() {
        let settings = RecognizerSettings::default();
        match settings.backend {
            BackendConfig::Command {
                program,
                args,
                timeout_secs,
            } => {
                assert_eq!(program, PathBuf::from("paddleocr-json"));
                assert!(args.contains(&"{image}".to_string()));
                assert_eq!(timeout_secs, 300);
            }
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[test]
    fn test_settings_from_yaml() {
        let yaml = "backend:\n  kind: command\n  program: /opt/ocr/run.sh\n  timeout_secs: 60\ndetection:\n  det_thresh: 0.3\n";
        let settings: RecognizerSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            settings.backend,
            BackendConfig::Command {
                program: PathBuf::from("/opt/ocr/run.sh"),
                args: default_command_args(),
                timeout_secs: 60,
            }
        );
        assert_eq!(settings.detection.det_thresh, 0.3);
        assert_eq!(settings.detection.box_thresh, 0.55);
    }

    #[test]
    fn test_one_recognizer_per_language() {
        let languages = vec!["korean".to_string(), "english".to_string()];
        let set = build_recognizers(&RecognizerSettings::default(), &languages).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.languages(), vec!["korean", "english"]);
    }

    #[test]
    fn test_no_languages_is_rejected() {
        let result = build_recognizers(&RecognizerSettings::default(), &[]);
        assert!(matches!(result, Err(RecognitionError::NoLanguages)));
    }

    #[cfg(not(feature = "tesseract"))]
    #[test]
    fn test_tesseract_without_feature() {
        let settings = RecognizerSettings {
            backend: BackendConfig::Tesseract {
                page_segmentation_mode: 3,
            },
            ..Default::default()
        };
        let result = build_recognizers(&settings, &["korean".to_string()]);
        assert!(matches!(result, Err(RecognitionError::Engine(_))));
    }
}
