//! Detection filter
//!
//! Recognizers hallucinate text from screentone, speed lines and panel
//! borders. What comes back is short and symbol-heavy ("|0", "::", "UU").
//! Real dialogue is rarely a single character. So anything under two
//! characters, anything made only of digits and line-art punctuation, and a
//! short list of observed artifacts are all treated as noise.

use crate::config::FilterConfig;
use bubble_common::{Detection, Fragment};
use tracing::{debug, warn};

/// Exact strings the recognizer is known to produce from artwork
pub const NOISE_TOKENS: &[&str] = &["UU", "Mdo", "00000", "|0", "::", "H"];

/// Characters that, on their own, never make up dialogue
const NOISE_CHARS: &[char] = &['<', '>', '|', '.', '-', '_', '~', '*', ':', '\'', '"'];

/// Whether `text` is recognizer noise, backticks included
#[must_use]
pub fn is_noise(text: &str) -> bool {
    is_noise_with(text, true)
}

/// Whether `text` is recognizer noise
///
/// `backtick_is_noise` adds the backtick to the punctuation class.
#[must_use]
pub fn is_noise_with(text: &str, backtick_is_noise: bool) -> bool {
    let text = text.trim();

    if text.chars().count() < 2 {
        return true;
    }

    let symbols_only = text.chars().all(|c| {
        c.is_ascii_digit() || NOISE_CHARS.contains(&c) || (backtick_is_noise && c == '`')
    });
    if symbols_only {
        return true;
    }

    NOISE_TOKENS.contains(&text)
}

/// Drop detections with impossible geometry for a tile of `tile_height` rows
///
/// A top edge outside `[0, tile_height)` (or not a number at all) means the
/// recognizer's coordinates do not belong to this tile.
pub fn validate_detections(detections: Vec<Detection>, tile_height: u32) -> Vec<Detection> {
    let limit = f64::from(tile_height);
    detections
        .into_iter()
        .filter(|d| {
            let top = d.bbox.top();
            let valid = top.is_finite() && top >= 0.0 && top < limit && d.confidence.is_finite();
            if !valid {
                warn!(
                    "Rejecting detection '{}' at y={} outside tile of height {}",
                    d.text, top, tile_height
                );
            }
            valid
        })
        .collect()
}

/// Confidence and noise filter over one tile's detections
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionFilter {
    /// Detections must score strictly above this
    pub min_confidence: f64,
    pub backtick_is_noise: bool,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self::from_config(&FilterConfig::default())
    }
}

impl DetectionFilter {
    pub fn from_config(config: &FilterConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            backtick_is_noise: config.backtick_is_noise,
        }
    }

    /// Whether a single detection survives
    #[must_use]
    pub fn accepts(&self, detection: &Detection) -> bool {
        let text = detection.text.trim();
        detection.confidence > self.min_confidence
            && !text.is_empty()
            && !is_noise_with(text, self.backtick_is_noise)
    }

    /// Surviving detections as fragments, in input order
    ///
    /// Fragment text is left as recognized; whitespace is normalized when
    /// fragments are merged into bubbles.
    pub fn apply(&self, detections: &[Detection]) -> Vec<Fragment> {
        let fragments: Vec<Fragment> = detections
            .iter()
            .filter(|d| self.accepts(d))
            .map(Fragment::from)
            .collect();

        debug!(
            "Filter kept {}/{} detections",
            fragments.len(),
            detections.len()
        );
        fragments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bubble_common::BoundingBox;

    fn det(text: &str, confidence: f64, top: f64) -> Detection {
        Detection::new(text, confidence, BoundingBox::new(0.0, top, 100.0, top + 20.0))
    }

    #[test]
    fn test_noise_tokens_are_noise() {
        for token in NOISE_TOKENS {
            assert!(is_noise(token), "{token} should be noise");
            assert!(is_noise_with(token, false), "{token} should be noise");
        }
    }

    #[test]
    fn test_dialogue_is_not_noise() {
        assert!(!is_noise("안녕하세요"));
        assert!(!is_noise("뭐?"));
        assert!(!is_noise("Hi"));
        assert!(!is_noise("No way!"));
        assert!(!is_noise("2 days"));
    }

    #[test]
    fn test_short_text_is_noise() {
        assert!(is_noise(""));
        assert!(is_noise("   "));
        assert!(is_noise("아"));
        assert!(is_noise("  x  "));
    }

    #[test]
    fn test_symbol_runs_are_noise() {
        assert!(is_noise("123"));
        assert!(is_noise("..."));
        assert!(is_noise("<>|"));
        assert!(is_noise("~~*~~"));
        assert!(is_noise("'\""));
        assert!(is_noise(" -_- "));
    }

    #[test]
    fn test_backtick_variant() {
        assert!(is_noise_with("``", true));
        assert!(!is_noise_with("``", false));
        assert!(is_noise_with("1`2", true));
    }

    #[test]
    fn test_confidence_must_exceed_minimum() {
        let filter = DetectionFilter::default();
        assert!(!filter.accepts(&det("안녕하세요", 0.70, 0.0)));
        assert!(filter.accepts(&det("안녕하세요", 0.7001, 0.0)));
        assert!(!filter.accepts(&det("안녕하세요", 0.2, 0.0)));
    }

    #[test]
    fn test_apply_keeps_order_and_raw_text() {
        let filter = DetectionFilter::default();
        let detections = vec![
            det("  둘째  ", 0.95, 300.0),
            det("UU", 0.99, 10.0),
            det("첫째", 0.91, 40.0),
            det("흐릿한", 0.5, 50.0),
        ];
        let fragments = filter.apply(&detections);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].text, "  둘째  ");
        assert_eq!(fragments[0].vertical_position, 300.0);
        assert_eq!(fragments[1].text, "첫째");
        assert_eq!(fragments[1].confidence, 0.91);
    }

    #[test]
    fn test_custom_threshold() {
        let filter = DetectionFilter {
            min_confidence: 0.9,
            backtick_is_noise: true,
        };
        assert!(!filter.accepts(&det("안녕하세요", 0.85, 0.0)));
        assert!(filter.accepts(&det("안녕하세요", 0.95, 0.0)));
    }

    #[test]
    fn test_validate_rejects_out_of_tile() {
        let detections = vec![
            det("inside", 0.9, 40.0),
            det("below", 0.9, 3050.0),
            det("edge", 0.9, 3000.0),
            det("above", 0.9, -5.0),
            det("nan", 0.9, f64::NAN),
            det("last row", 0.9, 2999.0),
        ];
        let kept = validate_detections(detections, 3000);
        let texts: Vec<_> = kept.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["inside", "last row"]);
    }
}
