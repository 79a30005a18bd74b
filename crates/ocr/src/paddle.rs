//! PaddleOCR result shape
//!
//! PaddleOCR's `predict` yields one result per input page, each carrying
//! parallel `rec_texts` / `rec_scores` / `rec_boxes` arrays. Wrappers print
//! either that list, a single result, or results nested under `"res"`.
//! Everything is normalized here, once.

use crate::{RecognitionError, RecognitionOutput};
use bubble_common::{BoundingBox, Detection};
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PaddleResponse {
    Pages(Vec<PageEntry>),
    Single(PageEntry),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PageEntry {
    Wrapped { res: PaddlePage },
    Bare(PaddlePage),
}

impl PageEntry {
    fn into_page(self) -> PaddlePage {
        match self {
            PageEntry::Wrapped { res } => res,
            PageEntry::Bare(page) => page,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PaddlePage {
    #[serde(default)]
    rec_texts: Option<Vec<String>>,
    #[serde(default)]
    rec_scores: Option<Vec<f64>>,
    #[serde(default)]
    rec_boxes: Option<Vec<RawBox>>,
}

/// Either `[x0, y0, x1, y1]` or a polygon of `[x, y]` points
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBox {
    Rect([f64; 4]),
    Polygon(Vec<[f64; 2]>),
}

impl RawBox {
    fn to_bbox(&self) -> Option<BoundingBox> {
        match self {
            RawBox::Rect([x0, y0, x1, y1]) => Some(BoundingBox::new(*x0, *y0, *x1, *y1)),
            RawBox::Polygon(points) => {
                let points: Vec<(f64, f64)> = points.iter().map(|p| (p[0], p[1])).collect();
                BoundingBox::from_points(&points)
            }
        }
    }
}

/// Parse recognizer stdout into detections
///
/// Blank output, `null`, and page results without text/box arrays all mean
/// "no detections". Scores missing next to texts and boxes, or JSON that
/// fits none of the accepted shapes, is malformed.
pub fn parse_paddle_json(raw: &str) -> Result<RecognitionOutput, RecognitionError> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "null" {
        return Ok(RecognitionOutput::NoDetections);
    }

    let response: PaddleResponse = serde_json::from_str(raw)
        .map_err(|e| RecognitionError::MalformedOutput(format!("Invalid OCR JSON: {e}")))?;

    let pages: Vec<PaddlePage> = match response {
        PaddleResponse::Pages(entries) => entries.into_iter().map(PageEntry::into_page).collect(),
        PaddleResponse::Single(entry) => vec![entry.into_page()],
    };

    let mut detections = Vec::new();
    for (index, page) in pages.into_iter().enumerate() {
        let (Some(texts), Some(boxes)) = (page.rec_texts, page.rec_boxes) else {
            debug!("Page result {} has no rec_texts/rec_boxes, skipping", index);
            continue;
        };
        let scores = page.rec_scores.ok_or_else(|| {
            RecognitionError::MalformedOutput(format!(
                "Page result {index} has rec_texts but no rec_scores"
            ))
        })?;

        if texts.len() != scores.len() || texts.len() != boxes.len() {
            warn!(
                "Page result {} has mismatched lengths (texts={}, scores={}, boxes={}), truncating",
                index,
                texts.len(),
                scores.len(),
                boxes.len()
            );
        }

        for ((text, score), raw_box) in texts.into_iter().zip(scores).zip(boxes.iter()) {
            match raw_box.to_bbox() {
                Some(bbox) => detections.push(Detection::new(text, score, bbox)),
                None => warn!("Dropping detection '{}' with an empty polygon", text),
            }
        }
    }

    Ok(RecognitionOutput::from_detections(detections))
}
