//! In-process Tesseract 5.x recognizer
//!
//! Works on text-line boxes rather than words: a comic bubble line is the
//! unit the clustering step expects.

use crate::{tesseract_language_code, RecognitionError, RecognitionOutput, TextRecognizer};
use bubble_common::{BoundingBox, Detection};
use image::{DynamicImage, ImageFormat};
use leptess::{LepTess, Variable};
use std::cell::RefCell;
use tracing::debug;

/// Tesseract engine bound to one language, initialized once
pub struct TesseractRecognizer {
    language: String,
    engine: RefCell<LepTess>,
}

impl TesseractRecognizer {
    pub fn new(language: &str, page_segmentation_mode: u32) -> Result<Self, RecognitionError> {
        let code = tesseract_language_code(language);
        let mut engine = LepTess::new(None, code).map_err(|e| {
            RecognitionError::Engine(format!(
                "Failed to initialize Tesseract with language '{}': {}. \
                 Make sure language data is installed (e.g., 'apt install tesseract-ocr-kor')",
                code, e
            ))
        })?;

        engine
            .set_variable(
                Variable::TesseditPagesegMode,
                &page_segmentation_mode.to_string(),
            )
            .map_err(|e| RecognitionError::Engine(format!("Failed to set PSM: {}", e)))?;

        Ok(Self {
            language: language.to_string(),
            engine: RefCell::new(engine),
        })
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn language(&self) -> &str {
        &self.language
    }

    fn recognize(&self, tile: &DynamicImage) -> Result<RecognitionOutput, RecognitionError> {
        let mut lt = self.engine.borrow_mut();

        // leptess expects encoded image data
        let mut png_buf = std::io::Cursor::new(Vec::new());
        tile.write_to(&mut png_buf, ImageFormat::Png)
            .map_err(|e| RecognitionError::Engine(format!("Failed to encode tile to PNG: {}", e)))?;

        lt.set_image_from_mem(png_buf.get_ref())
            .map_err(|e| RecognitionError::Engine(format!("Failed to set image from memory: {}", e)))?;

        // None means a blank tile, not an error
        let boxes = match lt
            .get_component_boxes(leptess::capi::TessPageIteratorLevel_RIL_TEXTLINE, true)
        {
            Some(boxes) => boxes,
            None => return Ok(RecognitionOutput::NoDetections),
        };

        let mut detections = Vec::new();
        for bbox in &boxes {
            let geom = bbox.get_geometry();
            lt.set_rectangle(geom.x, geom.y, geom.w, geom.h);

            let text = lt.get_utf8_text().unwrap_or_default().trim().to_string();
            if text.is_empty() {
                continue;
            }

            // 0-100 scale
            let confidence = f64::from(lt.mean_text_conf()) / 100.0;

            debug!(
                "Tesseract line '{}' ({:.1}%) at y={}",
                text,
                confidence * 100.0,
                geom.y
            );

            detections.push(Detection::new(
                text,
                confidence,
                BoundingBox::new(
                    f64::from(geom.x),
                    f64::from(geom.y),
                    f64::from(geom.x + geom.w),
                    f64::from(geom.y + geom.h),
                ),
            ));
        }

        Ok(RecognitionOutput::from_detections(detections))
    }
}
