use base64::Engine;
use image::{codecs::png::PngEncoder, imageops::FilterType, DynamicImage, ImageEncoder};
use oar_ocr::predictors::TextRecognitionPredictor;
use std::sync::Arc;

use super::{OcrResult, Recognizer};

/// Minimum height fed to PP-OCRv5 mobile recognition (the model normalises
/// its input to 48 px tall; shorter plate strips read poorly).
const MIN_HEIGHT: u32 = 48;

pub struct RecPipeline {
    rec: TextRecognitionPredictor,
}

// The ORT session inside the predictor is stateless between calls and safe
// to share across rayon threads.
unsafe impl Send for RecPipeline {}
unsafe impl Sync for RecPipeline {}

/// Build a recognition-only pipeline from on-disk ONNX model and dict files.
/// Text localization is a separate YOLO stage, so no detection step here.
pub fn build_pipeline(rec_model: &str, dict: &str) -> Result<RecPipeline, String> {
    let rec = TextRecognitionPredictor::builder()
        .dict_path(dict)
        // score_threshold(0) — candidate selection happens in read_plate_text
        .score_threshold(0.0)
        .build(rec_model)
        .map_err(|e| e.to_string())?;
    Ok(RecPipeline { rec })
}

/// Colour space presented to the recognition model. Plates are high-contrast,
/// so a grayscale pass sometimes beats RGB on glare or coloured borders.
pub enum ColorMode {
    Rgb,
    Grayscale,
}

pub struct OarEngine {
    pub pipeline: Arc<RecPipeline>,
    pub color_mode: ColorMode,
}

impl Recognizer for OarEngine {
    fn name(&self) -> &str {
        match self.color_mode {
            ColorMode::Rgb => "oar-ocr/rgb",
            ColorMode::Grayscale => "oar-ocr/gray",
        }
    }

    fn recognize(&self, crop: &DynamicImage) -> Option<OcrResult> {
        let img = match self.color_mode {
            ColorMode::Rgb => crop.to_rgb8(),
            ColorMode::Grayscale => DynamicImage::ImageLuma8(crop.to_luma8()).to_rgb8(),
        };

        let (orig_w, orig_h) = (img.width(), img.height());

        // Upscale text strips shorter than the model's working height.
        let img = if orig_h < MIN_HEIGHT && orig_h > 0 {
            let scale = (MIN_HEIGHT + orig_h - 1) / orig_h;
            DynamicImage::ImageRgb8(img)
                .resize(orig_w * scale, orig_h * scale, FilterType::Lanczos3)
                .to_rgb8()
        } else {
            img
        };

        // Encode a preview of exactly what the model receives; the UI shows
        // it next to the recognized text.
        let preview = {
            let mut png = Vec::new();
            if PngEncoder::new(&mut png)
                .write_image(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgb8)
                .is_ok()
            {
                base64::engine::general_purpose::STANDARD.encode(&png)
            } else {
                String::new()
            }
        };

        let result = match self.pipeline.rec.predict(vec![img]) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("[oar] predict error: {e}");
                return None;
            }
        };

        let text = result.texts.into_iter().next()?;
        let score = result.scores.into_iter().next().unwrap_or(0.0);

        eprintln!("[oar] {} result: {:?} conf={score:.3}", self.name(), text);

        if text.is_empty() {
            return None;
        }

        Some(OcrResult {
            text,
            confidence: score as f64,
            preview_b64: preview,
            engine_name: self.name().to_string(),
        })
    }
}
