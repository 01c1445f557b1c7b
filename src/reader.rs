use crate::capture::CaptureState;
use crate::detect::{best_detection, crop_region};
use crate::ocr::read_plate_text;
use crate::plate;
use crate::{Pipeline, PipelineState};
use base64::Engine;
use image::{codecs::png::PngEncoder, DynamicImage, ImageEncoder, RgbImage};
use serde::Serialize;

/// Outcome of one plate read. `text` is `None` when a plate was found but no
/// text could be recognized on it — the UI shows its placeholder for that,
/// distinct from the error cases (no frame, no plate) which fail the command.
#[derive(Debug, Serialize, Clone)]
pub struct PlateReading {
    pub text: Option<String>,
    pub confidence: f64,
    pub engine: String,
    /// Base64 PNG of the cropped plate, for display next to the text field.
    pub plate_preview: Option<String>,
}

/// Read the plate from the most recent captured frame, reusing the boxes the
/// acquisition loop already computed for it.
#[tauri::command]
pub fn read_plate(
    pipeline: tauri::State<'_, Pipeline>,
    capture: tauri::State<'_, CaptureState>,
) -> Result<PlateReading, String> {
    let frame = capture
        .slot
        .latest()
        .ok_or_else(|| "no frame available".to_string())?;

    let best = best_detection(&frame.detections)
        .ok_or_else(|| "no license plate detected".to_string())?;

    let img = frame
        .to_image()
        .ok_or_else(|| "frame buffer size mismatch".to_string())?;
    let plate_crop = crop_region(&img, &best.bbox)
        .ok_or_else(|| "plate box lies outside the frame".to_string())?;

    let text_threshold = capture.config.lock().unwrap().text_conf_threshold;
    Ok(read_from_plate_crop(&pipeline.0, plate_crop, text_threshold))
}

/// Run the full pipeline on a still image file: localize the plate, crop it,
/// localize the text strip, recognize.
#[tauri::command]
pub fn read_image(
    path: String,
    pipeline: tauri::State<'_, Pipeline>,
    capture: tauri::State<'_, CaptureState>,
) -> Result<PlateReading, String> {
    let img = image::open(&path)
        .map_err(|e| format!("cannot open image '{path}': {e}"))?
        .to_rgb8();

    let cfg = capture.config.lock().unwrap().clone();
    let detections = {
        let mut detector = pipeline.0.plate_detector.lock().unwrap();
        detector
            .detect(&img, cfg.plate_conf_threshold)
            .map_err(|e| e.to_string())?
    };

    let best = best_detection(&detections)
        .ok_or_else(|| "no license plate detected".to_string())?;
    let plate_crop = crop_region(&img, &best.bbox)
        .ok_or_else(|| "plate box lies outside the image".to_string())?;

    Ok(read_from_plate_crop(&pipeline.0, plate_crop, cfg.text_conf_threshold))
}

/// Apply the confusable-character correction to the current candidate string.
#[tauri::command]
pub fn fix_plate(plate: String) -> Result<String, String> {
    plate::normalize(&plate).map_err(|e| e.to_string())
}

/// Shared tail of `read_plate` and `read_image`: text-region localization on
/// the plate crop, then OCR on the text crop.
fn read_from_plate_crop(
    pipeline: &PipelineState,
    plate_crop: RgbImage,
    text_threshold: f32,
) -> PlateReading {
    let preview = encode_png_b64(&plate_crop);

    let text_dets = {
        let mut detector = pipeline.text_detector.lock().unwrap();
        match detector.detect(&plate_crop, text_threshold) {
            Ok(dets) => dets,
            Err(e) => {
                eprintln!("text-region detection failed: {e}");
                Vec::new()
            }
        }
    };

    let Some(best) = best_detection(&text_dets).copied() else {
        eprintln!("no text region detected on the plate");
        return empty_reading(preview);
    };

    let Some(text_crop) = crop_region(&plate_crop, &best.bbox) else {
        eprintln!("text box lies outside the plate crop");
        return empty_reading(preview);
    };

    match read_plate_text(&DynamicImage::ImageRgb8(text_crop), &pipeline.engines) {
        Some(result) => PlateReading {
            text: Some(result.text),
            confidence: result.confidence,
            engine: result.engine_name,
            plate_preview: preview,
        },
        None => empty_reading(preview),
    }
}

fn empty_reading(preview: Option<String>) -> PlateReading {
    PlateReading {
        text: None,
        confidence: 0.0,
        engine: String::new(),
        plate_preview: preview,
    }
}

fn encode_png_b64(img: &RgbImage) -> Option<String> {
    let mut png: Vec<u8> = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgb8)
        .ok()?;
    Some(base64::engine::general_purpose::STANDARD.encode(&png))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_plate_normalizes_a_misread() {
        assert_eq!(fix_plate("A8C1234".to_string()).unwrap(), "ABC1234");
    }

    #[test]
    fn fix_plate_rejects_short_input_with_a_message() {
        let err = fix_plate("AB12".to_string()).unwrap_err();
        assert!(err.contains("too short"));
    }

    #[test]
    fn encode_png_b64_produces_a_payload() {
        let img = RgbImage::new(8, 8);
        let b64 = encode_png_b64(&img).unwrap();
        assert!(!b64.is_empty());
    }
}
