pub mod oar;

use image::DynamicImage;
use rayon::prelude::*;

/// Result produced by a single `Recognizer` for one plate text crop.
#[derive(Clone, Default)]
pub struct OcrResult {
    pub text: String,
    pub confidence: f64,     // 0.0 – 1.0
    pub preview_b64: String, // base64 PNG of what the engine actually processed
    pub engine_name: String, // e.g. "oar-ocr/rgb"
}

/// Every OCR backend implements this.
/// `recognize` receives the pre-cropped RGB image by reference so the caller
/// does not have to clone the crop for each engine variant.
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;
    fn recognize(&self, crop: &DynamicImage) -> Option<OcrResult>;
}

/// Run every engine on the text crop (in parallel) and return the
/// highest-confidence reading with its text cleaned up, or `None` when no
/// engine recognized anything. On equal confidence the engine listed first
/// wins.
pub fn read_plate_text(crop: &DynamicImage, engines: &[Box<dyn Recognizer>]) -> Option<OcrResult> {
    let mut results: Vec<OcrResult> = engines
        .par_iter()
        .filter_map(|e| e.recognize(crop))
        .collect();

    for r in &results {
        eprintln!("[ocr]  {:14}  {:?}  conf={:.3}", r.engine_name, r.text, r.confidence);
    }

    let idx = best_result_index(&results)?;
    let mut best = results.swap_remove(idx);
    best.text = clean_plate_text(&best.text);
    if best.text.is_empty() {
        return None;
    }
    Some(best)
}

/// Index of the highest-confidence result; ties keep the first encountered.
fn best_result_index(results: &[OcrResult]) -> Option<usize> {
    results
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, r)| match best {
            Some((_, c)) if r.confidence <= c => best,
            _ => Some((i, r.confidence)),
        })
        .map(|(i, _)| i)
}

/// Collapse a raw OCR reading into a single plate candidate: join lines and
/// drop all whitespace (the engines often split "ABC 1234" at the gap).
pub fn clean_plate_text(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(text: &str, confidence: f64) -> OcrResult {
        OcrResult {
            text: text.to_string(),
            confidence,
            ..Default::default()
        }
    }

    #[test]
    fn best_result_picks_highest_confidence() {
        let results = [res("AAA0000", 0.4), res("ABC1234", 0.8), res("AB1234", 0.6)];
        assert_eq!(best_result_index(&results), Some(1));
    }

    #[test]
    fn best_result_tie_keeps_first() {
        let results = [res("FIRST", 0.5), res("SECOND", 0.5)];
        assert_eq!(best_result_index(&results), Some(0));
    }

    #[test]
    fn best_result_of_empty_is_none() {
        assert!(best_result_index(&[]).is_none());
    }

    #[test]
    fn clean_plate_text_strips_all_whitespace() {
        assert_eq!(clean_plate_text("ABC 1234"), "ABC1234");
        assert_eq!(clean_plate_text(" AB C\n1D23 "), "ABC1D23");
        assert_eq!(clean_plate_text("   "), "");
    }
}
