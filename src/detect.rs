use anyhow::{bail, Context};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::Path;

/// Square input side expected by the exported detection models.
const MODEL_SIDE: u32 = 640;

/// Candidates overlapping more than this with a better one are suppressed.
const NMS_IOU: f32 = 0.45;

/// Axis-aligned box in the coordinate space of whatever image produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    /// Map the box to another resolution, e.g. from the downscaled inference
    /// frame back onto the full capture frame.
    pub fn scaled(&self, sx: f32, sy: f32) -> BBox {
        BBox {
            x1: self.x1 * sx,
            y1: self.y1 * sy,
            x2: self.x2 * sx,
            y2: self.y2 * sy,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    fn area(&self) -> f32 {
        self.width() * self.height()
    }

    fn iou(&self, other: &BBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One detection candidate: a box plus the model's confidence.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f32,
}

/// Pick the highest-confidence candidate. Ties keep the first encountered —
/// upstream gives no ordering guarantee, so we impose one.
pub fn best_detection(detections: &[Detection]) -> Option<&Detection> {
    detections.iter().fold(None, |best, d| match best {
        Some(b) if d.confidence <= b.confidence => Some(b),
        _ => Some(d),
    })
}

/// Crop `img` to `bbox`, clamping to the image bounds.
/// Returns `None` when the clamped region is empty.
pub fn crop_region(img: &RgbImage, bbox: &BBox) -> Option<RgbImage> {
    let x1 = (bbox.x1.max(0.0) as u32).min(img.width());
    let y1 = (bbox.y1.max(0.0) as u32).min(img.height());
    let x2 = (bbox.x2.max(0.0).ceil() as u32).min(img.width());
    let y2 = (bbox.y2.max(0.0).ceil() as u32).min(img.height());
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(image::imageops::crop_imm(img, x1, y1, x2 - x1, y2 - y1).to_image())
}

/// Single-class object detector backed by an exported YOLO ONNX model.
///
/// Used for both localization stages: the plate on the frame, and the text
/// strip on the plate crop. The model is treated as a black box; this wrapper
/// only resizes the input, decodes the `[1, 4+nc, anchors]` output and
/// filters it by confidence and overlap.
pub struct YoloDetector {
    session: Session,
    name: String,
}

impl YoloDetector {
    pub fn load(model_path: &Path) -> anyhow::Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path)
            .with_context(|| format!("loading detection model {}", model_path.display()))?;
        let name = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "detector".to_string());
        Ok(YoloDetector { session, name })
    }

    /// Detect objects in `img`, returning NMS-filtered candidates with
    /// confidence ≥ `conf_threshold`, in `img` pixel coordinates.
    pub fn detect(&mut self, img: &RgbImage, conf_threshold: f32) -> anyhow::Result<Vec<Detection>> {
        let (iw, ih) = (img.width(), img.height());
        if iw == 0 || ih == 0 {
            bail!("empty image handed to detector '{}'", self.name);
        }

        let resized = DynamicImage::ImageRgb8(img.clone())
            .resize_exact(MODEL_SIDE, MODEL_SIDE, FilterType::Triangle)
            .to_rgb8();

        // HWC u8 → CHW f32 in [0, 1]
        let side = MODEL_SIDE as usize;
        let mut data = vec![0.0f32; 3 * side * side];
        for (x, y, px) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                data[c * side * side + y * side + x] = px[c] as f32 / 255.0;
            }
        }

        let shape = [1_usize, 3, side, side];
        let input = Value::from_array((shape.as_slice(), data))?;
        let outputs = self.session.run(ort::inputs!["images" => input])?;
        let (out_shape, out_data) = outputs[0].try_extract_tensor::<f32>()?;

        if out_shape.len() != 3 {
            bail!(
                "detector '{}' produced unexpected output rank {:?}",
                self.name,
                out_shape
            );
        }
        let attrs = out_shape[1] as usize;
        let anchors = out_shape[2] as usize;
        if attrs < 5 {
            bail!("detector '{}' output has {} attributes, need ≥ 5", self.name, attrs);
        }
        let classes = attrs - 4;

        // Scale factors from model space back to the input image.
        let sx = iw as f32 / MODEL_SIDE as f32;
        let sy = ih as f32 / MODEL_SIDE as f32;

        let at = |attr: usize, anchor: usize| out_data[attr * anchors + anchor];

        let mut candidates: Vec<Detection> = Vec::new();
        for a in 0..anchors {
            let confidence = (0..classes)
                .map(|c| at(4 + c, a))
                .fold(f32::NEG_INFINITY, f32::max);
            if confidence < conf_threshold {
                continue;
            }
            let (cx, cy, w, h) = (at(0, a), at(1, a), at(2, a), at(3, a));
            candidates.push(Detection {
                bbox: BBox {
                    x1: cx - w / 2.0,
                    y1: cy - h / 2.0,
                    x2: cx + w / 2.0,
                    y2: cy + h / 2.0,
                }
                .scaled(sx, sy),
                confidence,
            });
        }

        Ok(non_max_suppression(candidates, NMS_IOU))
    }
}

/// Greedy NMS: keep candidates best-first, drop anything overlapping a kept
/// box by more than `iou_threshold`.
fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut kept: Vec<Detection> = Vec::new();
    for cand in candidates {
        if kept.iter().all(|k| k.bbox.iou(&cand.bbox) <= iou_threshold) {
            kept.push(cand);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, conf: f32) -> Detection {
        Detection {
            bbox: BBox { x1, y1, x2, y2 },
            confidence: conf,
        }
    }

    #[test]
    fn scaled_maps_between_resolutions() {
        // 320×240 inference frame → 768×432 capture frame
        let b = BBox { x1: 32.0, y1: 24.0, x2: 64.0, y2: 48.0 };
        let s = b.scaled(768.0 / 320.0, 432.0 / 240.0);
        assert_eq!(s, BBox { x1: 76.8, y1: 43.2, x2: 153.6, y2: 86.4 });
    }

    #[test]
    fn best_detection_is_argmax() {
        let dets = [
            det(0.0, 0.0, 1.0, 1.0, 0.3),
            det(0.0, 0.0, 1.0, 1.0, 0.9),
            det(0.0, 0.0, 1.0, 1.0, 0.5),
        ];
        assert_eq!(best_detection(&dets).unwrap().confidence, 0.9);
        assert!(best_detection(&[]).is_none());
    }

    #[test]
    fn best_detection_tie_keeps_first() {
        let dets = [
            det(0.0, 0.0, 1.0, 1.0, 0.7),
            det(5.0, 5.0, 6.0, 6.0, 0.7),
        ];
        let best = best_detection(&dets).unwrap();
        assert_eq!(best.bbox, dets[0].bbox);
    }

    #[test]
    fn crop_clamps_to_image_bounds() {
        let img = RgbImage::new(100, 50);
        let crop = crop_region(&img, &BBox { x1: 80.0, y1: 30.0, x2: 200.0, y2: 90.0 }).unwrap();
        assert_eq!((crop.width(), crop.height()), (20, 20));
    }

    #[test]
    fn crop_outside_image_is_none() {
        let img = RgbImage::new(100, 50);
        assert!(crop_region(&img, &BBox { x1: 120.0, y1: 0.0, x2: 150.0, y2: 10.0 }).is_none());
        assert!(crop_region(&img, &BBox { x1: 10.0, y1: 10.0, x2: 10.0, y2: 40.0 }).is_none());
    }

    #[test]
    fn nms_suppresses_overlapping_boxes() {
        let kept = non_max_suppression(
            vec![
                det(0.0, 0.0, 10.0, 10.0, 0.9),
                det(1.0, 1.0, 11.0, 11.0, 0.8), // heavy overlap with the first
                det(50.0, 50.0, 60.0, 60.0, 0.7),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.7);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BBox { x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0 };
        let b = BBox { x1: 2.0, y1: 2.0, x2: 3.0, y2: 3.0 };
        assert_eq!(a.iou(&b), 0.0);
    }
}
