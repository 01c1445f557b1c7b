use crate::config::AppConfig;
use crate::detect::Detection;
use crate::Pipeline;
use base64::Engine;
use playa_ffmpeg as ffmpeg;
use playa_ffmpeg::{
    codec::context::Context as CodecCtx,
    format::Pixel,
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{context::Context as SwsCtx, flag::Flags},
};
use image::{codecs::jpeg::JpegEncoder, ImageEncoder, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

#[derive(Serialize)]
pub struct SourceInfo {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

/// Probe a capture source (video file, stream URL, or a camera device the
/// platform exposes through libavformat) without starting the loop.
#[tauri::command]
pub fn get_source_info(source: String) -> Result<SourceInfo, String> {
    ffmpeg::init().map_err(|e| e.to_string())?;

    let ictx = ffmpeg::format::input(&source)
        .map_err(|e| format!("cannot open '{source}': {e}"))?;

    let stream = ictx
        .streams()
        .best(Type::Video)
        .ok_or_else(|| "no video stream found".to_string())?;

    let fps = fps_or_default(stream.avg_frame_rate(), &source);

    let (width, height) = {
        let ctx = CodecCtx::from_parameters(stream.parameters())
            .map_err(|e| format!("codec context: {e}"))?;
        let dec = ctx
            .decoder()
            .video()
            .map_err(|e| format!("video decoder: {e}"))?;
        (dec.width(), dec.height())
    };

    Ok(SourceInfo { fps, width, height })
}

fn fps_or_default(r: ffmpeg::Rational, source: &str) -> f64 {
    if r.1 != 0 && r.0 > 0 {
        r.0 as f64 / r.1 as f64
    } else {
        eprintln!("warning: could not read FPS from '{source}', defaulting to 30");
        30.0
    }
}

// ── Latest-frame slot ─────────────────────────────────────────────────────────

/// The most recent frame the acquisition loop produced, plus the plate boxes
/// found on it (in frame pixel coordinates).
pub struct CapturedFrame {
    pub rgb: Vec<u8>, // RGB24, width × height × 3
    pub width: u32,
    pub height: u32,
    pub detections: Vec<Detection>,
}

impl CapturedFrame {
    pub fn to_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.rgb.clone())
    }
}

/// Single-slot overwrite channel between the acquisition loop and everyone
/// else. The producer replaces the `Arc`, readers clone it; a frame that was
/// never read is simply dropped — no queue, no backpressure.
#[derive(Default)]
pub struct FrameSlot(Mutex<Option<Arc<CapturedFrame>>>);

impl FrameSlot {
    pub fn store(&self, frame: CapturedFrame) {
        *self.0.lock().unwrap() = Some(Arc::new(frame));
    }

    pub fn latest(&self) -> Option<Arc<CapturedFrame>> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        *self.0.lock().unwrap() = None;
    }
}

/// Capture state shared through Tauri: the running flag checked by the loop
/// between frames, the frame slot, and the config the loop was started with.
pub struct CaptureState {
    pub running: Arc<AtomicBool>,
    pub slot: Arc<FrameSlot>,
    pub config: Mutex<AppConfig>,
}

impl Default for CaptureState {
    fn default() -> Self {
        CaptureState {
            running: Arc::new(AtomicBool::new(false)),
            slot: Arc::new(FrameSlot::default()),
            config: Mutex::new(AppConfig::default()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CaptureParams {
    pub source: String,
    #[serde(default)]
    pub config: AppConfig,
}

#[tauri::command]
pub fn start_capture(
    params: CaptureParams,
    pipeline: tauri::State<'_, Pipeline>,
    capture: tauri::State<'_, CaptureState>,
) -> Result<(), String> {
    if capture.running.swap(true, Ordering::Relaxed) {
        return Err("capture already running".to_string());
    }

    *capture.config.lock().unwrap() = params.config.clone();
    capture.slot.clear();

    let running = capture.running.clone();
    let slot = capture.slot.clone();
    let pipeline = pipeline.0.clone();

    std::thread::spawn(move || {
        if let Err(e) = run_capture(&params.source, &params.config, &pipeline, &slot, &running) {
            eprintln!("capture loop stopped: {e}");
        }
        running.store(false, Ordering::Relaxed);
    });

    Ok(())
}

#[tauri::command]
pub fn stop_capture(capture: tauri::State<'_, CaptureState>) {
    capture.running.store(false, Ordering::Relaxed);
}

/// The acquisition loop. Decodes frames from `source`, runs plate detection
/// on a downscaled copy every `detect_every` frames, scales the boxes back to
/// capture resolution and overwrites the frame slot. Returns when the source
/// ends or the running flag is cleared; dropping the demuxer and decoder
/// releases the device.
fn run_capture(
    source: &str,
    cfg: &AppConfig,
    pipeline: &crate::PipelineState,
    slot: &FrameSlot,
    running: &AtomicBool,
) -> Result<(), String> {
    ffmpeg::init().map_err(|e| e.to_string())?;

    let mut ictx = ffmpeg::format::input(&source)
        .map_err(|e| format!("cannot open '{source}': {e}"))?;

    let (stream_idx, mut decoder, fps) = {
        let stream = ictx
            .streams()
            .best(Type::Video)
            .ok_or_else(|| "no video stream".to_string())?;
        let idx = stream.index();
        let fps = fps_or_default(stream.avg_frame_rate(), source);
        let ctx = CodecCtx::from_parameters(stream.parameters())
            .map_err(|e| format!("codec context: {e}"))?;
        let dec = ctx
            .decoder()
            .video()
            .map_err(|e| format!("video decoder: {e}"))?;
        (idx, dec, fps)
    };

    // Scale straight to capture resolution while converting to RGB24.
    let (cw, ch) = (cfg.capture_width, cfg.capture_height);
    let mut scaler = SwsCtx::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        Pixel::RGB24,
        cw,
        ch,
        Flags::BILINEAR,
    )
    .map_err(|e| format!("scaler init: {e}"))?;

    let frame_pacing = Duration::from_secs_f64(1.0 / fps.max(1.0));
    let detect_every = cfg.detect_every.max(1) as u64;
    let mut frame_count: u64 = 0;
    let mut last_detections: Vec<Detection> = Vec::new();

    for (stream, packet) in ictx.packets() {
        if !running.load(Ordering::Relaxed) {
            break;
        }
        if stream.index() != stream_idx {
            continue;
        }
        if decoder.send_packet(&packet).is_err() {
            continue;
        }

        let mut decoded = VideoFrame::empty();
        while decoder.receive_frame(&mut decoded).is_ok() {
            let mut rgb_frame = VideoFrame::empty();
            scaler
                .run(&decoded, &mut rgb_frame)
                .map_err(|e| format!("pixel convert: {e}"))?;

            let rgb = flatten_frame(&rgb_frame, cw, ch)?;
            let Some(img) = RgbImage::from_raw(cw, ch, rgb) else {
                continue;
            };

            if frame_count % detect_every == 0 {
                last_detections = detect_plates(&img, cfg, pipeline);
            }
            frame_count += 1;

            slot.store(CapturedFrame {
                rgb: img.into_raw(),
                width: cw,
                height: ch,
                detections: last_detections.clone(),
            });

            // Files decode much faster than real time; pace them so the
            // display behaves like a live feed. Device input blocks on its own.
            std::thread::sleep(frame_pacing);
        }
    }

    Ok(())
}

/// Run plate detection on a downscaled copy of the frame and scale the boxes
/// back up — the model does not need full resolution to localize a plate.
fn detect_plates(img: &RgbImage, cfg: &AppConfig, pipeline: &crate::PipelineState) -> Vec<Detection> {
    let (iw, ih) = (cfg.infer_width.max(1), cfg.infer_height.max(1));
    let small = image::imageops::resize(img, iw, ih, image::imageops::FilterType::Triangle);

    let mut detector = pipeline.plate_detector.lock().unwrap();
    match detector.detect(&small, cfg.plate_conf_threshold) {
        Ok(dets) => {
            let sx = img.width() as f32 / iw as f32;
            let sy = img.height() as f32 / ih as f32;
            dets.into_iter()
                .map(|d| Detection {
                    bbox: d.bbox.scaled(sx, sy),
                    confidence: d.confidence,
                })
                .collect()
        }
        Err(e) => {
            eprintln!("plate detection failed: {e}");
            Vec::new()
        }
    }
}

// ── Display side ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct FramePayload {
    pub image_b64: String, // JPEG
    pub width: u32,
    pub height: u32,
    pub plate_count: usize,
}

/// Return the most recent annotated frame for the display loop, or `None`
/// when the capture has not produced one yet. The frontend polls this on a
/// fixed short interval; skipped frames are intentional.
#[tauri::command]
pub fn get_frame(capture: tauri::State<'_, CaptureState>) -> Result<Option<FramePayload>, String> {
    let Some(frame) = capture.slot.latest() else {
        return Ok(None);
    };
    let mut img = frame
        .to_image()
        .ok_or_else(|| "frame buffer size mismatch".to_string())?;

    annotate(&mut img, &frame.detections);

    let mut jpeg: Vec<u8> = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, 80)
        .write_image(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgb8)
        .map_err(|e| format!("JPEG encode: {e}"))?;

    Ok(Some(FramePayload {
        image_b64: base64::engine::general_purpose::STANDARD.encode(&jpeg),
        width: frame.width,
        height: frame.height,
        plate_count: frame.detections.len(),
    }))
}

/// Draw each detection as a 2 px green rectangle.
fn annotate(img: &mut RgbImage, detections: &[Detection]) {
    let color = Rgb([0u8, 255u8, 0u8]);
    for det in detections {
        let b = &det.bbox;
        let w = b.width().round() as u32;
        let h = b.height().round() as u32;
        if w == 0 || h == 0 {
            continue;
        }
        for t in 0..2i32 {
            let rect = Rect::at(b.x1 as i32 - t, b.y1 as i32 - t)
                .of_size(w + 2 * t as u32, h + 2 * t as u32);
            draw_hollow_rect_mut(img, rect, color);
        }
    }
}

/// Decoded frames keep per-row padding when stride > row width; flatten to a
/// tight RGB24 buffer.
fn flatten_frame(frame: &VideoFrame, width: u32, height: u32) -> Result<Vec<u8>, String> {
    let stride = frame.stride(0);
    let row_bytes = width as usize * 3;
    let data = frame.data(0);

    if stride == row_bytes {
        let expected = row_bytes * height as usize;
        if data.len() < expected {
            return Err(format!(
                "frame buffer too small: {} bytes < {} expected ({}×{}×3)",
                data.len(),
                expected,
                width,
                height
            ));
        }
        return Ok(data[..expected].to_vec());
    }

    let mut flat = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        if end > data.len() {
            return Err(format!(
                "frame row {row} out of bounds (stride={stride}, data.len()={})",
                data.len()
            ));
        }
        flat.extend_from_slice(&data[start..end]);
    }
    Ok(flat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BBox;

    fn frame(w: u32, h: u32) -> CapturedFrame {
        CapturedFrame {
            rgb: vec![0; (w * h * 3) as usize],
            width: w,
            height: h,
            detections: Vec::new(),
        }
    }

    #[test]
    fn slot_starts_empty_and_overwrites() {
        let slot = FrameSlot::default();
        assert!(slot.latest().is_none());

        slot.store(frame(4, 4));
        slot.store(frame(8, 8));
        let latest = slot.latest().unwrap();
        assert_eq!((latest.width, latest.height), (8, 8));

        slot.clear();
        assert!(slot.latest().is_none());
    }

    #[test]
    fn slot_reader_keeps_frame_alive_across_overwrite() {
        let slot = FrameSlot::default();
        slot.store(frame(4, 4));
        let held = slot.latest().unwrap();
        slot.store(frame(8, 8));
        // The reader's snapshot is unaffected by the overwrite.
        assert_eq!(held.width, 4);
        assert_eq!(slot.latest().unwrap().width, 8);
    }

    #[test]
    fn captured_frame_roundtrips_to_image() {
        let f = frame(6, 3);
        let img = f.to_image().unwrap();
        assert_eq!((img.width(), img.height()), (6, 3));
    }

    #[test]
    fn annotate_handles_boxes_partly_outside_frame() {
        let mut img = RgbImage::new(32, 32);
        let dets = [Detection {
            bbox: BBox { x1: -4.0, y1: 28.0, x2: 40.0, y2: 44.0 },
            confidence: 0.9,
        }];
        annotate(&mut img, &dets); // must not panic
        assert!(img.pixels().any(|p| p[1] == 255));
    }
}
