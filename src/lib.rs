mod capture;
mod config;
mod detect;
mod ocr;
mod plate;
mod reader;

use capture::{get_frame, get_source_info, start_capture, stop_capture, CaptureState};
use config::{load_config, save_config};
use detect::YoloDetector;
use ocr::oar::{build_pipeline, ColorMode, OarEngine, RecPipeline};
use ocr::Recognizer;
use reader::{fix_plate, read_image, read_plate};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Model files the pipeline needs, resolved from the models directory.
const PLATE_MODEL: &str = "plate_det.onnx";
const TEXT_MODEL: &str = "plate_text_det.onnx";
const REC_MODEL: &str = "pp-ocrv5_mobile_rec.onnx";
const REC_DICT: &str = "ppocrv5_dict.txt";

/// Everything the detection/OCR pipeline owns: the two localization models
/// and the recognition engines. Built once at startup; a load failure aborts
/// the app with the diagnostic.
pub struct PipelineState {
    pub plate_detector: Mutex<YoloDetector>,
    pub text_detector: Mutex<YoloDetector>,
    pub engines: Vec<Box<dyn Recognizer>>,
}

pub struct Pipeline(pub Arc<PipelineState>);

impl PipelineState {
    pub fn load(models_dir: &Path) -> anyhow::Result<PipelineState> {
        let plate_detector = YoloDetector::load(&models_dir.join(PLATE_MODEL))?;
        let text_detector = YoloDetector::load(&models_dir.join(TEXT_MODEL))?;

        let rec = models_dir.join(REC_MODEL);
        let dict = models_dir.join(REC_DICT);
        let pipeline = build_pipeline(
            rec.to_str().unwrap_or(""),
            dict.to_str().unwrap_or(""),
        )
        .map_err(|e| anyhow::anyhow!("oar-ocr init failed: {e}"))?;

        let pipeline = Arc::new(pipeline);
        let engines = recognition_engines(pipeline);

        eprintln!("pipeline ready (models: {})", models_dir.display());
        Ok(PipelineState {
            plate_detector: Mutex::new(plate_detector),
            text_detector: Mutex::new(text_detector),
            engines,
        })
    }
}

/// The OCR engine variants tried on every text crop, in tie-break order.
fn recognition_engines(pipeline: Arc<RecPipeline>) -> Vec<Box<dyn Recognizer>> {
    vec![
        Box::new(OarEngine {
            pipeline: pipeline.clone(),
            color_mode: ColorMode::Rgb,
        }) as Box<dyn Recognizer>,
        Box::new(OarEngine {
            pipeline,
            color_mode: ColorMode::Grayscale,
        }),
    ]
}

/// Locate the models directory.
/// Dev: models/ next to Cargo.toml (populated by build.rs plus the two
/// plate models exported from the training run).
/// Prod: the Tauri resource directory.
fn find_models_dir(app: &tauri::App) -> Option<PathBuf> {
    use tauri::Manager as _;
    let candidates = [
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models"),
        app.path()
            .resource_dir()
            .map(|d| d.join("models"))
            .unwrap_or_default(),
    ];
    candidates.into_iter().find(|d| {
        [PLATE_MODEL, TEXT_MODEL, REC_MODEL, REC_DICT]
            .iter()
            .all(|f| d.join(f).exists())
    })
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .manage(CaptureState::default())
        .setup(|app| {
            let models_dir = find_models_dir(app).ok_or_else(|| {
                format!(
                    "model files not found: expected {PLATE_MODEL}, {TEXT_MODEL}, \
                     {REC_MODEL} and {REC_DICT} in models/ or the resource directory"
                )
            })?;
            let state = PipelineState::load(&models_dir)?;
            use tauri::Manager as _;
            app.manage(Pipeline(Arc::new(state)));
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            get_source_info,
            start_capture,
            stop_capture,
            get_frame,
            read_plate,
            read_image,
            fix_plate,
            load_config,
            save_config,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
