use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_capture_width() -> u32 { 768 }
fn default_capture_height() -> u32 { 432 }
fn default_infer_width() -> u32 { 320 }
fn default_infer_height() -> u32 { 240 }
fn default_detect_every() -> u32 { 1 }
fn default_plate_conf() -> f32 { 0.25 }
fn default_text_conf() -> f32 { 0.25 }

/// Application configuration. Old config files may miss newer fields — every
/// field falls back to its default on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Capture source handed to libavformat (camera device, file, or URL).
    #[serde(default)]
    pub source: String,
    /// Resolution frames are scaled to for display and cropping.
    #[serde(default = "default_capture_width")]
    pub capture_width: u32,
    #[serde(default = "default_capture_height")]
    pub capture_height: u32,
    /// Resolution the plate detector runs at; boxes are scaled back up.
    #[serde(default = "default_infer_width")]
    pub infer_width: u32,
    #[serde(default = "default_infer_height")]
    pub infer_height: u32,
    /// Run plate detection every N frames (1 = every frame).
    #[serde(default = "default_detect_every")]
    pub detect_every: u32,
    /// Confidence floor for plate localization candidates.
    #[serde(default = "default_plate_conf")]
    pub plate_conf_threshold: f32,
    /// Confidence floor for text-region localization candidates.
    #[serde(default = "default_text_conf")]
    pub text_conf_threshold: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            source: String::new(),
            capture_width: default_capture_width(),
            capture_height: default_capture_height(),
            infer_width: default_infer_width(),
            infer_height: default_infer_height(),
            detect_every: default_detect_every(),
            plate_conf_threshold: default_plate_conf(),
            text_conf_threshold: default_text_conf(),
        }
    }
}

#[tauri::command]
pub fn load_config(path: String) -> Result<AppConfig, String> {
    let text = fs::read_to_string(&path).map_err(|e| format!("Cannot read {path}: {e}"))?;
    serde_json::from_str(&text).map_err(|e| format!("Parse error in {path}: {e}"))
}

#[tauri::command]
pub fn save_config(path: String, config: AppConfig) -> Result<(), String> {
    if let Some(parent) = Path::new(&path).parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Cannot create dirs: {e}"))?;
    }
    let text =
        serde_json::to_string_pretty(&config).map_err(|e| format!("Serialise error: {e}"))?;
    fs::write(&path, text).map_err(|e| format!("Cannot write {path}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_capture_tool() {
        let cfg = AppConfig::default();
        assert_eq!((cfg.capture_width, cfg.capture_height), (768, 432));
        assert_eq!((cfg.infer_width, cfg.infer_height), (320, 240));
        assert_eq!(cfg.detect_every, 1);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: AppConfig = serde_json::from_str(r#"{"source": "/dev/video0"}"#).unwrap();
        assert_eq!(cfg.source, "/dev/video0");
        assert_eq!(cfg.capture_width, 768);
        assert_eq!(cfg.plate_conf_threshold, 0.25);
    }

    #[test]
    fn config_roundtrips_through_json() {
        let mut cfg = AppConfig::default();
        cfg.source = "clip.mp4".to_string();
        cfg.detect_every = 5;
        let text = serde_json::to_string(&cfg).unwrap();
        let back: AppConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.source, "clip.mp4");
        assert_eq!(back.detect_every, 5);
    }
}
