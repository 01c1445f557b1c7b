fn main() {
    // Fetch the oar-ocr recognition model and dictionary into models/ when
    // they are missing. The two plate localization models (plate_det.onnx,
    // plate_text_det.onnx) come from the training run and must be placed in
    // models/ by hand; the app reports them at startup if absent.
    download_models();

    tauri_build::build();
}

const MODEL_BASE: &str = "https://github.com/GreatV/oar-ocr/releases/download/v0.3.0";

const MODELS: &[&str] = &["pp-ocrv5_mobile_rec.onnx", "ppocrv5_dict.txt"];

fn download_models() {
    // CARGO_MANIFEST_DIR keeps the path correct no matter where cargo runs.
    let manifest = std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set");
    let models_dir = std::path::Path::new(&manifest).join("models");
    std::fs::create_dir_all(&models_dir).expect("could not create models/");

    for filename in MODELS {
        let dest = models_dir.join(filename);

        // Re-run this script if a model file is removed.
        println!("cargo:rerun-if-changed=models/{filename}");

        if dest.exists() {
            continue;
        }

        let url = format!("{MODEL_BASE}/{filename}");
        println!("cargo:warning=oar-ocr: downloading {filename}…");

        // An offline build still compiles; the missing model is reported at
        // startup instead.
        let resp = match ureq::get(&url).call() {
            Ok(r) => r,
            Err(e) => {
                println!("cargo:warning=oar-ocr: could not download {filename}: {e}");
                continue;
            }
        };

        let mut file = match std::fs::File::create(&dest) {
            Ok(f) => f,
            Err(e) => {
                println!("cargo:warning=oar-ocr: could not create {filename}: {e}");
                continue;
            }
        };

        if let Err(e) = std::io::copy(&mut resp.into_reader(), &mut file) {
            println!("cargo:warning=oar-ocr: failed to write {filename}: {e}");
            let _ = std::fs::remove_file(&dest);
            continue;
        }

        println!("cargo:warning=oar-ocr: {filename} ready");
    }
}
