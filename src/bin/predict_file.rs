//! predict_file - upload an existing image to the prediction service.
//!
//! Sends the file as the `file` field of `POST /predict` and prints the filename, predicted
//! class, confidence and the cache-busted reference image URL.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sign_capture::capture::EncodedImage;
use sign_capture::{CaptureConfig, DisplayState, PredictionService, SubmitMode};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "predict_file",
    about = "Classify an image file with the sign prediction service"
)]
struct Args {
    /// Image to upload (JPEG or PNG)
    #[arg(value_name = "PATH")]
    file: PathBuf,

    /// Prediction service root, e.g. http://127.0.0.1:8000
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = ui::Ui::from_args(&args.ui, std::io::stderr().is_terminal());

    let mut config = CaptureConfig::load()?;
    if let Some(endpoint) = &args.endpoint {
        config.upload.endpoint = endpoint.clone();
    }
    if let Some(secs) = args.timeout_secs {
        config.upload.timeout = Duration::from_secs(secs);
    }
    config.validate()?;
    let client = config.upload.client()?;

    let image = {
        let _stage = ui.stage("Read image");
        load_image(&args.file)?
    };

    let result = {
        let mut stage = ui.stage("Classify");
        match client.predict_image(&image) {
            Ok(result) => result,
            Err(err) => {
                stage.fail(err.to_string());
                println!("Error: {}", err);
                return Err(err.into());
            }
        }
    };

    let mut display = DisplayState::new();
    display.apply_prediction(&result, SubmitMode::Image);

    println!(
        "Filename: {}",
        result.filename.as_deref().unwrap_or(&image.filename)
    );
    println!("Prediction: {}", result.predicted_class);
    match result.confidence {
        Some(confidence) => println!("Confidence: {:.2}", confidence),
        None => println!("Confidence: n/a"),
    }
    if let Some(image_src) = display.image_src() {
        println!("Image: {}", client.resolve(image_src)?);
    }
    Ok(())
}

fn load_image(path: &Path) -> Result<EncodedImage> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read image file {}", path.display()))?;
    let format = image::guess_format(&bytes)
        .with_context(|| format!("{} is not a recognized image", path.display()))?;
    let content_type = match format {
        image::ImageFormat::Jpeg => "image/jpeg",
        image::ImageFormat::Png => "image/png",
        other => return Err(anyhow!("unsupported image format {:?}", other)),
    };
    let decoded = image::load_from_memory_with_format(&bytes, format)
        .with_context(|| format!("decode {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.jpg")
        .to_string();
    Ok(EncodedImage {
        width: decoded.width(),
        height: decoded.height(),
        bytes,
        filename,
        content_type,
    })
}
