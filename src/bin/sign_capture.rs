//! sign_capture - live camera loop with on-demand sign classification.
//!
//! Each tick reads a frame, estimates hands and pose and redraws the overlay. Pressing Enter
//! captures the current frame: the selected region (or the normalized keypoints) is sent to
//! the prediction service in the background and the result replaces the previous one.

use anyhow::Result;
use clap::Parser;
use std::io::{BufRead, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use sign_capture::{
    open_source, CaptureClient, CaptureConfig, CaptureDispatcher, CaptureOutcome, DetectionLoop,
    DisplayState, FixedRateTicker, Observation,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "sign_capture",
    about = "Detect hands and pose on a camera feed and classify captured signs"
)]
struct Args {
    /// Camera URL (stub://name, http(s)://host/stream, /dev/videoN)
    #[arg(long, value_name = "URL")]
    camera: Option<String>,

    /// Prediction service root, e.g. http://127.0.0.1:8000
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// What to submit on capture (image|landmarks)
    #[arg(long, value_name = "MODE")]
    mode: Option<String>,

    /// Capture region strategy (detection|fixed)
    #[arg(long, value_name = "STRATEGY")]
    region: Option<String>,

    /// Replay detections from a JSON Lines recording instead of the demo provider
    #[arg(long, value_name = "PATH")]
    replay: Option<PathBuf>,

    /// Stop after N ticks
    #[arg(long, env = "SIGN_CAPTURE_FRAMES")]
    frames: Option<u64>,

    /// Trigger a capture every N ticks without waiting for Enter
    #[arg(long, value_name = "N")]
    capture_every: Option<u64>,

    /// Write the overlay of the last tick as PNG into this directory
    #[arg(long, value_name = "DIR", env = "SIGN_CAPTURE_OVERLAY_DIR")]
    overlay_dir: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

impl Args {
    fn apply(&self, cfg: &mut CaptureConfig) -> Result<()> {
        if let Some(camera) = &self.camera {
            cfg.camera.url = camera.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            cfg.upload.endpoint = endpoint.clone();
        }
        if let Some(mode) = &self.mode {
            cfg.upload.mode = mode.parse()?;
        }
        if let Some(region) = &self.region {
            cfg.set_region(region)?;
        }
        if let Some(path) = &self.replay {
            cfg.landmarks.provider = sign_capture::config::ProviderKind::Replay;
            cfg.landmarks.replay_path = Some(path.clone());
        }
        cfg.validate()
    }
}

enum Event {
    Capture,
    Shutdown,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = ui::Ui::from_args(&args.ui, std::io::stderr().is_terminal());

    let config = {
        let _stage = ui.stage("Load configuration");
        let mut cfg = CaptureConfig::load()?;
        args.apply(&mut cfg)?;
        cfg
    };
    log::info!(
        "sign_capture: camera={} endpoint={} mode={} region={} in_flight={}",
        config.camera.url,
        config.upload.endpoint,
        config.upload.mode,
        config.region.name(),
        config.in_flight
    );

    let source = {
        let mut stage = ui.stage("Open camera");
        match open_source(&config.camera) {
            Ok(source) => source,
            Err(err) => {
                stage.fail(err.to_string());
                return Err(err.into());
            }
        }
    };
    let registry = {
        let mut stage = ui.stage("Load landmark provider");
        let registry = config
            .landmarks
            .registry(config.camera.width, config.camera.height)?;
        stage.detail(registry.list().join(", "));
        registry
    };

    let service = Arc::new(config.upload.client()?);
    let client = Arc::new(CaptureClient::new(
        service,
        config.region,
        config.crop.clone(),
        config.upload.mode,
    ));
    let mut dispatcher = CaptureDispatcher::new(client, config.in_flight);
    let mut display = DisplayState::new();

    let (event_tx, event_rx) = mpsc::channel::<Event>();
    let shutdown_tx = event_tx.clone();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(Event::Shutdown);
    })?;
    std::thread::Builder::new()
        .name("stdin-trigger".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                if line.is_err() || event_tx.send(Event::Capture).is_err() {
                    break;
                }
            }
        })?;

    let mut ticker = FixedRateTicker::new(config.camera.target_fps);
    if let Some(frames) = args.frames {
        ticker = ticker.limit(frames);
    }
    let mut detection = DetectionLoop::new(source, registry, config.landmarks.max_hands);

    eprintln!("Press Enter to capture, Ctrl-C to quit.");
    let ticks = detection.run(&mut ticker, |observation| {
        for outcome in dispatcher.poll() {
            report(&ui, &mut display, outcome);
        }
        let Some(mut capture) = drain_events(&event_rx) else {
            log::info!("shutdown signal received, stopping detection loop...");
            return Ok(false);
        };
        if let Some(every) = args.capture_every.filter(|n| *n > 0) {
            capture |= observation.snapshot.sequence() % every == 0;
        }
        if capture {
            trigger_capture(&ui, &mut dispatcher, &mut display, observation);
        }
        Ok(true)
    })?;
    log::info!(
        "detection loop stopped after {} ticks ({} frames from {})",
        ticks,
        detection.source_stats().frames_captured,
        detection.source_stats().source
    );

    if dispatcher.in_flight() > 0 {
        let _stage = ui.stage("Wait for pending captures");
        let deadline = config.upload.timeout + Duration::from_secs(1);
        while dispatcher.in_flight() > 0 {
            match dispatcher.wait(deadline) {
                Some(outcome) => report(&ui, &mut display, outcome),
                None => break,
            }
        }
    }
    for outcome in dispatcher.poll() {
        report(&ui, &mut display, outcome);
    }

    if let Some(dir) = &args.overlay_dir {
        let _stage = ui.stage("Write overlay");
        write_overlay(&detection, dir)?;
    }

    if let Some(label) = display.label() {
        println!("prediction: {}", label);
    }
    if let Some(image) = display.image_src() {
        println!("image: {}", image);
    }
    Ok(())
}

/// Drain pending events. Returns `None` on shutdown, otherwise whether a capture was requested.
fn drain_events(events: &Receiver<Event>) -> Option<bool> {
    let mut capture = false;
    loop {
        match events.try_recv() {
            Ok(Event::Capture) => capture = true,
            Ok(Event::Shutdown) => return None,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return Some(capture),
        }
    }
}

fn trigger_capture(
    ui: &ui::Ui,
    dispatcher: &mut CaptureDispatcher,
    display: &mut DisplayState,
    observation: &Observation,
) {
    if !observation.snapshot.capture_enabled() {
        log::warn!(
            "capture ignored: no hand detected in frame {}",
            observation.snapshot.sequence()
        );
        return;
    }
    match dispatcher.submit(&observation.frame, &observation.snapshot) {
        Ok(id) => log::info!(
            "capture #{} started from frame {}",
            id,
            observation.snapshot.sequence()
        ),
        Err(err) => {
            log::warn!("capture rejected: {}", err);
            display.apply_error(&err);
            ui.status(display.error().unwrap_or_default());
        }
    }
}

fn report(ui: &ui::Ui, display: &mut DisplayState, outcome: CaptureOutcome) {
    match &outcome.result {
        Ok(result) => {
            display.apply_prediction(result, outcome.mode);
            log::info!(
                "capture #{} ({}) classified as {} in {:?}",
                outcome.id,
                outcome.mode,
                result.predicted_class,
                outcome.elapsed
            );
            let label = display.label().unwrap_or_default();
            match display.image_src() {
                Some(image) => ui.status(&format!("{} [{}]", label, image)),
                None => ui.status(label),
            }
        }
        Err(err) => {
            log::error!("capture #{} failed: {}", outcome.id, err);
            display.apply_error(err);
            ui.status(display.error().unwrap_or_default());
        }
    }
}

fn write_overlay(detection: &DetectionLoop, dir: &Path) -> Result<()> {
    let (Some(observation), Some(overlay)) = (detection.latest(), detection.overlay()) else {
        log::warn!("no frame captured; overlay not written");
        return Ok(());
    };
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!(
        "overlay-{:06}.png",
        observation.snapshot.sequence()
    ));
    overlay.save_png(&observation.frame, &path)?;
    log::info!(
        "overlay with {} markers written to {}",
        observation.markers,
        path.display()
    );
    Ok(())
}
