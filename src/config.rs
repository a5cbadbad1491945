use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::{CropSettings, InFlightPolicy, SubmitMode};
use crate::ingest::{
    CameraConfig, DEFAULT_CAMERA_URL, DEFAULT_FRAME_HEIGHT, DEFAULT_FRAME_WIDTH,
    DEFAULT_TARGET_FPS,
};
use crate::landmarks::{ProviderRegistry, ReplayProvider, ScriptedProvider};
use crate::region::{
    RegionStrategy, DEFAULT_FIXED_HEIGHT_RATIO, DEFAULT_FIXED_TOP_RATIO, DEFAULT_MARGIN,
};
use crate::upload::{HttpPredictionClient, DEFAULT_ENDPOINT, DEFAULT_UPLOAD_TIMEOUT};

pub const CONFIG_ENV: &str = "SIGN_CAPTURE_CONFIG";
pub const DEFAULT_MAX_HANDS: usize = 2;
pub const MAX_HANDS_LIMIT: usize = 4;
pub const MAX_PADDING: u32 = 4096;
const DEMO_STEPS: usize = 90;

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    camera: Option<CameraConfigFile>,
    landmarks: Option<LandmarksConfigFile>,
    region: Option<RegionConfigFile>,
    crop: Option<CropConfigFile>,
    upload: Option<UploadConfigFile>,
    in_flight: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct LandmarksConfigFile {
    provider: Option<String>,
    replay_path: Option<PathBuf>,
    replay_loop: Option<bool>,
    max_hands: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct RegionConfigFile {
    strategy: Option<String>,
    margin: Option<f32>,
    top_ratio: Option<f32>,
    height_ratio: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct CropConfigFile {
    padding: Option<u32>,
    jpeg_quality: Option<u8>,
    filename: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct UploadConfigFile {
    endpoint: Option<String>,
    mode: Option<String>,
    timeout_secs: Option<u64>,
}

/// Which landmark provider feeds the detection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Synthetic hand circling the frame center.
    Demo,
    /// Detections read from a JSON Lines recording.
    Replay,
}

impl ProviderKind {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "demo" | "scripted" => Ok(ProviderKind::Demo),
            "replay" => Ok(ProviderKind::Replay),
            other => Err(anyhow!(
                "unknown landmark provider '{}'; expected demo or replay",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LandmarkSettings {
    pub provider: ProviderKind,
    pub replay_path: Option<PathBuf>,
    pub replay_loop: bool,
    pub max_hands: usize,
}

impl LandmarkSettings {
    /// Build a registry holding the configured provider.
    pub fn registry(&self, frame_width: u32, frame_height: u32) -> Result<ProviderRegistry> {
        let mut registry = ProviderRegistry::new();
        match self.provider {
            ProviderKind::Demo => {
                registry.register(ScriptedProvider::demo(frame_width, frame_height, DEMO_STEPS));
            }
            ProviderKind::Replay => {
                let path = self
                    .replay_path
                    .as_deref()
                    .ok_or_else(|| anyhow!("replay provider requires landmarks.replay_path"))?;
                registry.register(ReplayProvider::open(path, self.replay_loop)?);
            }
        }
        registry.warm_up()?;
        Ok(registry)
    }
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub endpoint: String,
    pub mode: SubmitMode,
    pub timeout: Duration,
}

impl UploadSettings {
    pub fn client(&self) -> Result<HttpPredictionClient> {
        HttpPredictionClient::new(&self.endpoint, self.timeout)
    }
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub camera: CameraConfig,
    pub landmarks: LandmarkSettings,
    pub region: RegionStrategy,
    pub crop: CropSettings,
    pub upload: UploadSettings,
    pub in_flight: InFlightPolicy,
}

impl CaptureConfig {
    /// Defaults, then the file named by `SIGN_CAPTURE_CONFIG`, then `SIGN_CAPTURE_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|path| !path.trim().is_empty());
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a config file without consulting the environment.
    pub fn from_path(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CaptureConfigFile) -> Result<Self> {
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraConfig {
            url: camera_file
                .url
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            width: camera_file.width.unwrap_or(DEFAULT_FRAME_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_FRAME_HEIGHT),
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
        };

        let landmarks_file = file.landmarks.unwrap_or_default();
        let landmarks = LandmarkSettings {
            provider: match landmarks_file.provider.as_deref() {
                Some(name) => ProviderKind::parse(name)?,
                None => ProviderKind::Demo,
            },
            replay_path: landmarks_file.replay_path,
            replay_loop: landmarks_file.replay_loop.unwrap_or(true),
            max_hands: landmarks_file.max_hands.unwrap_or(DEFAULT_MAX_HANDS),
        };

        let region_file = file.region.unwrap_or_default();
        let region = region_strategy(
            region_file.strategy.as_deref().unwrap_or("detection"),
            region_file.margin,
            region_file.top_ratio,
            region_file.height_ratio,
        )?;

        let crop_file = file.crop.unwrap_or_default();
        let defaults = CropSettings::default();
        let crop = CropSettings {
            padding: crop_file.padding.unwrap_or(defaults.padding),
            jpeg_quality: crop_file.jpeg_quality.unwrap_or(defaults.jpeg_quality),
            filename: crop_file.filename.unwrap_or(defaults.filename),
        };

        let upload_file = file.upload.unwrap_or_default();
        let upload = UploadSettings {
            endpoint: upload_file
                .endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            mode: match upload_file.mode.as_deref() {
                Some(mode) => mode.parse()?,
                None => SubmitMode::default(),
            },
            timeout: upload_file
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_UPLOAD_TIMEOUT),
        };

        let in_flight = match file.in_flight.as_deref() {
            Some(policy) => policy.parse()?,
            None => InFlightPolicy::default(),
        };

        Ok(Self {
            camera,
            landmarks,
            region,
            crop,
            upload,
            in_flight,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_value("SIGN_CAPTURE_CAMERA_URL") {
            self.camera.url = url;
        }
        if let Some(endpoint) = env_value("SIGN_CAPTURE_ENDPOINT") {
            self.upload.endpoint = endpoint;
        }
        if let Some(mode) = env_value("SIGN_CAPTURE_MODE") {
            self.upload.mode = mode
                .parse()
                .map_err(|e| anyhow!("SIGN_CAPTURE_MODE: {}", e))?;
        }
        if let Some(provider) = env_value("SIGN_CAPTURE_PROVIDER") {
            self.landmarks.provider = ProviderKind::parse(&provider)?;
        }
        if let Some(path) = env_value("SIGN_CAPTURE_REPLAY_PATH") {
            self.landmarks.replay_path = Some(PathBuf::from(path));
        }
        if let Some(region) = env_value("SIGN_CAPTURE_REGION") {
            self.set_region(&region)?;
        }
        if let Some(margin) = env_value("SIGN_CAPTURE_MARGIN") {
            let parsed: f32 = margin
                .parse()
                .map_err(|_| anyhow!("SIGN_CAPTURE_MARGIN must be a number of pixels"))?;
            match &mut self.region {
                RegionStrategy::Detection { margin } => *margin = parsed,
                RegionStrategy::Fixed { .. } => {
                    log::warn!("SIGN_CAPTURE_MARGIN ignored: fixed region strategy has no margin")
                }
            }
        }
        if let Some(timeout) = env_value("SIGN_CAPTURE_TIMEOUT_SECS") {
            let seconds: u64 = timeout.parse().map_err(|_| {
                anyhow!("SIGN_CAPTURE_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.upload.timeout = Duration::from_secs(seconds);
        }
        if let Some(max_hands) = env_value("SIGN_CAPTURE_MAX_HANDS") {
            self.landmarks.max_hands = max_hands
                .parse()
                .map_err(|_| anyhow!("SIGN_CAPTURE_MAX_HANDS must be an integer"))?;
        }
        if let Some(policy) = env_value("SIGN_CAPTURE_IN_FLIGHT") {
            self.in_flight = policy
                .parse()
                .map_err(|e| anyhow!("SIGN_CAPTURE_IN_FLIGHT: {}", e))?;
        }
        Ok(())
    }

    /// Switch region strategy by name. Settings of the current strategy are kept when the
    /// kind does not change.
    pub fn set_region(&mut self, name: &str) -> Result<()> {
        self.region = match (region_kind(name)?, self.region) {
            (RegionKind::Detection, current @ RegionStrategy::Detection { .. }) => current,
            (RegionKind::Fixed, current @ RegionStrategy::Fixed { .. }) => current,
            (RegionKind::Detection, _) => RegionStrategy::default(),
            (RegionKind::Fixed, _) => RegionStrategy::upper_body(),
        };
        Ok(())
    }

    /// Check ranges and cross-field requirements.
    pub fn validate(&mut self) -> Result<()> {
        self.camera.url = self.camera.url.trim().to_string();
        if self.camera.url.is_empty() {
            return Err(anyhow!("camera url must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!(
                "camera dimensions must be non-zero, got {}x{}",
                self.camera.width,
                self.camera.height
            ));
        }

        if !(1..=MAX_HANDS_LIMIT).contains(&self.landmarks.max_hands) {
            return Err(anyhow!(
                "max_hands must be between 1 and {}, got {}",
                MAX_HANDS_LIMIT,
                self.landmarks.max_hands
            ));
        }
        if self.landmarks.provider == ProviderKind::Replay && self.landmarks.replay_path.is_none()
        {
            return Err(anyhow!("replay provider requires landmarks.replay_path"));
        }

        match self.region {
            RegionStrategy::Detection { margin } => {
                if !margin.is_finite() || margin < 0.0 {
                    return Err(anyhow!("region margin must be a non-negative number"));
                }
            }
            RegionStrategy::Fixed {
                top_ratio,
                height_ratio,
            } => {
                if !(0.0..1.0).contains(&top_ratio) {
                    return Err(anyhow!("region top_ratio must be in [0, 1)"));
                }
                if !(height_ratio > 0.0 && height_ratio <= 1.0) {
                    return Err(anyhow!("region height_ratio must be in (0, 1]"));
                }
            }
        }

        if !(1..=100).contains(&self.crop.jpeg_quality) {
            return Err(anyhow!("jpeg_quality must be between 1 and 100"));
        }
        if self.crop.padding > MAX_PADDING {
            return Err(anyhow!(
                "crop padding must be at most {} pixels, got {}",
                MAX_PADDING,
                self.crop.padding
            ));
        }
        if self.crop.filename.trim().is_empty() {
            return Err(anyhow!("upload filename must not be empty"));
        }

        if self.upload.timeout.is_zero() {
            return Err(anyhow!("upload timeout must be greater than zero"));
        }
        url::Url::parse(&self.upload.endpoint)
            .map_err(|e| anyhow!("invalid endpoint {}: {}", self.upload.endpoint, e))?;
        Ok(())
    }
}

enum RegionKind {
    Detection,
    Fixed,
}

fn region_kind(value: &str) -> Result<RegionKind> {
    match value.trim().to_ascii_lowercase().as_str() {
        "detection" | "keypoints" => Ok(RegionKind::Detection),
        "fixed" | "upper-body" | "upper_body" => Ok(RegionKind::Fixed),
        other => Err(anyhow!(
            "unknown region strategy '{}'; expected detection or fixed",
            other
        )),
    }
}

fn region_strategy(
    name: &str,
    margin: Option<f32>,
    top_ratio: Option<f32>,
    height_ratio: Option<f32>,
) -> Result<RegionStrategy> {
    Ok(match region_kind(name)? {
        RegionKind::Detection => RegionStrategy::Detection {
            margin: margin.unwrap_or(DEFAULT_MARGIN),
        },
        RegionKind::Fixed => RegionStrategy::Fixed {
            top_ratio: top_ratio.unwrap_or(DEFAULT_FIXED_TOP_RATIO),
            height_ratio: height_ratio.unwrap_or(DEFAULT_FIXED_HEIGHT_RATIO),
        },
    })
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_config_file(path: &Path) -> Result<CaptureConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
