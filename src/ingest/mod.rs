//! Camera frame sources.
//!
//! This module provides different sources for live frames:
//! - Synthetic gradient frames for `stub://` URLs (tests, demos)
//! - HTTP MJPEG streams or JPEG snapshot endpoints (`http://`, `https://`)
//! - USB/V4L2 devices such as `/dev/video0` (feature: ingest-v4l2)
//!
//! Every source produces [`Frame`] values with known pixel dimensions. Sources never
//! write frames to disk; only the capture path encodes a cropped region for upload.

mod http;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::capture::CaptureError;
use crate::frame::Frame;

pub use http::HttpSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

pub const DEFAULT_CAMERA_URL: &str = "stub://webcam";
pub const DEFAULT_FRAME_WIDTH: u32 = 960;
pub const DEFAULT_FRAME_HEIGHT: u32 = 680;
pub const DEFAULT_TARGET_FPS: u32 = 30;

/// Camera selection and preferred geometry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// `stub://name`, `http(s)://host/stream` or a V4L2 device path.
    pub url: String,
    /// Preferred frame width. HTTP sources report whatever the camera sends.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Target frame rate (frames per second). Sources decimate to this rate.
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CAMERA_URL.to_string(),
            width: DEFAULT_FRAME_WIDTH,
            height: DEFAULT_FRAME_HEIGHT,
            target_fps: DEFAULT_TARGET_FPS,
        }
    }
}

/// A live frame source.
pub trait FrameSource {
    /// Open the underlying stream or device.
    fn connect(&mut self) -> Result<()>;

    /// Block until the next frame is available.
    fn next_frame(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Build the source matching `config.url` and connect it.
///
/// Any failure to construct or connect is reported as [`CaptureError::CameraUnavailable`].
pub fn open_source(config: &CameraConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
    let mut source = build_source(config)
        .map_err(|err| CaptureError::CameraUnavailable(format!("{:#}", err)))?;
    source.connect().map_err(|err| {
        log::error!("camera {} unavailable: {:#}", config.url, err);
        CaptureError::CameraUnavailable(format!("{}: {:#}", config.url, err))
    })?;
    Ok(source)
}

fn build_source(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    let url = config.url.trim();
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config.clone())));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(Box::new(HttpSource::new(config.clone())?));
    }
    if url.starts_with("/dev/video") {
        return open_device(config);
    }
    Err(anyhow::anyhow!(
        "unsupported camera url '{}'; expected stub://, http(s):// or /dev/video*",
        url
    ))
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Source::new(config.clone())?))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    Err(anyhow::anyhow!(
        "camera {} requires the ingest-v4l2 feature",
        config.url
    ))
}

/// Minimum spacing between delivered frames at `target_fps`.
pub(crate) fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

/// How long a source may go without a frame before it counts as unhealthy.
pub(crate) fn health_grace(target_fps: u32) -> Duration {
    let base_ms = if target_fps == 0 {
        2_000
    } else {
        (1000 / target_fps).saturating_mul(6)
    };
    Duration::from_millis(base_ms.max(2_000) as u64)
}
