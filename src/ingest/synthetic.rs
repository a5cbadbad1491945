use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use super::{CameraConfig, FrameSource, SourceStats};
use crate::frame::Frame;

/// Deterministic gradient frames for `stub://` URLs.
///
/// Red follows x, green follows y and blue drifts with the frame counter, so consecutive
/// frames differ while staying reproducible.
pub struct SyntheticSource {
    config: CameraConfig,
    connected: bool,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            connected: false,
            frame_count: 0,
        }
    }

    fn render(&self) -> RgbImage {
        let width = self.config.width;
        let height = self.config.height;
        let shift = (self.frame_count % 256) as u32;
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                ((x + y + shift) % 256) as u8,
            ])
        })
    }
}

impl FrameSource for SyntheticSource {
    /// Synthetic sources are always "connected" once their geometry is valid.
    fn connect(&mut self) -> Result<()> {
        if self.config.width == 0 || self.config.height == 0 {
            return Err(anyhow!(
                "synthetic source {} needs non-zero dimensions, got {}x{}",
                self.config.url,
                self.config.width,
                self.config.height
            ));
        }
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.config.url,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("synthetic source not connected; call connect() first"));
        }
        self.frame_count += 1;
        Ok(Frame::from_image(self.render()))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}
