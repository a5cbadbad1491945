//! Camera frames.
//!
//! - `Frame`: owned RGB8 pixels with known dimensions, produced by ingest sources.
//! - Cropping goes through the `image` crate so callers get an `RgbImage` they can encode.

use anyhow::{anyhow, Context, Result};
use image::{imageops, RgbImage};
use std::time::{Duration, Instant};

use crate::region::PixelRect;

/// One decoded camera frame in packed RGB8.
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic capture instant (for health checks and latency logging).
    captured_at: Instant,
}

impl Frame {
    /// Wrap packed RGB8 pixels. Fails when the buffer length does not match the dimensions.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))? as usize;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            captured_at: Instant::now(),
        })
    }

    pub fn from_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            pixels: image.into_raw(),
            width,
            height,
            captured_at: Instant::now(),
        }
    }

    /// Solid-color frame, mostly useful for tests and synthetic sources.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::from_image(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    /// Copy of the frame as an `RgbImage`.
    pub fn to_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .context("frame buffer does not match its dimensions")
    }

    /// Copy the pixels inside `rect`. The rectangle must lie within the frame.
    pub fn crop(&self, rect: PixelRect) -> Result<RgbImage> {
        if rect.width == 0 || rect.height == 0 {
            return Err(anyhow!("cannot crop an empty region"));
        }
        if rect.x + rect.width > self.width || rect.y + rect.height > self.height {
            return Err(anyhow!(
                "crop {}x{}+{}+{} exceeds frame {}x{}",
                rect.width,
                rect.height,
                rect.x,
                rect.y,
                self.width,
                self.height
            ));
        }
        let image = self.to_image()?;
        Ok(imageops::crop_imm(&image, rect.x, rect.y, rect.width, rect.height).to_image())
    }
}
