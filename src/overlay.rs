//! Skeleton overlay.
//!
//! The overlay is an RGBA surface the size of the display. Each render clears it to
//! transparent and redraws the latest snapshot, so rendering the same snapshot twice yields
//! the same pixels.
//!
//! Coordinates are `f32` in frame space. A pixel is written only if the drawn shape covers
//! its center, so a dot at `(10.5, 10.5)` with radius 3 touches a symmetric disc.

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use std::path::Path;

use crate::frame::Frame;
use crate::keypoint::{Finger, Keypoint, POSE_SCORE_THRESHOLD};
use crate::snapshot::DetectionSnapshot;

pub const CYAN: Rgba<u8> = Rgba([0, 255, 255, 255]);
pub const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const LIME: Rgba<u8> = Rgba([0, 255, 0, 255]);
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Colors and sizes used by [`OverlayRenderer`].
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayStyle {
    pub finger_color: Rgba<u8>,
    pub finger_width: f32,
    pub hand_color: Rgba<u8>,
    pub hand_radius: f32,
    pub pose_color: Rgba<u8>,
    pub pose_radius: f32,
    /// Pose keypoints are drawn only when their score is strictly above this.
    pub pose_threshold: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            finger_color: CYAN,
            finger_width: 2.0,
            hand_color: RED,
            hand_radius: 3.0,
            pose_color: LIME,
            pose_radius: 4.0,
            pose_threshold: POSE_SCORE_THRESHOLD,
        }
    }
}

pub struct OverlayRenderer {
    surface: RgbaImage,
    style: OverlayStyle,
    scale_x: f32,
    scale_y: f32,
}

impl OverlayRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface: RgbaImage::from_pixel(width, height, TRANSPARENT),
            style: OverlayStyle::default(),
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    pub fn with_style(mut self, style: OverlayStyle) -> Self {
        self.style = style;
        self
    }

    /// Map frame coordinates onto a surface of a different size.
    pub fn with_scale(mut self, scale_x: f32, scale_y: f32) -> Self {
        self.scale_x = scale_x;
        self.scale_y = scale_y;
        self
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    /// Clear the surface and draw `snapshot`. Returns the number of keypoint markers drawn.
    pub fn render(&mut self, snapshot: &DetectionSnapshot) -> usize {
        self.clear();
        let mut markers = 0;

        for hand in snapshot.hands() {
            for finger in Finger::ALL {
                let joints = hand.finger(finger);
                for pair in joints.windows(2) {
                    self.line(&pair[0], &pair[1]);
                }
            }
            for keypoint in hand.keypoints() {
                self.dot(keypoint, self.style.hand_radius, self.style.hand_color);
                markers += 1;
            }
        }

        if let Some(pose) = snapshot.pose() {
            for keypoint in pose.confident_keypoints(self.style.pose_threshold) {
                self.dot(keypoint, self.style.pose_radius, self.style.pose_color);
                markers += 1;
            }
        }

        log::debug!(
            "overlay: snapshot {} drew {} markers",
            snapshot.sequence(),
            markers
        );
        markers
    }

    pub fn clear(&mut self) {
        for pixel in self.surface.pixels_mut() {
            *pixel = TRANSPARENT;
        }
    }

    /// Composite the overlay over `frame`. Sizes must match.
    pub fn blend_onto(&self, frame: &Frame) -> Result<RgbImage> {
        let mut base = frame.to_image()?;
        if base.dimensions() != self.surface.dimensions() {
            return Err(anyhow!(
                "overlay is {:?} but frame is {:?}",
                self.surface.dimensions(),
                base.dimensions()
            ));
        }
        for (dst, src) in base.pixels_mut().zip(self.surface.pixels()) {
            *dst = blend(*dst, *src);
        }
        Ok(base)
    }

    /// Write the composited overlay to `path` as PNG.
    pub fn save_png(&self, frame: &Frame, path: &Path) -> Result<()> {
        self.blend_onto(frame)?
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("write overlay png {}", path.display()))
    }

    fn project(&self, keypoint: &Keypoint) -> (f32, f32) {
        (keypoint.x * self.scale_x, keypoint.y * self.scale_y)
    }

    fn dot(&mut self, keypoint: &Keypoint, radius: f32, color: Rgba<u8>) {
        let (cx, cy) = self.project(keypoint);
        let r2 = radius * radius;
        self.fill_covered(cx - radius, cy - radius, cx + radius, cy + radius, color, |px, py| {
            let dx = px - cx;
            let dy = py - cy;
            dx * dx + dy * dy <= r2
        });
    }

    fn line(&mut self, from: &Keypoint, to: &Keypoint) {
        let (x0, y0) = self.project(from);
        let (x1, y1) = self.project(to);
        let half = self.style.finger_width / 2.0;
        let color = self.style.finger_color;
        let (dx, dy) = (x1 - x0, y1 - y0);
        let len2 = dx * dx + dy * dy;
        self.fill_covered(
            x0.min(x1) - half,
            y0.min(y1) - half,
            x0.max(x1) + half,
            y0.max(y1) + half,
            color,
            |px, py| {
                let t = if len2 > 0.0 {
                    (((px - x0) * dx + (py - y0) * dy) / len2).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let ex = px - (x0 + t * dx);
                let ey = py - (y0 + t * dy);
                ex * ex + ey * ey <= half * half
            },
        );
    }

    /// Paint every pixel in the bounding box whose center satisfies `covers`.
    fn fill_covered(
        &mut self,
        min_x: f32,
        min_y: f32,
        max_x: f32,
        max_y: f32,
        color: Rgba<u8>,
        covers: impl Fn(f32, f32) -> bool,
    ) {
        let (width, height) = self.surface.dimensions();
        if width == 0 || height == 0 || max_x < 0.0 || max_y < 0.0 {
            return;
        }
        let x_start = min_x.floor().max(0.0) as u32;
        let y_start = min_y.floor().max(0.0) as u32;
        let x_end = (max_x.ceil() as u32).min(width - 1);
        let y_end = (max_y.ceil() as u32).min(height - 1);
        for y in y_start..=y_end {
            for x in x_start..=x_end {
                if covers(x as f32 + 0.5, y as f32 + 0.5) {
                    self.surface.put_pixel(x, y, color);
                }
            }
        }
    }
}

fn blend(base: Rgb<u8>, over: Rgba<u8>) -> Rgb<u8> {
    let alpha = over[3] as u32;
    let mix = |b: u8, o: u8| ((o as u32 * alpha + b as u32 * (255 - alpha)) / 255) as u8;
    Rgb([
        mix(base[0], over[0]),
        mix(base[1], over[1]),
        mix(base[2], over[2]),
    ])
}
