//! Region-of-interest selection.
//!
//! Two interchangeable strategies pick the rectangle that gets cropped and uploaded:
//!
//! - `Detection`: union of all hand keypoints and all confident pose keypoints, padded by a
//!   margin and clamped to the frame.
//! - `Fixed`: a full-width horizontal band at a fixed fraction of the frame height. Keypoints
//!   are ignored.
//!
//! Boxes are recomputed for every capture and never cached across frames.

use crate::capture::CaptureError;
use crate::keypoint::{Hand, Pose, POSE_SCORE_THRESHOLD};
use crate::snapshot::DetectionSnapshot;

pub const DEFAULT_MARGIN: f32 = 100.0;
pub const DEFAULT_FIXED_TOP_RATIO: f32 = 0.15;
pub const DEFAULT_FIXED_HEIGHT_RATIO: f32 = 0.55;

/// Axis-aligned box in frame-pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Integer pixel rectangle, guaranteed to lie inside the frame it was built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Floors the origin and ceils the far edge, then clamps to the frame.
    ///
    /// Returns `None` when the result covers no pixels.
    pub fn from_box(bbox: &BoundingBox, frame_width: u32, frame_height: u32) -> Option<Self> {
        let x0 = bbox.x.floor().clamp(0.0, frame_width as f32) as u32;
        let y0 = bbox.y.floor().clamp(0.0, frame_height as f32) as u32;
        let x1 = bbox.max_x().ceil().clamp(0.0, frame_width as f32) as u32;
        let y1 = bbox.max_y().ceil().clamp(0.0, frame_height as f32) as u32;
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// Bounding box around every hand keypoint and every pose keypoint scoring above
/// [`POSE_SCORE_THRESHOLD`], expanded by `margin` on all four sides and clamped to
/// `[0, frame_width] x [0, frame_height]`.
///
/// Returns `None` when there is no qualifying keypoint. The result may have zero area when all
/// keypoints coincide at a frame edge; capture treats that as a failed detection.
pub fn bounding_box(
    hands: &[Hand],
    poses: &[Pose],
    margin: f32,
    frame_width: u32,
    frame_height: u32,
) -> Option<BoundingBox> {
    let hand_points = hands.iter().flat_map(|hand| hand.keypoints().iter());
    let pose_points = poses
        .iter()
        .flat_map(|pose| pose.confident_keypoints(POSE_SCORE_THRESHOLD));

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    let mut count = 0usize;
    for kp in hand_points.chain(pose_points) {
        min_x = min_x.min(kp.x);
        min_y = min_y.min(kp.y);
        max_x = max_x.max(kp.x);
        max_y = max_y.max(kp.y);
        count += 1;
    }
    if count == 0 {
        return None;
    }

    let fw = frame_width as f32;
    let fh = frame_height as f32;
    let x0 = (min_x - margin).clamp(0.0, fw);
    let y0 = (min_y - margin).clamp(0.0, fh);
    let x1 = (max_x + margin).clamp(0.0, fw);
    let y1 = (max_y + margin).clamp(0.0, fh);

    Some(BoundingBox {
        x: x0,
        y: y0,
        width: (x1 - x0).max(0.0),
        height: (y1 - y0).max(0.0),
    })
}

/// How the capture region is chosen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RegionStrategy {
    /// Derive the region from the latest keypoints.
    Detection { margin: f32 },
    /// Full-width band starting at `top_ratio` of the frame height.
    Fixed { top_ratio: f32, height_ratio: f32 },
}

impl Default for RegionStrategy {
    fn default() -> Self {
        RegionStrategy::Detection {
            margin: DEFAULT_MARGIN,
        }
    }
}

impl RegionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            RegionStrategy::Detection { .. } => "detection",
            RegionStrategy::Fixed { .. } => "fixed",
        }
    }

    pub fn upper_body() -> Self {
        RegionStrategy::Fixed {
            top_ratio: DEFAULT_FIXED_TOP_RATIO,
            height_ratio: DEFAULT_FIXED_HEIGHT_RATIO,
        }
    }

    /// Pick the capture region for `snapshot`.
    ///
    /// A missing or zero-area region is reported as [`CaptureError::NoDetection`].
    pub fn select(&self, snapshot: &DetectionSnapshot) -> Result<BoundingBox, CaptureError> {
        let fw = snapshot.frame_width();
        let fh = snapshot.frame_height();
        let bbox = match *self {
            RegionStrategy::Detection { margin } => {
                bounding_box(snapshot.hands(), snapshot.poses(), margin, fw, fh)
                    .ok_or(CaptureError::NoDetection)?
            }
            RegionStrategy::Fixed {
                top_ratio,
                height_ratio,
            } => fixed_band(top_ratio, height_ratio, fw, fh),
        };
        if bbox.is_empty() {
            return Err(CaptureError::NoDetection);
        }
        Ok(bbox)
    }
}

fn fixed_band(top_ratio: f32, height_ratio: f32, frame_width: u32, frame_height: u32) -> BoundingBox {
    let fh = frame_height as f32;
    let y0 = (fh * top_ratio).clamp(0.0, fh);
    let y1 = (y0 + fh * height_ratio).clamp(0.0, fh);
    BoundingBox {
        x: 0.0,
        y: y0,
        width: frame_width as f32,
        height: y1 - y0,
    }
}
