use serde::{Deserialize, Serialize};

use crate::keypoint::{Hand, Pose};

/// Immutable result of one detection tick.
///
/// The detection loop builds one snapshot per tick and hands it to the capture step by value
/// (usually behind an `Arc`). Hands are truncated to the configured maximum and only the first
/// pose is retained.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionSnapshot {
    sequence: u64,
    frame_width: u32,
    frame_height: u32,
    hands: Vec<Hand>,
    poses: Vec<Pose>,
}

impl DetectionSnapshot {
    pub fn new(
        sequence: u64,
        frame_width: u32,
        frame_height: u32,
        mut hands: Vec<Hand>,
        mut poses: Vec<Pose>,
        max_hands: usize,
    ) -> Self {
        hands.truncate(max_hands);
        poses.truncate(1);
        Self {
            sequence,
            frame_width,
            frame_height,
            hands,
            poses,
        }
    }

    /// Snapshot with nothing detected.
    pub fn empty(sequence: u64, frame_width: u32, frame_height: u32) -> Self {
        Self::new(sequence, frame_width, frame_height, Vec::new(), Vec::new(), 0)
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn frame_width(&self) -> u32 {
        self.frame_width
    }

    pub fn frame_height(&self) -> u32 {
        self.frame_height
    }

    pub fn hands(&self) -> &[Hand] {
        &self.hands
    }

    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    pub fn pose(&self) -> Option<&Pose> {
        self.poses.first()
    }

    /// Captures are only offered while at least one hand is visible.
    pub fn capture_enabled(&self) -> bool {
        !self.hands.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.hands.is_empty() && self.poses.iter().all(|pose| pose.keypoints.is_empty())
    }
}

/// One recorded detection, as written by the replay format (one JSON object per line).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    #[serde(default)]
    pub hands: Vec<Hand>,
    #[serde(default)]
    pub poses: Vec<Pose>,
}
