//! Hand and pose keypoint model.
//!
//! Keypoints are expressed in frame-pixel space. Hands follow the 21-point MediaPipe hand
//! topology; poses follow the 17-point MoveNet joint order. Nothing here is persisted: every
//! detection cycle produces fresh values.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Number of keypoints in a [`Hand`].
pub const HAND_KEYPOINT_COUNT: usize = 21;

/// Number of joints in a single-person MoveNet pose.
pub const POSE_KEYPOINT_COUNT: usize = 17;

/// Pose keypoints at or below this score are neither drawn nor used for region selection.
pub const POSE_SCORE_THRESHOLD: f32 = 0.4;

/// Finger segments, each anchored at the wrist (index 0).
pub const FINGER_SEGMENTS: [[usize; 5]; 5] = [
    [0, 1, 2, 3, 4],
    [0, 5, 6, 7, 8],
    [0, 9, 10, 11, 12],
    [0, 13, 14, 15, 16],
    [0, 17, 18, 19, 20],
];

/// A single tracked point in frame-pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Relative depth, when the provider estimates one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f32>,
    /// Confidence in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            z: None,
            score: None,
        }
    }

    pub fn with_z(mut self, z: f32) -> Self {
        self.z = Some(z);
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    /// A missing score counts as zero confidence.
    pub fn score_or_zero(&self) -> f32 {
        self.score.unwrap_or(0.0)
    }

    /// Returns true when the score strictly exceeds `threshold`.
    pub fn is_confident(&self, threshold: f32) -> bool {
        self.score_or_zero() > threshold
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    /// Keypoint indices from the wrist to the fingertip.
    pub fn segment(self) -> [usize; 5] {
        FINGER_SEGMENTS[self as usize]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    Left,
    Right,
}

/// One detected hand: exactly [`HAND_KEYPOINT_COUNT`] keypoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HandRecord", into = "HandRecord")]
pub struct Hand {
    keypoints: Vec<Keypoint>,
    handedness: Option<Handedness>,
    score: Option<f32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct HandRecord {
    keypoints: Vec<Keypoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    handedness: Option<Handedness>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    score: Option<f32>,
}

impl Hand {
    pub fn new(keypoints: Vec<Keypoint>) -> Result<Self> {
        if keypoints.len() != HAND_KEYPOINT_COUNT {
            return Err(anyhow!(
                "hand must have {} keypoints, got {}",
                HAND_KEYPOINT_COUNT,
                keypoints.len()
            ));
        }
        Ok(Self {
            keypoints,
            handedness: None,
            score: None,
        })
    }

    pub fn with_handedness(mut self, handedness: Handedness) -> Self {
        self.handedness = Some(handedness);
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn handedness(&self) -> Option<Handedness> {
        self.handedness
    }

    pub fn score(&self) -> Option<f32> {
        self.score
    }

    pub fn wrist(&self) -> Keypoint {
        self.keypoints[0]
    }

    /// The five keypoints of `finger`, wrist first.
    pub fn finger(&self, finger: Finger) -> [Keypoint; 5] {
        finger.segment().map(|idx| self.keypoints[idx])
    }
}

impl TryFrom<HandRecord> for Hand {
    type Error = anyhow::Error;

    fn try_from(record: HandRecord) -> Result<Self> {
        let mut hand = Hand::new(record.keypoints)?;
        hand.handedness = record.handedness;
        hand.score = record.score;
        Ok(hand)
    }
}

impl From<Hand> for HandRecord {
    fn from(hand: Hand) -> Self {
        HandRecord {
            keypoints: hand.keypoints,
            handedness: hand.handedness,
            score: hand.score,
        }
    }
}

/// MoveNet joint order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum PoseJoint {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

/// One body pose. Joint order follows [`PoseJoint`] when the provider is MoveNet-shaped;
/// other providers may report a different number of joints.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub keypoints: Vec<Keypoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl Pose {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self {
            keypoints,
            score: None,
        }
    }

    pub fn joint(&self, joint: PoseJoint) -> Option<&Keypoint> {
        self.keypoints.get(joint as usize)
    }

    /// Keypoints whose score strictly exceeds `threshold`.
    pub fn confident_keypoints(&self, threshold: f32) -> impl Iterator<Item = &Keypoint> + '_ {
        self.keypoints
            .iter()
            .filter(move |kp| kp.is_confident(threshold))
    }
}
