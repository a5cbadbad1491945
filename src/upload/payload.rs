use serde::{Deserialize, Serialize};

use crate::capture::CaptureError;
use crate::keypoint::Keypoint;
use crate::snapshot::DetectionSnapshot;

/// Keypoint divided by the frame dimensions. In-frame keypoints land in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl NormalizedPoint {
    fn from_keypoint(kp: &Keypoint, width: f32, height: f32, z: f32) -> Self {
        Self {
            x: kp.x / width,
            y: kp.y / height,
            z,
        }
    }
}

/// Body of `POST /predict_json`.
///
/// `hands` is every hand's keypoints flattened into one list; `pose` is the single pose's
/// keypoints with `z` fixed at zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPayload {
    pub hands: Vec<NormalizedPoint>,
    pub pose: Vec<NormalizedPoint>,
}

impl LandmarkPayload {
    pub fn from_snapshot(snapshot: &DetectionSnapshot) -> Result<Self, CaptureError> {
        if snapshot.frame_width() == 0 || snapshot.frame_height() == 0 {
            return Err(CaptureError::Encode(
                "cannot normalize keypoints for a zero-sized frame".to_string(),
            ));
        }
        let width = snapshot.frame_width() as f32;
        let height = snapshot.frame_height() as f32;

        let hands: Vec<NormalizedPoint> = snapshot
            .hands()
            .iter()
            .flat_map(|hand| hand.keypoints().iter())
            .map(|kp| NormalizedPoint::from_keypoint(kp, width, height, kp.z.unwrap_or(0.0)))
            .collect();
        let pose: Vec<NormalizedPoint> = snapshot
            .pose()
            .map(|pose| {
                pose.keypoints
                    .iter()
                    .map(|kp| NormalizedPoint::from_keypoint(kp, width, height, 0.0))
                    .collect()
            })
            .unwrap_or_default();

        if hands.is_empty() && pose.is_empty() {
            return Err(CaptureError::NoDetection);
        }
        Ok(Self { hands, pose })
    }

    pub fn point_count(&self) -> usize {
        self.hands.len() + self.pose.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypoint::{Hand, Pose, HAND_KEYPOINT_COUNT};

    #[test]
    fn normalizes_and_flattens() {
        let hand = |x: f32| {
            Hand::new(vec![Keypoint::new(x, 340.0).with_z(-0.1); HAND_KEYPOINT_COUNT]).unwrap()
        };
        let pose = Pose::new(vec![Keypoint::new(960.0, 680.0).with_z(5.0).with_score(0.1)]);
        let snapshot =
            DetectionSnapshot::new(0, 960, 680, vec![hand(480.0), hand(0.0)], vec![pose], 2);

        let payload = LandmarkPayload::from_snapshot(&snapshot).unwrap();
        assert_eq!(payload.hands.len(), 2 * HAND_KEYPOINT_COUNT);
        assert_eq!(
            payload.hands[0],
            NormalizedPoint {
                x: 0.5,
                y: 0.5,
                z: -0.1
            }
        );
        assert_eq!(payload.hands[HAND_KEYPOINT_COUNT].x, 0.0);
        assert_eq!(
            payload.pose,
            vec![NormalizedPoint {
                x: 1.0,
                y: 1.0,
                z: 0.0
            }]
        );
        for point in payload.hands.iter().chain(payload.pose.iter()) {
            assert!((0.0..=1.0).contains(&point.x));
            assert!((0.0..=1.0).contains(&point.y));
        }
    }

    #[test]
    fn empty_snapshot_is_rejected() {
        let snapshot = DetectionSnapshot::empty(0, 960, 680);
        assert!(matches!(
            LandmarkPayload::from_snapshot(&snapshot),
            Err(CaptureError::NoDetection)
        ));
    }

    #[test]
    fn serializes_wire_shape() {
        let payload = LandmarkPayload {
            hands: vec![NormalizedPoint {
                x: 0.25,
                y: 0.5,
                z: 0.0,
            }],
            pose: Vec::new(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"hands": [{"x": 0.25, "y": 0.5, "z": 0.0}], "pose": []})
        );
    }
}
