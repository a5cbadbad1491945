use anyhow::Result;

use crate::frame::Frame;
use crate::keypoint::{Hand, Keypoint, Pose, FINGER_SEGMENTS, HAND_KEYPOINT_COUNT};
use crate::landmarks::provider::{LandmarkCapability, LandmarkProvider};
use crate::snapshot::DetectionRecord;

/// Deterministic provider that plays back a fixed sequence of detections, one per frame.
///
/// Used for tests, for `stub://` camera runs and as the engine behind the replay provider.
pub struct ScriptedProvider {
    name: &'static str,
    records: Vec<DetectionRecord>,
    cursor: usize,
    current: Option<usize>,
    looping: bool,
}

impl ScriptedProvider {
    pub fn new(records: Vec<DetectionRecord>) -> Self {
        Self {
            name: "scripted",
            records,
            cursor: 0,
            current: None,
            looping: true,
        }
    }

    /// Provider that never detects anything.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Play the sequence once, then keep returning the last record.
    pub fn once(mut self) -> Self {
        self.looping = false;
        self
    }

    pub(crate) fn renamed(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// A single synthetic hand tracing a circle around the frame center, with a matching
    /// upper-body pose. `steps` frames make one revolution.
    pub fn demo(frame_width: u32, frame_height: u32, steps: usize) -> Self {
        let steps = steps.max(1);
        let cx = frame_width as f32 / 2.0;
        let cy = frame_height as f32 / 2.0;
        let radius = frame_width.min(frame_height) as f32 / 6.0;
        let records = (0..steps)
            .map(|i| {
                let angle = i as f32 / steps as f32 * std::f32::consts::TAU;
                let wrist_x = cx + radius * angle.cos();
                let wrist_y = cy + radius * angle.sin();
                DetectionRecord {
                    hands: synthetic_hand(wrist_x, wrist_y, radius / 2.0)
                        .into_iter()
                        .collect(),
                    poses: vec![synthetic_upper_body(cx, cy, radius)],
                }
            })
            .collect();
        Self::new(records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn advance(&mut self) -> Option<&DetectionRecord> {
        if self.records.is_empty() {
            self.current = None;
            return None;
        }
        let index = if self.looping {
            self.cursor % self.records.len()
        } else {
            self.cursor.min(self.records.len() - 1)
        };
        self.cursor = self.cursor.saturating_add(1);
        self.current = Some(index);
        self.records.get(index)
    }

    fn current(&self) -> Option<&DetectionRecord> {
        self.current.and_then(|index| self.records.get(index))
    }
}

impl LandmarkProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports(&self, capability: LandmarkCapability) -> bool {
        matches!(
            capability,
            LandmarkCapability::Hands | LandmarkCapability::Pose
        )
    }

    /// Advances to the next record.
    fn estimate_hands(&mut self, _frame: &Frame, max_hands: usize) -> Result<Vec<Hand>> {
        Ok(self
            .advance()
            .map(|record| record.hands.iter().take(max_hands).cloned().collect())
            .unwrap_or_default())
    }

    /// Poses of the record selected by the last `estimate_hands` call.
    fn estimate_poses(&mut self, _frame: &Frame) -> Result<Vec<Pose>> {
        Ok(self
            .current()
            .map(|record| record.poses.clone())
            .unwrap_or_default())
    }
}

fn synthetic_hand(wrist_x: f32, wrist_y: f32, length: f32) -> Option<Hand> {
    let mut points = vec![Keypoint::new(wrist_x, wrist_y).with_z(0.0); HAND_KEYPOINT_COUNT];
    for (finger, segment) in FINGER_SEGMENTS.iter().enumerate() {
        // Fan the fingers out upwards from the wrist.
        let angle = -std::f32::consts::FRAC_PI_2 + (finger as f32 - 2.0) * 0.3;
        for (joint, &idx) in segment.iter().enumerate().skip(1) {
            let reach = length * joint as f32 / 4.0;
            points[idx] = Keypoint::new(wrist_x + reach * angle.cos(), wrist_y + reach * angle.sin())
                .with_z(-0.01 * joint as f32);
        }
    }
    Hand::new(points).ok()
}

fn synthetic_upper_body(cx: f32, cy: f32, scale: f32) -> Pose {
    let joint = |dx: f32, dy: f32, score: f32| {
        Keypoint::new(cx + dx * scale, cy + dy * scale).with_score(score)
    };
    Pose::new(vec![
        joint(0.0, -1.6, 0.9),
        joint(-0.15, -1.75, 0.85),
        joint(0.15, -1.75, 0.85),
        joint(-0.35, -1.65, 0.7),
        joint(0.35, -1.65, 0.7),
        joint(-0.8, -0.8, 0.8),
        joint(0.8, -0.8, 0.8),
        joint(-1.0, 0.2, 0.6),
        joint(1.0, 0.2, 0.6),
        joint(-0.9, 1.0, 0.5),
        joint(0.9, 1.0, 0.5),
        joint(-0.5, 1.4, 0.3),
        joint(0.5, 1.4, 0.3),
        joint(-0.5, 2.4, 0.1),
        joint(0.5, 2.4, 0.1),
        joint(-0.5, 2.9, 0.05),
        joint(0.5, 2.9, 0.05),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypoint::POSE_KEYPOINT_COUNT;

    fn record(x: f32) -> DetectionRecord {
        DetectionRecord {
            hands: vec![Hand::new(vec![Keypoint::new(x, x); HAND_KEYPOINT_COUNT]).unwrap()],
            poses: Vec::new(),
        }
    }

    #[test]
    fn loops_through_records() -> Result<()> {
        let frame = Frame::filled(4, 4, [0, 0, 0]);
        let mut provider = ScriptedProvider::new(vec![record(1.0), record(2.0)]);
        let xs: Vec<f32> = (0..3)
            .map(|_| provider.estimate_hands(&frame, 2).map(|h| h[0].wrist().x))
            .collect::<Result<_>>()?;
        assert_eq!(xs, vec![1.0, 2.0, 1.0]);
        Ok(())
    }

    #[test]
    fn once_holds_last_record() -> Result<()> {
        let frame = Frame::filled(4, 4, [0, 0, 0]);
        let mut provider = ScriptedProvider::new(vec![record(1.0), record(2.0)]).once();
        for _ in 0..2 {
            provider.estimate_hands(&frame, 2)?;
        }
        assert_eq!(provider.estimate_hands(&frame, 2)?[0].wrist().x, 2.0);
        Ok(())
    }

    #[test]
    fn empty_provider_detects_nothing() -> Result<()> {
        let frame = Frame::filled(4, 4, [0, 0, 0]);
        let mut provider = ScriptedProvider::empty();
        assert!(provider.estimate_hands(&frame, 2)?.is_empty());
        assert!(provider.estimate_poses(&frame)?.is_empty());
        Ok(())
    }

    #[test]
    fn demo_stays_inside_frame() -> Result<()> {
        let frame = Frame::filled(960, 680, [0, 0, 0]);
        let mut provider = ScriptedProvider::demo(960, 680, 8);
        assert_eq!(provider.len(), 8);
        for _ in 0..8 {
            let hands = provider.estimate_hands(&frame, 2)?;
            let poses = provider.estimate_poses(&frame)?;
            assert_eq!(hands.len(), 1);
            assert_eq!(poses[0].keypoints.len(), POSE_KEYPOINT_COUNT);
            for kp in hands[0].keypoints().iter().chain(poses[0].keypoints.iter()) {
                assert!(kp.x >= 0.0 && kp.x <= 960.0);
                assert!(kp.y >= 0.0 && kp.y <= 680.0);
            }
        }
        Ok(())
    }
}
