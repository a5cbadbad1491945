//! Region selection properties over a spread of keypoint layouts.
//!
//! Checked for every layout:
//! 1. Non-empty keypoints give a box inside the frame
//! 2. Empty keypoints never give a degenerate box
//! 3. The margin widens each side equally before clamping
//! 4. Low-confidence pose points are ignored

use sign_capture::keypoint::HAND_KEYPOINT_COUNT;
use sign_capture::{
    bounding_box, CaptureError, DetectionSnapshot, Hand, Keypoint, Pose, RegionStrategy,
};

const FRAME_W: u32 = 960;
const FRAME_H: u32 = 680;

fn hand_spanning(x0: f32, y0: f32, x1: f32, y1: f32) -> Hand {
    let mut points = vec![Keypoint::new((x0 + x1) / 2.0, (y0 + y1) / 2.0); HAND_KEYPOINT_COUNT];
    points[0] = Keypoint::new(x0, y0);
    points[HAND_KEYPOINT_COUNT - 1] = Keypoint::new(x1, y1);
    Hand::new(points).expect("21 keypoints")
}

/// Deterministic pseudo-random layouts, some of them partly outside the frame.
fn layouts() -> Vec<(f32, f32, f32, f32)> {
    let mut seed: u32 = 0x2545_f491;
    let mut next = move |range: f32| {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        (seed % 10_000) as f32 / 10_000.0 * range
    };
    (0..200)
        .map(|_| {
            let x0 = next(1100.0) - 70.0;
            let y0 = next(800.0) - 60.0;
            (x0, y0, x0 + next(300.0), y0 + next(300.0))
        })
        .collect()
}

#[test]
fn boxes_stay_inside_frame() {
    for margin in [0.0, 25.0, 100.0, 400.0] {
        for (x0, y0, x1, y1) in layouts() {
            let hands = [hand_spanning(x0, y0, x1, y1)];
            let Some(bbox) = bounding_box(&hands, &[], margin, FRAME_W, FRAME_H) else {
                continue;
            };
            assert!(bbox.x >= 0.0, "{:?}", bbox);
            assert!(bbox.y >= 0.0, "{:?}", bbox);
            assert!(bbox.max_x() <= FRAME_W as f32 + 1e-3, "{:?}", bbox);
            assert!(bbox.max_y() <= FRAME_H as f32 + 1e-3, "{:?}", bbox);
            assert!(bbox.width >= 0.0 && bbox.height >= 0.0);
        }
    }
}

#[test]
fn documented_example() {
    let hands = [hand_spanning(100.0, 50.0, 200.0, 150.0)];
    let bbox = bounding_box(&hands, &[], 100.0, FRAME_W, FRAME_H).expect("box");
    assert_eq!((bbox.x, bbox.y), (0.0, 0.0));
    assert_eq!((bbox.max_x(), bbox.max_y()), (300.0, 250.0));
}

#[test]
fn margin_is_symmetric_away_from_edges() {
    let hands = [hand_spanning(400.0, 300.0, 500.0, 360.0)];
    let base = bounding_box(&hands, &[], 0.0, FRAME_W, FRAME_H).expect("box");
    for delta in [1.0, 10.0, 50.0] {
        let grown = bounding_box(&hands, &[], delta, FRAME_W, FRAME_H).expect("box");
        assert_eq!(grown.x, base.x - delta);
        assert_eq!(grown.y, base.y - delta);
        assert_eq!(grown.max_x(), base.max_x() + delta);
        assert_eq!(grown.max_y(), base.max_y() + delta);
    }
}

#[test]
fn empty_keypoints_are_no_detection() {
    assert!(bounding_box(&[], &[], 100.0, FRAME_W, FRAME_H).is_none());

    let faint = Pose::new(vec![
        Keypoint::new(10.0, 10.0).with_score(0.39),
        Keypoint::new(20.0, 20.0).with_score(0.4),
    ]);
    assert!(bounding_box(&[], &[faint.clone()], 100.0, FRAME_W, FRAME_H).is_none());

    let snapshot = DetectionSnapshot::new(1, FRAME_W, FRAME_H, Vec::new(), vec![faint], 2);
    assert!(matches!(
        RegionStrategy::default().select(&snapshot),
        Err(CaptureError::NoDetection)
    ));
}

#[test]
fn confident_pose_extends_hand_box() {
    let hands = [hand_spanning(300.0, 300.0, 350.0, 350.0)];
    let pose = Pose::new(vec![
        Keypoint::new(500.0, 100.0).with_score(0.9),
        Keypoint::new(900.0, 650.0).with_score(0.1),
    ]);
    let bbox = bounding_box(&hands, &[pose], 0.0, FRAME_W, FRAME_H).expect("box");
    assert_eq!((bbox.x, bbox.y), (300.0, 100.0));
    assert_eq!((bbox.max_x(), bbox.max_y()), (500.0, 350.0));
}

#[test]
fn fixed_strategy_ignores_keypoints() {
    let snapshot = DetectionSnapshot::empty(3, FRAME_W, FRAME_H);
    let bbox = RegionStrategy::upper_body()
        .select(&snapshot)
        .expect("fixed band");
    assert_eq!(bbox.x, 0.0);
    assert_eq!(bbox.width, FRAME_W as f32);
    assert!((bbox.y - 102.0).abs() < 1e-3, "{:?}", bbox);
    assert!((bbox.height - 374.0).abs() < 1e-3, "{:?}", bbox);
}
