use anyhow::Result;

use crate::frame::Frame;
use crate::keypoint::{Hand, Pose};

/// What a provider can estimate.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LandmarkCapability {
    Hands,
    Pose,
}

/// Hand/pose landmark estimator.
///
/// Providers wrap a pretrained model (or a recording of one). They receive the frame by
/// reference for the duration of the call and return keypoints in frame-pixel coordinates.
/// Both estimators return an empty list when nothing is detected.
pub trait LandmarkProvider: Send {
    /// Provider identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the provider supports a capability.
    fn supports(&self, capability: LandmarkCapability) -> bool;

    /// Estimate hands in `frame`, at most `max_hands` of them.
    fn estimate_hands(&mut self, frame: &Frame, max_hands: usize) -> Result<Vec<Hand>>;

    /// Estimate body poses in `frame`.
    fn estimate_poses(&mut self, frame: &Frame) -> Result<Vec<Pose>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
