use anyhow::anyhow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::encode::{encode_region, CropSettings, EncodedImage};
use super::CaptureError;
use crate::frame::Frame;
use crate::region::RegionStrategy;
use crate::snapshot::DetectionSnapshot;
use crate::upload::{LandmarkPayload, PredictionResult, PredictionService};

/// What gets submitted for classification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubmitMode {
    /// Crop the frame and upload a JPEG to `/predict`.
    #[default]
    Image,
    /// Send normalized keypoints to `/predict_json`.
    Landmarks,
}

impl SubmitMode {
    pub fn name(&self) -> &'static str {
        match self {
            SubmitMode::Image => "image",
            SubmitMode::Landmarks => "landmarks",
        }
    }
}

impl fmt::Display for SubmitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SubmitMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(SubmitMode::Image),
            "landmarks" | "landmark" | "json" => Ok(SubmitMode::Landmarks),
            other => Err(anyhow!(
                "unknown submit mode '{}'; expected image or landmarks",
                other
            )),
        }
    }
}

/// A capture that passed local validation and only needs to be sent.
#[derive(Clone, Debug)]
pub enum PreparedCapture {
    Image(EncodedImage),
    Landmarks(LandmarkPayload),
}

impl PreparedCapture {
    pub fn mode(&self) -> SubmitMode {
        match self {
            PreparedCapture::Image(_) => SubmitMode::Image,
            PreparedCapture::Landmarks(_) => SubmitMode::Landmarks,
        }
    }
}

/// Turns a frame plus its detection snapshot into a prediction request.
pub struct CaptureClient {
    service: Arc<dyn PredictionService>,
    strategy: RegionStrategy,
    crop: CropSettings,
    mode: SubmitMode,
}

impl CaptureClient {
    pub fn new(
        service: Arc<dyn PredictionService>,
        strategy: RegionStrategy,
        crop: CropSettings,
        mode: SubmitMode,
    ) -> Self {
        Self {
            service,
            strategy,
            crop,
            mode,
        }
    }

    pub fn mode(&self) -> SubmitMode {
        self.mode
    }

    pub fn strategy(&self) -> RegionStrategy {
        self.strategy
    }

    /// Select the region, crop and encode (image mode) or normalize keypoints (landmark mode).
    ///
    /// No network traffic happens here, so a failed detection is rejected before any request.
    pub fn prepare(
        &self,
        frame: &Frame,
        snapshot: &DetectionSnapshot,
    ) -> Result<PreparedCapture, CaptureError> {
        match self.mode {
            SubmitMode::Image => {
                let bbox = self.strategy.select(snapshot)?;
                log::debug!(
                    "capture region ({}) {:.0},{:.0} {:.0}x{:.0}",
                    self.strategy.name(),
                    bbox.x,
                    bbox.y,
                    bbox.width,
                    bbox.height
                );
                Ok(PreparedCapture::Image(encode_region(
                    frame, &bbox, &self.crop,
                )?))
            }
            SubmitMode::Landmarks => Ok(PreparedCapture::Landmarks(
                LandmarkPayload::from_snapshot(snapshot)?,
            )),
        }
    }

    pub fn submit(&self, prepared: &PreparedCapture) -> Result<PredictionResult, CaptureError> {
        match prepared {
            PreparedCapture::Image(image) => self.service.predict_image(image),
            PreparedCapture::Landmarks(payload) => self.service.predict_landmarks(payload),
        }
    }

    /// `prepare` followed by `submit` on the calling thread.
    pub fn capture(
        &self,
        frame: &Frame,
        snapshot: &DetectionSnapshot,
    ) -> Result<PredictionResult, CaptureError> {
        let prepared = self.prepare(frame, snapshot)?;
        self.submit(&prepared)
    }
}
