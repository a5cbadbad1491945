//! Sign capture client.
//!
//! Reads frames from a camera, runs hand and pose landmark estimation on every tick, draws
//! the skeleton overlay and, on request, sends either a cropped image or normalized
//! keypoints to a remote sign classifier.
//!
//! # Data flow
//!
//! Camera source → landmark provider → {overlay, region selector} → capture client →
//! prediction service → display state.
//!
//! # Module Structure
//!
//! - `ingest`: Frame sources (synthetic, HTTP MJPEG/JPEG, V4L2)
//! - `frame`: Owned RGB frames and cropping
//! - `keypoint`, `snapshot`: Hand/pose keypoints and the per-tick detection snapshot
//! - `landmarks`: Provider trait, registry and the shipped providers
//! - `region`: Bounding box selection with margin and clamping
//! - `overlay`: Skeleton rendering
//! - `pipeline`: Tickers and the detection loop
//! - `capture`, `upload`: Capture preparation, dispatch and the prediction client
//! - `config`: File + environment configuration

pub mod capture;
pub mod config;
pub mod frame;
pub mod ingest;
pub mod keypoint;
pub mod landmarks;
pub mod overlay;
pub mod pipeline;
pub mod region;
pub mod snapshot;
pub mod upload;

pub use capture::{
    CaptureClient, CaptureDispatcher, CaptureError, CaptureOutcome, CropSettings, DisplayState,
    InFlightPolicy, SubmitMode,
};
pub use config::CaptureConfig;
pub use frame::Frame;
pub use ingest::{open_source, CameraConfig, FrameSource};
pub use keypoint::{Hand, Keypoint, Pose};
pub use landmarks::{LandmarkCapability, LandmarkProvider, ProviderRegistry};
pub use overlay::{OverlayRenderer, OverlayStyle};
pub use pipeline::{DetectionLoop, FixedRateTicker, ManualTicker, Observation, Ticker};
pub use region::{bounding_box, BoundingBox, PixelRect, RegionStrategy};
pub use snapshot::DetectionSnapshot;
pub use upload::{HttpPredictionClient, PredictionResult, PredictionService};
