//! Prediction service client.
//!
//! Two request shapes are supported:
//! - `POST /predict`: multipart body with one `file` field holding a JPEG crop.
//! - `POST /predict_json`: JSON body with normalized hand and pose keypoints.
//!
//! Requests are blocking and carry an explicit timeout. Failures are reported as
//! `CaptureError::Upload` and never retried.

mod client;
mod multipart;
mod payload;
mod response;

pub use client::{
    HttpPredictionClient, PredictionService, DEFAULT_ENDPOINT, DEFAULT_UPLOAD_TIMEOUT, IMAGE_FIELD,
};
pub use multipart::MultipartForm;
pub use payload::{LandmarkPayload, NormalizedPoint};
pub use response::PredictionResult;
