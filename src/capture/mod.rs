//! Capture and upload orchestration.
//!
//! A capture takes the frame and detection snapshot from one tick and either:
//! - crops the selected region, pads it and uploads a JPEG (image mode), or
//! - normalizes the keypoints and submits them as JSON (landmark mode).
//!
//! The outcome lands in a `DisplayState`. Failures never stop the detection loop.

mod client;
mod display;
mod dispatch;
mod encode;
mod error;

pub use client::{CaptureClient, PreparedCapture, SubmitMode};
pub use display::{cache_busted, DisplayState};
pub use dispatch::{CaptureDispatcher, CaptureOutcome, InFlightPolicy};
pub use encode::{
    encode_jpeg, encode_region, pad_vertically, CropSettings, EncodedImage, DEFAULT_JPEG_QUALITY,
    DEFAULT_PADDING, DEFAULT_UPLOAD_FILENAME,
};
pub use error::CaptureError;
