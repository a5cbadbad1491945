use std::fmt;

/// Failure kinds a capture caller needs to tell apart.
///
/// Every variant is terminal for the operation that produced it; nothing is retried.
#[derive(Debug)]
pub enum CaptureError {
    /// The camera could not be opened. Fatal at startup.
    CameraUnavailable(String),
    /// No hands and no confident pose keypoints at capture time, or the region has no area.
    NoDetection,
    /// A capture is already in flight and the policy allows only one.
    CaptureBusy,
    /// Cropping or image encoding failed.
    Encode(String),
    /// Network failure, non-success status, or an unreadable response body.
    Upload {
        status: Option<u16>,
        message: String,
    },
}

impl CaptureError {
    pub fn upload(message: impl Into<String>) -> Self {
        CaptureError::Upload {
            status: None,
            message: message.into(),
        }
    }

    /// True for failures that only abort the current capture.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CaptureError::CameraUnavailable(_))
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::CameraUnavailable(reason) => write!(f, "camera unavailable: {reason}"),
            CaptureError::NoDetection => write!(f, "no hands or upper body detected"),
            CaptureError::CaptureBusy => write!(f, "a capture is already in flight"),
            CaptureError::Encode(reason) => write!(f, "failed to encode capture: {reason}"),
            CaptureError::Upload {
                status: Some(status),
                message,
            } => write!(f, "prediction request failed (HTTP {status}): {message}"),
            CaptureError::Upload {
                status: None,
                message,
            } => write!(f, "prediction request failed: {message}"),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::Encode(err.to_string())
    }
}
