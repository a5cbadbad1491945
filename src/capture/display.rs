use std::time::{SystemTime, UNIX_EPOCH};

use super::{CaptureError, SubmitMode};
use crate::upload::PredictionResult;

/// What the user sees after a capture: the latest label and reference image, or an error.
///
/// Each outcome overwrites the previous one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplayState {
    label: Option<String>,
    image_src: Option<String>,
    error: Option<String>,
    updates: u64,
}

impl DisplayState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Reference image URL including its cache-busting query parameter.
    pub fn image_src(&self) -> Option<&str> {
        self.image_src.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Number of outcomes applied so far.
    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn apply_prediction(&mut self, result: &PredictionResult, mode: SubmitMode) {
        self.apply_prediction_at(result, mode, unix_millis());
    }

    pub fn apply_prediction_at(
        &mut self,
        result: &PredictionResult,
        mode: SubmitMode,
        now_millis: u64,
    ) {
        self.label = Some(match (mode, result.confidence) {
            (SubmitMode::Landmarks, Some(confidence)) => {
                format!("{} ({})", result.predicted_class, confidence)
            }
            _ => result.predicted_class.clone(),
        });
        self.image_src = result
            .image_url
            .as_deref()
            .map(|url| cache_busted(url, now_millis));
        self.error = None;
        self.updates += 1;
    }

    pub fn apply_error(&mut self, err: &CaptureError) {
        self.label = None;
        self.image_src = None;
        self.error = Some(format!("Error: {}", err));
        self.updates += 1;
    }
}

/// Append a `t=<millis>` query parameter so the image is refetched even when the server reuses
/// the same path.
pub fn cache_busted(url: &str, now_millis: u64) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}t={}", url, separator, now_millis)
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
