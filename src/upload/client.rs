use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use url::Url;

use super::multipart::MultipartForm;
use super::payload::LandmarkPayload;
use super::response::PredictionResult;
use crate::capture::{CaptureError, EncodedImage};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000";
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Multipart field carrying the image in `POST /predict`.
pub const IMAGE_FIELD: &str = "file";

const MAX_RESPONSE_BYTES: u64 = 1024 * 1024;
const MAX_ERROR_DETAIL_CHARS: usize = 200;

/// Remote classifier.
///
/// The HTTP client is the production implementation; tests substitute their own to observe
/// whether a network call would have happened.
pub trait PredictionService: Send + Sync {
    /// `POST /predict` with the image as a multipart file field.
    fn predict_image(&self, image: &EncodedImage) -> Result<PredictionResult, CaptureError>;

    /// `POST /predict_json` with normalized keypoints.
    fn predict_landmarks(
        &self,
        payload: &LandmarkPayload,
    ) -> Result<PredictionResult, CaptureError>;
}

/// Blocking HTTP client for the prediction service.
pub struct HttpPredictionClient {
    agent: ureq::Agent,
    base_url: Url,
    predict_url: Url,
    predict_json_url: Url,
}

impl HttpPredictionClient {
    /// `base` is the service root, e.g. `http://127.0.0.1:8000`. Every request is bounded by
    /// `timeout`.
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base).with_context(|| format!("parse endpoint {}", base))?;
        match base_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported endpoint scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let predict_url = base_url.join("predict").context("build /predict url")?;
        let predict_json_url = base_url
            .join("predict_json")
            .context("build /predict_json url")?;
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            agent,
            base_url,
            predict_url,
            predict_json_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a server-relative URL (such as `image_url`) against the endpoint.
    pub fn resolve(&self, reference: &str) -> Result<Url> {
        self.base_url
            .join(reference)
            .with_context(|| format!("resolve {} against {}", reference, self.base_url))
    }

    fn post(
        &self,
        url: &Url,
        content_type: &str,
        body: &[u8],
    ) -> Result<PredictionResult, CaptureError> {
        let response = self
            .agent
            .post(url.as_str())
            .set("Content-Type", content_type)
            .set("Accept", "application/json")
            .send_bytes(body)
            .map_err(|err| match err {
                ureq::Error::Status(status, response) => CaptureError::Upload {
                    status: Some(status),
                    message: error_detail(response),
                },
                ureq::Error::Transport(transport) => CaptureError::upload(transport.to_string()),
            })?;

        let status = response.status();
        let reader = std::io::Read::take(response.into_reader(), MAX_RESPONSE_BYTES);
        serde_json::from_reader(reader).map_err(|e| CaptureError::Upload {
            status: Some(status),
            message: format!("invalid prediction response: {}", e),
        })
    }
}

impl PredictionService for HttpPredictionClient {
    fn predict_image(&self, image: &EncodedImage) -> Result<PredictionResult, CaptureError> {
        let mut form = MultipartForm::new();
        form.add_file(IMAGE_FIELD, &image.filename, image.content_type, &image.bytes);
        let content_type = form.content_type();
        let body = form.finish();
        log::debug!(
            "uploading {}x{} crop ({} bytes) to {}",
            image.width,
            image.height,
            body.len(),
            self.predict_url
        );
        self.post(&self.predict_url, &content_type, &body)
    }

    fn predict_landmarks(
        &self,
        payload: &LandmarkPayload,
    ) -> Result<PredictionResult, CaptureError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| CaptureError::Encode(format!("serialize landmarks: {}", e)))?;
        log::debug!(
            "submitting {} landmarks to {}",
            payload.point_count(),
            self.predict_json_url
        );
        self.post(&self.predict_json_url, "application/json", &body)
    }
}

fn error_detail(response: ureq::Response) -> String {
    let status_text = response.status_text().to_string();
    match response.into_string() {
        Ok(body) if !body.trim().is_empty() => {
            body.trim().chars().take(MAX_ERROR_DETAIL_CHARS).collect()
        }
        _ => status_text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_paths_are_appended() -> Result<()> {
        let client = HttpPredictionClient::new("http://127.0.0.1:8000", DEFAULT_UPLOAD_TIMEOUT)?;
        assert_eq!(client.predict_url.as_str(), "http://127.0.0.1:8000/predict");
        assert_eq!(
            client.predict_json_url.as_str(),
            "http://127.0.0.1:8000/predict_json"
        );

        let nested = HttpPredictionClient::new("http://host/api/v1", DEFAULT_UPLOAD_TIMEOUT)?;
        assert_eq!(nested.predict_url.as_str(), "http://host/api/v1/predict");
        assert_eq!(
            nested.resolve("/static/uploads/hand.jpg")?.as_str(),
            "http://host/static/uploads/hand.jpg"
        );
        Ok(())
    }

    #[test]
    fn rejects_non_http_endpoints() {
        assert!(HttpPredictionClient::new("ftp://host", DEFAULT_UPLOAD_TIMEOUT).is_err());
        assert!(HttpPredictionClient::new("not a url", DEFAULT_UPLOAD_TIMEOUT).is_err());
    }
}
