use serde::{Deserialize, Serialize};

/// Response of both prediction endpoints.
///
/// `/predict` returns all four fields; `/predict_json` returns only the class and confidence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_class: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}
