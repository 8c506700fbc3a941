use serde::Serialize;

/// Top-scoring class picked from a probability vector.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub index: usize,
    pub label: String,
    pub confidence: f32,
}

/// Result of a single pass through the inference pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutcome {
    Success {
        disease: String,
        recommendation: String,
    },
    Rejected {
        reason: String,
    },
}

#[derive(Debug, Serialize)]
pub struct WelcomeResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiagnosisResponse {
    #[serde(rename = "Disease")]
    pub disease: String,
    #[serde(rename = "Recommendation")]
    pub recommendation: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub classes: usize,
    pub confidence_threshold: f32,
}
