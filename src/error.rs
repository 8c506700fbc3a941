use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Failures of the inference pipeline. The display strings are returned to
/// clients verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PredictError {
    #[error("Only .jpg, .jpeg, and .png files are supported.")]
    UnsupportedFileType,

    #[error("Invalid or corrupted image file.")]
    CorruptImage,

    #[error("Low confidence prediction. Please upload a valid plant leaf image.")]
    LowConfidence,

    #[error("{0}")]
    Internal(String),
}

impl PredictError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedFileType | Self::CorruptImage | Self::LowConfidence => {
                StatusCode::BAD_REQUEST
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Classifier adapter errors.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Model artifact not found at {0}")]
    ModelMissing(String),

    #[error("Failed to load model {path}: {message}")]
    Load { path: String, message: String },

    #[error("Model inference failed: {0}")]
    Inference(String),
}

impl From<ClassifierError> for PredictError {
    fn from(err: ClassifierError) -> Self {
        PredictError::Internal(err.to_string())
    }
}

/// Errors surfaced by the HTTP boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Field 'file' is required.")]
    MissingFile,

    #[error("Invalid multipart form: {0}")]
    Multipart(String),

    #[error("Uploaded file exceeds the {0} byte limit.")]
    PayloadTooLarge(usize),

    #[error(transparent)]
    Predict(#[from] PredictError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingFile | Self::Multipart(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Predict(err) => err.status_code(),
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
