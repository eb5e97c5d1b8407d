use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("Unknown viewpoint label: {0}")]
    UnknownLabel(String),

    #[error("Model artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("Model artifact corrupt: {}: {reason}", .path.display())]
    ArtifactCorrupt { path: PathBuf, reason: String },

    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {0} bytes, max allowed: {1} bytes")]
    FileTooLarge(usize, usize),

    #[error("Request body exceeds the {0} byte limit")]
    RequestTooLarge(usize),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ValidatorError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ValidatorError::ArtifactCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ValidatorError::UnknownLabel(_) => StatusCode::BAD_REQUEST,
            ValidatorError::Decode(_) => StatusCode::BAD_REQUEST,
            ValidatorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ValidatorError::FileTooLarge(_, _) | ValidatorError::RequestTooLarge(_) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ValidatorError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ValidatorError::ArtifactNotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
            ValidatorError::ArtifactCorrupt { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ValidatorError::UnknownLabel(_) => "UNKNOWN_LABEL",
            ValidatorError::ArtifactNotFound(_) => "ARTIFACT_NOT_FOUND",
            ValidatorError::ArtifactCorrupt { .. } => "ARTIFACT_CORRUPT",
            ValidatorError::Decode(_) => "DECODE_ERROR",
            ValidatorError::ValidationFailed(_) => "VALIDATION_FAILED",
            ValidatorError::InvalidInput(_) => "INVALID_INPUT",
            ValidatorError::FileTooLarge(_, _) | ValidatorError::RequestTooLarge(_) => {
                "FILE_TOO_LARGE"
            }
            ValidatorError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ValidatorError::Config(_) => "CONFIG_ERROR",
            ValidatorError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 调用方的问题：换一张图片或换一个标签即可
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ValidatorError::UnknownLabel(_)
                | ValidatorError::Decode(_)
                | ValidatorError::InvalidInput(_)
                | ValidatorError::FileTooLarge(_, _)
                | ValidatorError::RequestTooLarge(_)
                | ValidatorError::UnsupportedFormat(_)
        )
    }

    /// 部署问题：模型文件缺失或损坏，需要运维介入
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            ValidatorError::ArtifactNotFound(_) | ValidatorError::ArtifactCorrupt { .. }
        )
    }
}

impl From<image::ImageError> for ValidatorError {
    fn from(err: image::ImageError) -> Self {
        ValidatorError::Decode(err.to_string())
    }
}

impl From<ort::Error> for ValidatorError {
    fn from(err: ort::Error) -> Self {
        ValidatorError::ValidationFailed(format!("ORT error: {}", err))
    }
}

impl From<base64::DecodeError> for ValidatorError {
    fn from(err: base64::DecodeError) -> Self {
        ValidatorError::InvalidInput(format!("Base64 decode error: {}", err))
    }
}

impl IntoResponse for ValidatorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        });

        if self.is_caller_error() {
            tracing::warn!("Request rejected: {} ({})", self, status);
        } else if self.is_operational() {
            tracing::error!("Model deployment problem: {} ({})", self, status);
        } else {
            tracing::error!("Request failed: {} ({})", self, status);
        }

        (status, axum::Json(error_response)).into_response()
    }
}
