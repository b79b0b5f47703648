use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Vision API error: {0}")]
    Vision(#[from] VisionError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Vision model API errors
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors surfaced by a single analysis request.
///
/// A malformed model reply is not an error: the normalizer turns it into an
/// `invalid_image` diagnosis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid upload: {reason}")]
    InvalidUpload { reason: String },

    #[error("Disease detection unavailable: {0}")]
    DetectionUnavailable(#[from] VisionError),

    #[error("Storage failure: {0}")]
    StorageFailure(#[from] StorageError),
}

/// HTTP-facing error rendered as `{"detail": ...}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    Internal(String),
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::InvalidUpload { .. } => ApiError::BadRequest(err.to_string()),
            AnalysisError::DetectionUnavailable(_) | AnalysisError::StorageFailure(_) => {
                ApiError::Internal(format!("Failed to process image file: {}", err))
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Internal(format!("Internal server error: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for vision API operations
pub type VisionResult<T> = Result<T, VisionError>;

/// Result type alias for analysis requests
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Result type alias for HTTP handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection {
            message: "failed to connect".to_string(),
        };
        assert_eq!(err.to_string(), "Database connection failed: failed to connect");

        let err = StorageError::Query {
            message: "syntax error".to_string(),
        };
        assert_eq!(err.to_string(), "Query failed: syntax error");

        let err = StorageError::Migration {
            message: "version mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "Migration failed: version mismatch");
    }

    #[test]
    fn test_vision_error_display() {
        let err = VisionError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = VisionError::InvalidResponse {
            message: "no choices".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid response: no choices");

        let err = VisionError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_analysis_error_display() {
        let err = AnalysisError::InvalidUpload {
            reason: "file is empty".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid upload: file is empty");

        let err: AnalysisError = VisionError::Timeout { timeout_ms: 10 }.into();
        assert_eq!(
            err.to_string(),
            "Disease detection unavailable: Request timeout after 10ms"
        );
    }

    #[test]
    fn test_analysis_error_maps_to_status() {
        let invalid: ApiError = AnalysisError::InvalidUpload {
            reason: "empty".to_string(),
        }
        .into();
        assert_eq!(invalid.into_response().status(), StatusCode::BAD_REQUEST);

        let unavailable: ApiError = AnalysisError::DetectionUnavailable(VisionError::Api {
            status: 503,
            message: "down".to_string(),
        })
        .into();
        assert_eq!(
            unavailable.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let storage: ApiError = AnalysisError::StorageFailure(StorageError::Query {
            message: "locked".to_string(),
        })
        .into();
        assert_eq!(
            storage.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_status() {
        let err = ApiError::NotFound("Image not found".to_string());
        assert_eq!(err.to_string(), "Image not found");
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let err = ApiError::PayloadTooLarge("too big".to_string());
        assert_eq!(err.into_response().status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let storage_err = StorageError::Query {
            message: "test".to_string(),
        };
        let app_err: AppError = storage_err.into();
        assert!(matches!(app_err, AppError::Storage(_)));
    }

    #[test]
    fn test_vision_error_conversion_to_app_error() {
        let vision_err = VisionError::Timeout { timeout_ms: 1000 };
        let app_err: AppError = vision_err.into();
        assert!(matches!(app_err, AppError::Vision(_)));
    }
}
