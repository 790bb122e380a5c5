use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::api::types::{ErrorResponse, MatchFailureDetails};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing required fields: {}", .missing.join(", "))]
    Validation { missing: Vec<String> },

    #[error("Image source error: {0}")]
    ImageSource(String),

    #[error("Cannot load face recognition models: {0}")]
    ModelUnavailable(String),

    #[error("Unable to detect faces in provided images")]
    NoFaceDetected,

    #[error("Face verification failed. Please upload clear matching photos.")]
    MatchFailed { distance: f64, threshold: f64 },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AccessDenied(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. }
            | AppError::ImageSource(_)
            | AppError::NoFaceDetected
            | AppError::MatchFailed { .. } => StatusCode::BAD_REQUEST,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::AccessDenied(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ModelUnavailable(_)
            | AppError::Database(_)
            | AppError::Serialization(_)
            | AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Structured detail forwarded verbatim to the response body, so failed
    /// verifications expose why (distance vs. threshold), not just a boolean.
    pub fn details(&self) -> Option<MatchFailureDetails> {
        match self {
            AppError::MatchFailed {
                distance,
                threshold,
            } => Some(MatchFailureDetails {
                distance: *distance,
                threshold: *threshold,
            }),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            message: self.to_string(),
            details: self.details(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
