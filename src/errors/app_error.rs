use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::core::service::ServiceError;

/// Errors returned by HTTP handlers
///
/// Every variant renders as a JSON body with an `error` field.
#[derive(Debug, Error)]
pub enum AppError {
    /// Requested speaker is not available for the language
    #[error("{message}")]
    InvalidSpeaker {
        message: String,
        speaker_id: String,
        language: String,
        available_speakers: Vec<String>,
    },

    /// Malformed request body
    #[error("{message}")]
    BadRequest { status: StatusCode, message: String },

    /// Model construction or synthesis failure
    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidSpeaker { .. } => StatusCode::BAD_REQUEST,
            AppError::BadRequest { status, .. } => *status,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::InvalidSpeaker {
                speaker_id,
                language,
                available,
            } => AppError::InvalidSpeaker {
                message,
                speaker_id,
                language,
                available_speakers: available,
            },
            ServiceError::ModelInit(_) | ServiceError::Generation(_) => {
                AppError::Internal(message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::InvalidSpeaker {
                message,
                speaker_id,
                language,
                available_speakers,
            } => json!({
                "error": message,
                "speaker_id": speaker_id,
                "language": language,
                "available_speakers": available_speakers,
            }),
            AppError::BadRequest { message, .. } => json!({"error": message}),
            AppError::Internal(message) => {
                error!("Request failed: {}", message);
                json!({"error": message})
            }
        };

        (status, Json(body)).into_response()
    }
}
