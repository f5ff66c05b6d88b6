use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::{ApiResponse, ErrorMessage};
use crate::range::InvalidRangeError;

/// Errors returned by the HTTP handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    InvalidRange(#[from] InvalidRangeError),

    #[error("Event not found")]
    NotFound,

    #[error("Requested resource not found: {0}")]
    RouteNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) | ApiError::InvalidRange(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound | ApiError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Validation(messages) => ErrorMessage::Many(messages),
            ApiError::Database(e) => {
                tracing::error!("Database error: {}", e);
                ErrorMessage::One("Internal server error".to_string())
            }
            other => ErrorMessage::One(other.to_string()),
        };

        (status, Json(ApiResponse::<()>::failure(message))).into_response()
    }
}
