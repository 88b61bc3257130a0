use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use ar_common::CodecError;
use ar_queue::QueueError;
use ar_store::StoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("problem not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
            ApiError::Queue(e) => {
                error!(error = %e, "broker unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "message broker unavailable".to_string(),
                )
            }
            ApiError::Storage(e) => {
                error!(error = %e, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage failure".to_string(),
                )
            }
            ApiError::Codec(e) => {
                error!(error = %e, "codec failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal encoding failure".to_string(),
                )
            }
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}
