use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

use crate::domain::auth::authenticator::AuthError;
use crate::domain::event::service::event_decoder::DecodeError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad Token")]
    Unauthorized,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Rollout controller is not running")]
    ControllerUnavailable,
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AuthenticationFailure => AppError::Unauthorized,
        }
    }
}

impl From<DecodeError> for AppError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::MalformedPayload(reason) => AppError::MalformedPayload(reason),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::ControllerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();

        // String provided by thiserror → safe JSON message
        let body = Json(json!({
            "message": self.to_string()
        }));

        (status, body).into_response()
    }
}
