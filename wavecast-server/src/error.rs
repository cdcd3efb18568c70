//! Maps `wavecast_core::WavecastError` onto HTTP responses.
//!
//! A newtype wrapping the core error that implements `IntoResponse`, so a
//! handler can just `?` a `Result<_, ApiError>` instead of matching error
//! kinds by hand at every call site.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use wavecast_core::WavecastError;

pub struct ApiError(pub WavecastError);

impl From<WavecastError> for ApiError {
    fn from(err: WavecastError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            WavecastError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            WavecastError::InvalidInput(_) | WavecastError::EngineUnavailable(_) => StatusCode::BAD_REQUEST,
            WavecastError::NotImplemented { .. } => StatusCode::NOT_IMPLEMENTED,
            WavecastError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            WavecastError::Recognizer(_) | WavecastError::Io(_) | WavecastError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}
