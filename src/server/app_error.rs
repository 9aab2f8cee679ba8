use axum::{Json, http::StatusCode, response::IntoResponse};
use tracing::warn;

use crate::event::NormalizeError;

/// Error type for the REST API.
///
/// This error type is used to convert errors into HTTP responses.
/// The standard error response looks like this:
///
/// ```json
/// {
///     "ok": false,
///     "error": "ERROR_CODE",
///     "message": "Error message"
/// }
/// ```
#[derive(Debug, thiserror::Error, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AppError {
    #[error("Invalid webhook secret")]
    InvalidSecret,

    #[error("Malformed event body: {0}")]
    MalformedBody(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidSecret => StatusCode::UNAUTHORIZED,
            Self::MalformedBody(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Converts errors into HTTP responses.
impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        // Error code is the enum variant name in SCREAMING_SNAKE_CASE.
        let error_code = self.as_ref();
        let message = self.to_string();
        let status_code = self.status_code();
        let json = serde_json::json!({ "ok": false, "error": error_code, "message": message });

        warn!("Returning error {error_code}: {message}");
        (status_code, Json(json)).into_response()
    }
}

/// Converts normalization failures into application errors.
impl From<NormalizeError> for AppError {
    fn from(error: NormalizeError) -> Self {
        AppError::MalformedBody(error.to_string())
    }
}
