use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use esgdash_core::upstream::UpstreamError;
use serde_json::json;

/// JSON error envelope: `{ "error": message }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unavailable(what: &str) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("{what} is not configured"),
        )
    }

    /// Logs `err` and, for server errors, reports it to Sentry. The caller only
    /// ever sees `message`.
    pub fn report(status: StatusCode, message: impl Into<String>, err: anyhow::Error) -> Self {
        let message = message.into();
        if status.is_server_error() {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%status, %message, error = %format!("{err:#}"), "request failed");
        } else {
            tracing::warn!(%status, %message, error = %format!("{err:#}"), "request rejected");
        }
        Self::new(status, message)
    }

    pub fn internal(message: impl Into<String>, err: anyhow::Error) -> Self {
        Self::report(StatusCode::INTERNAL_SERVER_ERROR, message, err)
    }

    /// Passes a non-success upstream status through; anything else is a 500.
    pub fn relay(err: UpstreamError, message: impl Into<String>) -> Self {
        let status = err
            .status()
            .and_then(|s| StatusCode::from_u16(s).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::report(status, message, err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
