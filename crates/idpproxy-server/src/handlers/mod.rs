pub mod metadata;
pub mod social;

use std::any::Any;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use idpproxy_auth::social::SocialError;
use serde::Serialize;
use serde_json::json;

/// Body of every unexpected failure. Details only go to the log.
pub const UNKNOWN_ERROR: &str = "unknown error";

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Errors returned by handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response()
            }
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                unknown_error()
            }
        }
    }
}

impl From<SocialError> for ApiError {
    fn from(err: SocialError) -> Self {
        if err.is_provider_error() {
            tracing::debug!(error = %err, "social provider unavailable");
            return Self::NotFound;
        }
        if err.is_session_error() {
            tracing::info!(error = %err, "login request without a live session");
            return Self::BadRequest("unknown or expired login session".into());
        }
        match err {
            SocialError::Credentials(inner) => {
                tracing::warn!(error = %inner, "no consumer credentials for login");
                Self::BadRequest("service provider is not registered for this social service".into())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

pub fn unknown_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": UNKNOWN_ERROR })),
    )
        .into_response()
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn fallback() -> ApiError {
    ApiError::NotFound
}

/// Turns a handler panic into the generic error response.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "non-string panic payload"
    };
    tracing::error!(panic = %detail, "handler panicked");
    unknown_error()
}
