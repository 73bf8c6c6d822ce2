use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use super::json_response;
use crate::news::CursorError;
use crate::util::UrlValidationError;

/// Request-level failures, rendered as `{"error": "<code>"}`.
///
/// Per-source feed failures never reach this type; they are absorbed by the
/// fetcher and cost the response only that source's items.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(#[from] CursorError),

    #[error("invalid thumbnail url: {0}")]
    InvalidUrl(#[from] UrlValidationError),

    #[error("not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("no feed sources configured for {0}")]
    NoSourcesConfigured(String),

    #[error("thumbnail upstream answered {0}")]
    ThumbUpstreamStatus(u16),

    #[error("thumbnail upstream unreachable: {0}")]
    ThumbUpstreamUnavailable(String),

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidCursor(_) | ApiError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NoSourcesConfigured(_) | ApiError::Encode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::ThumbUpstreamStatus(_) | ApiError::ThumbUpstreamUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> String {
        match self {
            ApiError::InvalidCursor(_) => "invalid_cursor".into(),
            ApiError::InvalidUrl(_) => "invalid_url".into(),
            ApiError::NotFound => "not_found".into(),
            ApiError::MethodNotAllowed => "method_not_allowed".into(),
            ApiError::RateLimited => "rate_limited".into(),
            ApiError::NoSourcesConfigured(_) => "no_sources_configured".into(),
            ApiError::ThumbUpstreamStatus(status) => format!("thumb_upstream_{status}"),
            ApiError::ThumbUpstreamUnavailable(_) => "thumb_upstream_unavailable".into(),
            ApiError::Encode(_) => "internal_error".into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }
        json_response(status, &json!({ "error": self.code() }))
    }
}
