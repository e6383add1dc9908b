//! API error type and its HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::core::errors::AppError;

/// Errors surfaced to HTTP clients. Every variant maps to a status code
/// and a `{"success": false, "message": ...}` JSON body.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or out-of-range input. 400.
    #[error("{0}")]
    Validation(String),
    /// Missing, invalid, or expired credentials. 401.
    #[error("{0}")]
    Unauthorized(String),
    /// The entity does not exist for this owner. 404.
    #[error("{0}")]
    NotFound(String),
    /// Too many requests from this address. 429.
    #[error("{0}")]
    RateLimited(String),
    /// The upstream model call failed. 502.
    #[error("{0}")]
    Upstream(String),
    /// Storage or other internal failure. 500.
    #[error("internal error")]
    Internal(#[from] AppError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            // Internal detail stays in the logs, not on the wire.
            Self::Internal(e) => {
                tracing::error!(error = %e, "request failed internally");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "success": false,
            "message": self.message(),
        }));
        (status, body).into_response()
    }
}

/// Handler result alias.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_taxonomy() {
        assert_eq!(
            ApiError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::RateLimited("x".into()).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Upstream("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Internal(AppError::Upstream("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_detail_is_not_leaked() {
        let error = ApiError::Internal(AppError::Upstream("secret detail".into()));
        assert_eq!(error.message(), "Internal server error");
    }
}
