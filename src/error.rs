use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("already confirmed: {0}")]
    AlreadyConfirmed(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden(_) => "forbidden",
            AppError::InvalidState(_) => "invalid_state",
            AppError::AlreadyConfirmed(_) => "already_confirmed",
            AppError::Conflict(_) => "conflict",
            AppError::Transient(_) => "transient",
            AppError::BadRequest(_) => "bad_request",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Conflict(_) | AppError::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError::Transient(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AppError::NotFound(format!("match {id} not found")),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Unavailable(msg) => AppError::Transient(msg),
            StoreError::Corrupt(msg) => AppError::Internal(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                format!("this match can no longer be confirmed: {msg}"),
            ),
            AppError::InvalidState(msg) | AppError::AlreadyConfirmed(msg) => (
                StatusCode::CONFLICT,
                format!("this match can no longer be confirmed: {msg}"),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, format!("please retry: {msg}")),
            AppError::Transient(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message,
            "kind": self.kind(),
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{AppError, CacheError};
    use crate::store::StoreError;

    #[test]
    fn only_conflict_and_transient_are_retryable() {
        assert!(AppError::Conflict("x".into()).is_retryable());
        assert!(AppError::Transient("x".into()).is_retryable());
        assert!(!AppError::NotFound("x".into()).is_retryable());
        assert!(!AppError::Forbidden("x".into()).is_retryable());
        assert!(!AppError::InvalidState("x".into()).is_retryable());
        assert!(!AppError::AlreadyConfirmed("x".into()).is_retryable());
    }

    #[test]
    fn store_and_cache_failures_map_onto_taxonomy() {
        let id = Uuid::nil();
        assert!(matches!(
            AppError::from(StoreError::NotFound(id)),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(StoreError::Conflict("dup".into())),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            AppError::from(StoreError::Unavailable("down".into())),
            AppError::Transient(_)
        ));
        assert!(matches!(
            AppError::from(CacheError::Unavailable("down".into())),
            AppError::Transient(_)
        ));
    }
}
