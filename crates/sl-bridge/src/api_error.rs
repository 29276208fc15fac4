//! HTTP API error types.
//!
//! Every non-2xx response carries a JSON body `{"error": "..."}`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sl_core::error::CoordinatorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with current task or worker state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Well-formed but semantically rejected, e.g. a dependency cycle.
    #[error("unprocessable: {0}")]
    Unprocessable(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        let msg = err.to_string();
        match err {
            CoordinatorError::TaskNotFound(_) | CoordinatorError::UnknownReviewUnit(_) => {
                ApiError::NotFound(msg)
            }
            CoordinatorError::DependencyCycle { .. } => ApiError::Unprocessable(msg),
            CoordinatorError::DuplicateTask(_)
            | CoordinatorError::InvalidTransition { .. }
            | CoordinatorError::NotAssigned { .. }
            | CoordinatorError::TaskActive { .. } => {
                tracing::warn!(error = %msg, "rejected request");
                ApiError::Conflict(msg)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::NotFound(m)
            | ApiError::Conflict(m)
            | ApiError::Unprocessable(m)
            | ApiError::BadRequest(m)
            | ApiError::InternalError(m) => m,
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
