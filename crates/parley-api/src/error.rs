use std::time::Duration;

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use parley_db::{InvalidInput, UniqueViolation};
use parley_types::api::ErrorBody;

pub type ApiResult<T> = Result<T, ApiError>;

/// Every failure a chat or moderation operation can surface.
///
/// None of these leave partial state behind: each operation performs at most
/// one write, and every precondition is checked before it.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Request was throttled. Expected available in {} seconds.", retry_after_secs(.retry_after))]
    RateLimited { retry_after: Duration },

    #[error("Authentication credentials were not provided or are invalid.")]
    Unauthorized,

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-facing text. Internal failures never leak their cause.
    pub fn detail(&self) -> String {
        match self {
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Storage refusals become validation or conflict errors; anything else is a server fault.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<InvalidInput>() {
            Ok(invalid) => return ApiError::Validation(invalid.0),
            Err(err) => err,
        };
        match err.downcast::<UniqueViolation>() {
            Ok(taken) => ApiError::Conflict(taken.0),
            Err(err) => ApiError::Internal(err),
        }
    }
}

/// Malformed or mistyped JSON bodies are caller errors, reported like any other validation failure.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(err) = &self {
            error!("Internal error: {:#}", err);
        }

        let status = self.status_code();
        let mut response = (status, Json(ErrorBody { detail: self.detail() })).into_response();

        if let ApiError::RateLimited { retry_after } = self {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after_secs(&retry_after)),
            );
        }

        response
    }
}

/// Whole seconds, rounded up, never zero.
fn retry_after_secs(retry_after: &Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}
