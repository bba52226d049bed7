use axum::response::{IntoResponse, Response};
use gantry_common::response;

/// Error kinds with a fixed HTTP mapping. Handlers propagate these with `?`;
/// the axum layer renders them as `{"reason": ...}` bodies.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    PreconditionNotMet(String),

    #[error("{0}")]
    ExternalService(String),

    #[error("{0}")]
    Unhealthy(String),

    #[error("invariant violation: {0}")]
    InconsistentState(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ApiError::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        ApiError::Conflict(what.into())
    }

    pub fn validation(what: impl Into<String>) -> Self {
        ApiError::Validation(what.into())
    }
}

impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error()
            && db_err.code() == &tokio_postgres::error::SqlState::UNIQUE_VIOLATION
        {
            return ApiError::Conflict(format!("Already exists: {}", db_err.message()));
        }
        ApiError::Internal(err.into())
    }
}

impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        ApiError::Internal(anyhow::anyhow!("database pool error: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(_) => response::not_found(self),
            ApiError::Conflict(_) => response::conflict(self),
            ApiError::Validation(_) => response::bad_request(self),
            ApiError::Forbidden(_) => response::forbidden(self),
            ApiError::PreconditionNotMet(_) => response::precondition_failed(self),
            ApiError::ExternalService(_) => response::bad_gateway(self),
            ApiError::Unhealthy(_) => response::service_unavailable(self),
            ApiError::InconsistentState(_) => {
                tracing::error!(error = %self, "inconsistent state detected");
                response::internal_server_error(self)
            }
            ApiError::Internal(_) => response::internal_server_error(self),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
