//! Error taxonomy shared by the connection manager and its HTTP surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::connection::DbType;
use crate::response::ApiResponse;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Application error.
#[derive(Debug, Error)]
pub enum AppError {
    /// The referenced connection id does not exist.
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    /// The configuration exists but is flagged inactive.
    #[error("Connection is not active: {0}")]
    ConnectionInactive(String),

    /// No driver adapter exists for the configuration's protocol family.
    #[error("Unsupported database type: {0}")]
    UnsupportedProtocol(String),

    /// Any failure reported by a native driver.
    #[error("{db_type} driver error: {message}")]
    Driver { db_type: DbType, message: String },

    /// Free-form options failed validation against the driver's allowed keys.
    #[error("Invalid connection options: {0}")]
    InvalidOptions(String),

    /// Configuration or request validation failed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The configuration store could not be read.
    #[error("Configuration store error: {0}")]
    Store(String),
}

impl AppError {
    /// Wraps a native driver failure.
    pub fn driver(db_type: DbType, message: impl Into<String>) -> Self {
        AppError::Driver {
            db_type,
            message: message.into(),
        }
    }

    /// Stable error code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ConnectionNotFound(_) => "CONNECTION_NOT_FOUND",
            AppError::ConnectionInactive(_) => "CONNECTION_INACTIVE",
            AppError::UnsupportedProtocol(_) => "UNSUPPORTED_DATABASE_TYPE",
            AppError::Driver { .. } => "DRIVER_ERROR",
            AppError::InvalidOptions(_) => "INVALID_OPTIONS",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Store(_) => "STORE_ERROR",
        }
    }

    /// HTTP status the error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::ConnectionInactive(_) => StatusCode::CONFLICT,
            AppError::UnsupportedProtocol(_) | AppError::InvalidOptions(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Driver { .. } => StatusCode::BAD_GATEWAY,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}
