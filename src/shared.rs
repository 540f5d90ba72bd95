use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::auth::TokenConfig;
use crate::config::AppConfig;
use crate::users::repository::UsersRepository;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users_repository: Arc<dyn UsersRepository + Send + Sync>,
    pub tokens: TokenConfig,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        users_repository: Arc<dyn UsersRepository + Send + Sync>,
    ) -> Self {
        let tokens = TokenConfig::from_settings(&config.jwt, &config.app.name);
        Self {
            config,
            users_repository,
            tokens,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Request timeout: {0}")]
    RequestTimeout(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error")]
    Internal,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RequestTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            AppError::DatabaseError(_) | AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Code used when no route-specific code was attached
    fn default_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation-error",
            AppError::Conflict(_) => "conflict",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not-found",
            AppError::PayloadTooLarge(_) => "payload-too-large",
            AppError::RequestTimeout(_) => "request-timeout",
            AppError::DatabaseError(_) => "database-error",
            AppError::Internal => "internal-error",
        }
    }

    fn message(self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::RequestTimeout(msg) => msg,
            AppError::DatabaseError(msg) => format!("Database error: {}", msg),
            AppError::Internal => "Internal server error".to_string(),
        }
    }
}

/// Uniform success envelope: `{"status": 200, "data": ...}`
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: u16,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self::with_status(StatusCode::OK, data)
    }

    pub fn created(data: T) -> Self {
        Self::with_status(StatusCode::CREATED, data)
    }

    fn with_status(status: StatusCode, data: T) -> Self {
        Self {
            status: status.as_u16(),
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

/// Uniform error envelope: `{"status": 401, "code": "...", "message": "..."}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub code: String,
    pub message: String,
}

/// An [`AppError`] tagged with the opaque code of the route that produced it
#[derive(Debug)]
pub struct ApiError {
    pub code: &'static str,
    pub error: AppError,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        let body = ErrorBody {
            status: status.as_u16(),
            code: self.code.to_string(),
            message: self.error.message(),
        };

        (status, Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.default_code();
        ApiError { code, error: self }.into_response()
    }
}

/// Attaches a route error code to a fallible result
pub trait ErrorCode<T> {
    fn code(self, code: &'static str) -> Result<T, ApiError>;
}

impl<T> ErrorCode<T> for Result<T, AppError> {
    fn code(self, code: &'static str) -> Result<T, ApiError> {
        self.map_err(|error| ApiError { code, error })
    }
}
