// Public API - what other modules can use
pub use auth::{authorize, jwt_auth, params_check, AuthContext};

mod auth;

use axum::{
    http::{Method, Uri},
    BoxError,
};
use tower::timeout::error::Elapsed;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};

use crate::shared::{ApiError, AppError};

const ROUTER_CHECK_ERR: &str = "middleware-001";
const REQUEST_TIMEOUT_ERR: &str = "middleware-005";

/// Fallback for unknown routes
pub async fn router_check(method: Method, uri: Uri) -> ApiError {
    warn!(%method, %uri, "No route matched");
    ApiError {
        code: ROUTER_CHECK_ERR,
        error: AppError::NotFound("router not found".to_string()),
    }
}

/// Error handler for the request timeout layer
pub async fn handle_timeout(method: Method, uri: Uri, err: BoxError) -> ApiError {
    if err.is::<Elapsed>() {
        warn!(%method, %uri, "Request timed out");
        return ApiError {
            code: REQUEST_TIMEOUT_ERR,
            error: AppError::RequestTimeout("request timed out".to_string()),
        };
    }

    error!(%method, %uri, error = %err, "Unhandled middleware error");
    ApiError {
        code: REQUEST_TIMEOUT_ERR,
        error: AppError::Internal,
    }
}

/// Any origin, the usual REST verbs, no credentials
pub fn cors() -> CorsLayer {
    CorsLayer::new().allow_origin(Any).allow_methods([
        Method::GET,
        Method::POST,
        Method::HEAD,
        Method::PUT,
        Method::DELETE,
        Method::PATCH,
    ])
}
