use axum::{
    extract::{Path, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::{info, instrument, warn};

use crate::auth::{Role, TokenKind};
use crate::shared::{ApiError, AppError, AppState, ErrorCode};
use crate::users::UsersService;

const JWT_AUTH_ERR: &str = "middleware-002";
const PARAMS_CHECK_ERR: &str = "middleware-003";
const AUTHORIZE_ERR: &str = "middleware-004";

/// Identity of an authenticated request, inserted by [`jwt_auth`]
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub user_id: String,
    pub role_id: i32,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        Role::from_id(self.role_id) == Some(Role::Admin)
    }
}

/// JWT authentication middleware - validates the Authorization Bearer header,
/// then checks the access token still belongs to a live oauth session.
/// Handlers can then extract `Extension<AuthContext>`.
#[instrument(skip(state, req, next), fields(uri = %req.uri()))]
pub async fn jwt_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req).code(JWT_AUTH_ERR)?;

    let claims = match state.tokens.parse(&token, TokenKind::Access) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("JWT authentication failed: {}", e);
            return Err(AppError::from(e)).code(JWT_AUTH_ERR);
        }
    };

    let service = UsersService::from_state(&state);
    if !service
        .is_access_token_active(&claims.id, &token)
        .await
        .code(JWT_AUTH_ERR)?
    {
        warn!(user_id = %claims.id, "Access token has been revoked");
        return Err(AppError::Unauthorized("no permission to access".to_string()))
            .code(JWT_AUTH_ERR);
    }

    info!(user_id = %claims.id, role = claims.role, "Authentication successful");

    req.extensions_mut().insert(AuthContext {
        user_id: claims.id,
        role_id: claims.role,
    });

    Ok(next.run(req).await)
}

/// Lets a request for `/:user_id` through only for that user or an admin.
/// Must run after [`jwt_auth`].
pub async fn params_check(
    Path(user_id): Path<String>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = auth_context(&req).code(PARAMS_CHECK_ERR)?;

    if ctx.user_id != user_id && !ctx.is_admin() {
        warn!(
            user_id = %ctx.user_id,
            requested = %user_id,
            "Access to another user's resource denied"
        );
        return Err(AppError::Forbidden("no permission to access".to_string()))
            .code(PARAMS_CHECK_ERR);
    }

    Ok(next.run(req).await)
}

/// Requires the authenticated user to hold `required`.
/// Usage: `.route_layer(middleware::from_fn_with_state(Role::Admin, authorize))`
pub async fn authorize(
    State(required): State<Role>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = auth_context(&req).code(AUTHORIZE_ERR)?;

    if Role::from_id(ctx.role_id) != Some(required) {
        warn!(user_id = %ctx.user_id, required = %required, "Role check failed");
        return Err(AppError::Forbidden("no permission to access".to_string()))
            .code(AUTHORIZE_ERR);
    }

    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Result<String, AppError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| {
            warn!("Missing Authorization header in request");
            AppError::Unauthorized("missing authorization header".to_string())
        })?;

    let token = header.strip_prefix("Bearer ").ok_or_else(|| {
        warn!("Invalid Authorization header format (expected Bearer token)");
        AppError::Unauthorized("invalid authorization header format".to_string())
    })?;

    Ok(token.trim().to_string())
}

fn auth_context(req: &Request) -> Result<AuthContext, AppError> {
    req.extensions()
        .get::<AuthContext>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("request is not authenticated".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserClaims;
    use crate::shared::test_utils::AppStateBuilder;
    use crate::users::models::OauthModel;
    use crate::users::repository::{InMemoryUsersRepository, UsersRepository};
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware::{from_fn, from_fn_with_state},
        routing::get,
        Extension, Router,
    };
    use std::sync::Arc;
    use tower::ServiceExt; // for `oneshot`

    async fn whoami(Extension(ctx): Extension<AuthContext>) -> String {
        ctx.user_id
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route(
                "/users/:user_id",
                get(whoami)
                    .route_layer(from_fn(params_check))
                    .route_layer(from_fn_with_state(state.clone(), jwt_auth)),
            )
            .route(
                "/admin",
                get(whoami)
                    .route_layer(from_fn_with_state(Role::Admin, authorize))
                    .route_layer(from_fn_with_state(state.clone(), jwt_auth)),
            )
            .with_state(state)
    }

    /// Issues an access token and registers it as a live session
    async fn login(
        state: &AppState,
        repo: &InMemoryUsersRepository,
        user_id: &str,
        role: Role,
    ) -> String {
        let user = UserClaims {
            id: user_id.to_string(),
            role_id: role.id(),
        };
        let access = state.tokens.sign(TokenKind::Access, &user).unwrap();
        let refresh = state.tokens.sign(TokenKind::Refresh, &user).unwrap();
        repo.insert_oauth(&OauthModel::new(user_id.to_string(), access.clone(), refresh))
            .await
            .unwrap();
        access
    }

    fn get_with_token(uri: &str, token: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn error_code(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        json["code"].as_str().unwrap().to_string()
    }

    fn setup() -> (AppState, Arc<InMemoryUsersRepository>) {
        let repo = Arc::new(InMemoryUsersRepository::new());
        let state = AppStateBuilder::new()
            .with_users_repository(repo.clone())
            .build();
        (state, repo)
    }

    #[tokio::test]
    async fn test_owner_passes() {
        let (state, repo) = setup();
        let token = login(&state, &repo, "U000042", Role::Customer).await;

        let response = app(state)
            .oneshot(get_with_token("/users/U000042", Some(&token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let (state, _) = setup();

        let response = app(state)
            .oneshot(get_with_token("/users/U000042", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(response).await, JWT_AUTH_ERR);
    }

    #[tokio::test]
    async fn test_non_bearer_header_is_unauthorized() {
        let (state, _) = setup();
        let request = HttpRequest::builder()
            .uri("/users/U000042")
            .header("Authorization", "Basic abc")
            .body(Body::empty())
            .unwrap();

        let response = app(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_but_unregistered_token_is_rejected() {
        let (state, _) = setup();
        let user = UserClaims {
            id: "U000042".to_string(),
            role_id: Role::Customer.id(),
        };
        let token = state.tokens.sign(TokenKind::Access, &user).unwrap();

        let response = app(state)
            .oneshot(get_with_token("/users/U000042", Some(&token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(response).await, JWT_AUTH_ERR);
    }

    #[tokio::test]
    async fn test_other_user_is_forbidden() {
        let (state, repo) = setup();
        let token = login(&state, &repo, "U000007", Role::Customer).await;

        let response = app(state)
            .oneshot(get_with_token("/users/U000042", Some(&token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(error_code(response).await, PARAMS_CHECK_ERR);
    }

    #[tokio::test]
    async fn test_admin_may_read_any_user() {
        let (state, repo) = setup();
        let token = login(&state, &repo, "U000001", Role::Admin).await;

        let response = app(state)
            .oneshot(get_with_token("/users/U000042", Some(&token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_authorize_requires_role() {
        let (state, repo) = setup();
        let customer = login(&state, &repo, "U000002", Role::Customer).await;
        let admin = login(&state, &repo, "U000001", Role::Admin).await;
        let app = app(state);

        let response = app
            .clone()
            .oneshot(get_with_token("/admin", Some(&customer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(error_code(response).await, AUTHORIZE_ERR);

        let response = app
            .oneshot(get_with_token("/admin", Some(&admin)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
