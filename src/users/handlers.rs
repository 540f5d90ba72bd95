use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::{info, instrument};

use super::{
    service::UsersService,
    types::{
        AdminTokenResponse, Passport, RefreshTokenRequest, SigninRequest, SignupRequest,
        UserResponse,
    },
};
use crate::auth::{Role, UserClaims};
use crate::middleware::AuthContext;
use crate::shared::{ApiError, AppError, AppState, Envelope, ErrorCode};

const SIGN_UP_CUSTOMER_ERR: &str = "users-001";
const SIGN_IN_ERR: &str = "users-002";
const REFRESH_PASSPORT_ERR: &str = "users-003";
const SIGN_OUT_ERR: &str = "users-004";
const SIGN_UP_ADMIN_ERR: &str = "users-005";
const GET_USER_PROFILE_ERR: &str = "users-006";
const GENERATE_ADMIN_TOKEN_ERR: &str = "users-007";

/// Turns a body rejection into an enveloped error. An oversized body keeps
/// its 413; every other rejection is a validation error.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge(rejection.body_text()),
            _ => AppError::Validation(rejection.body_text()),
        })
}

/// POST /users/signup
#[instrument(name = "sign_up_customer", skip(state, payload))]
pub async fn sign_up_customer(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<Envelope<Passport>, ApiError> {
    sign_up(state, payload, Role::Customer, SIGN_UP_CUSTOMER_ERR).await
}

/// POST /users/signup-admin
#[instrument(name = "sign_up_admin", skip(state, payload))]
pub async fn sign_up_admin(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<Envelope<Passport>, ApiError> {
    sign_up(state, payload, Role::Admin, SIGN_UP_ADMIN_ERR).await
}

async fn sign_up(
    state: AppState,
    payload: Result<Json<SignupRequest>, JsonRejection>,
    role: Role,
    code: &'static str,
) -> Result<Envelope<Passport>, ApiError> {
    let request = body(payload).code(code)?;
    request.validate().code(code)?;

    let passport = UsersService::from_state(&state)
        .signup(request, role)
        .await
        .code(code)?;

    info!(user_id = %passport.user.id, role = %role, "User signed up");
    Ok(Envelope::created(passport))
}

/// POST /users/signin
#[instrument(name = "sign_in", skip(state, payload))]
pub async fn sign_in(
    State(state): State<AppState>,
    payload: Result<Json<SigninRequest>, JsonRejection>,
) -> Result<Envelope<Passport>, ApiError> {
    let request = body(payload).code(SIGN_IN_ERR)?;
    request.validate().code(SIGN_IN_ERR)?;

    let passport = UsersService::from_state(&state)
        .signin(request)
        .await
        .code(SIGN_IN_ERR)?;

    Ok(Envelope::ok(passport))
}

/// POST /users/refresh
#[instrument(name = "refresh_passport", skip(state, payload))]
pub async fn refresh_passport(
    State(state): State<AppState>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<Envelope<Passport>, ApiError> {
    let request = body(payload).code(REFRESH_PASSPORT_ERR)?;
    request.validate().code(REFRESH_PASSPORT_ERR)?;

    let passport = UsersService::from_state(&state)
        .refresh(&request.refresh_token)
        .await
        .code(REFRESH_PASSPORT_ERR)?;

    Ok(Envelope::ok(passport))
}

/// POST /users/signout
#[instrument(name = "sign_out", skip(state, payload))]
pub async fn sign_out(
    State(state): State<AppState>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<Envelope<()>, ApiError> {
    let request = body(payload).code(SIGN_OUT_ERR)?;
    request.validate().code(SIGN_OUT_ERR)?;

    UsersService::from_state(&state)
        .signout(&request.refresh_token)
        .await
        .code(SIGN_OUT_ERR)?;

    Ok(Envelope::ok(()))
}

/// GET /users/:user_id, behind `jwt_auth` and `params_check`
#[instrument(name = "get_user_profile", skip(state))]
pub async fn get_user_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Envelope<UserResponse>, ApiError> {
    let profile = UsersService::from_state(&state)
        .get_profile(&user_id)
        .await
        .code(GET_USER_PROFILE_ERR)?;

    Ok(Envelope::ok(profile))
}

/// GET /users/admin/secret, behind `jwt_auth` and `authorize(Admin)`
#[instrument(name = "generate_admin_token", skip(state, ctx), fields(user_id = %ctx.user_id))]
pub async fn generate_admin_token(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Envelope<AdminTokenResponse>, ApiError> {
    let user = UserClaims {
        id: ctx.user_id,
        role_id: ctx.role_id,
    };

    let token = UsersService::from_state(&state)
        .generate_admin_token(&user)
        .code(GENERATE_ADMIN_TOKEN_ERR)?;

    Ok(Envelope::ok(token))
}
