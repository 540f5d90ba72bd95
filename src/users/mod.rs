use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};

use crate::auth::Role;
use crate::middleware::{authorize, jwt_auth, params_check};
use crate::shared::AppState;

// Public API - what other modules can use
pub use handlers::{
    generate_admin_token, get_user_profile, refresh_passport, sign_in, sign_out, sign_up_admin,
    sign_up_customer,
};
pub use service::UsersService;
pub use types::{AdminTokenResponse, Passport, UserResponse, UserToken};

// Internal modules
mod handlers;
pub mod models;
mod password;
pub mod repository;
mod service;
mod types;

/// Routes mounted under `/users`
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/signup", post(sign_up_customer))
        .route("/signup-admin", post(sign_up_admin))
        .route("/signin", post(sign_in))
        .route("/refresh", post(refresh_passport))
        .route("/signout", post(sign_out))
        .route(
            "/admin/secret",
            get(generate_admin_token)
                .route_layer(from_fn_with_state(Role::Admin, authorize))
                .route_layer(from_fn_with_state(state.clone(), jwt_auth)),
        )
        .route(
            "/:user_id",
            get(get_user_profile)
                .route_layer(from_fn(params_check))
                .route_layer(from_fn_with_state(state, jwt_auth)),
        )
}
