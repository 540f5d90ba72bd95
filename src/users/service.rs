use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{
    models::{NewUser, OauthModel, UserModel},
    password::PasswordHasher,
    repository::UsersRepository,
    types::{AdminTokenResponse, Passport, SigninRequest, SignupRequest, UserResponse},
};
use crate::auth::{Role, TokenConfig, TokenKind, UserClaims};
use crate::shared::{AppError, AppState};

const BAD_CREDENTIALS: &str = "email or password is invalid";

/// Service for signup, signin and the token lifecycle
pub struct UsersService {
    repository: Arc<dyn UsersRepository + Send + Sync>,
    tokens: TokenConfig,
    hasher: PasswordHasher,
}

impl UsersService {
    pub fn new(
        repository: Arc<dyn UsersRepository + Send + Sync>,
        tokens: TokenConfig,
        hasher: PasswordHasher,
    ) -> Self {
        Self {
            repository,
            tokens,
            hasher,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            Arc::clone(&state.users_repository),
            state.tokens.clone(),
            PasswordHasher::new(state.config.bcrypt_cost),
        )
    }

    /// Registers a user with the given role and opens a first session.
    /// A duplicate email or username fails with `Conflict` and creates nothing.
    #[instrument(skip(self, request, role), fields(email = %request.email, role = %role))]
    pub async fn signup(&self, request: SignupRequest, role: Role) -> Result<Passport, AppError> {
        let password = self.hasher.hash(request.password).await?;

        let user = self
            .repository
            .insert_user(&NewUser {
                email: request.email,
                password,
                username: request.username,
                role_id: role.id(),
            })
            .await?;

        info!(user_id = %user.id, "User registered");
        self.open_session(user).await
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn signin(&self, request: SigninRequest) -> Result<Passport, AppError> {
        let user = self
            .repository
            .find_user_by_email(&request.email)
            .await?
            .ok_or_else(|| {
                warn!("Sign in for unknown email");
                AppError::Unauthorized(BAD_CREDENTIALS.to_string())
            })?;

        if !self
            .hasher
            .verify(request.password, user.password.clone())
            .await?
        {
            warn!(user_id = %user.id, "Sign in with wrong password");
            return Err(AppError::Unauthorized(BAD_CREDENTIALS.to_string()));
        }

        info!(user_id = %user.id, "User signed in");
        self.open_session(user).await
    }

    /// Rotates both tokens of the session that owns `refresh_token`.
    ///
    /// The new refresh token keeps the old one's expiry, so refreshing never
    /// extends a session past its original deadline.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<Passport, AppError> {
        let claims = self.tokens.parse(refresh_token, TokenKind::Refresh)?;

        let mut oauth = self
            .repository
            .find_oauth_by_refresh_token(refresh_token)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %claims.id, "Refresh token has no session");
                AppError::Unauthorized("refresh token has been revoked".to_string())
            })?;

        if oauth.user_id != claims.id {
            warn!(
                oauth_id = %oauth.id,
                token_user = %claims.id,
                "Refresh token does not match its session"
            );
            return Err(AppError::Unauthorized(
                "refresh token does not match its session".to_string(),
            ));
        }

        let user = self
            .repository
            .get_profile(&oauth.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;

        // Current role, in case it changed since the session was opened
        let identity = user.claims();
        let access_token = self.tokens.sign(TokenKind::Access, &identity)?;
        let rotated_refresh_token =
            self.tokens
                .sign_with_expiry(TokenKind::Refresh, &identity, claims.exp)?;

        // Only one rotation per refresh token wins; a concurrent one is revoked
        oauth.rotate(access_token, rotated_refresh_token);
        self.repository.update_oauth(&oauth, refresh_token).await?;

        info!(user_id = %user.id, oauth_id = %oauth.id, "Session tokens rotated");
        Ok(Passport::new(user, &oauth))
    }

    /// Deletes the session owning `refresh_token`; both of its tokens stop
    /// working immediately.
    #[instrument(skip(self, refresh_token))]
    pub async fn signout(&self, refresh_token: &str) -> Result<(), AppError> {
        let oauth = self
            .repository
            .find_oauth_by_refresh_token(refresh_token)
            .await?
            .ok_or_else(|| AppError::NotFound("oauth session not found".to_string()))?;

        self.repository.delete_oauth(&oauth.id).await?;

        info!(user_id = %oauth.user_id, oauth_id = %oauth.id, "User signed out");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_profile(&self, user_id: &str) -> Result<UserResponse, AppError> {
        self.repository
            .get_profile(user_id)
            .await?
            .map(UserResponse::from)
            .ok_or_else(|| AppError::NotFound("user not found".to_string()))
    }

    /// Short-lived token signed with the admin key
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub fn generate_admin_token(&self, user: &UserClaims) -> Result<AdminTokenResponse, AppError> {
        let token = self.tokens.sign(TokenKind::Admin, user)?;
        info!("Admin token issued");
        Ok(AdminTokenResponse { token })
    }

    /// Revocation check: the token must still belong to a live oauth session
    pub async fn is_access_token_active(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<bool, AppError> {
        self.repository.find_access_token(user_id, access_token).await
    }

    async fn open_session(&self, user: UserModel) -> Result<Passport, AppError> {
        let identity = user.claims();
        let access_token = self.tokens.sign(TokenKind::Access, &identity)?;
        let refresh_token = self.tokens.sign(TokenKind::Refresh, &identity)?;

        let oauth = OauthModel::new(user.id.clone(), access_token, refresh_token);
        self.repository.insert_oauth(&oauth).await?;

        info!(user_id = %user.id, oauth_id = %oauth.id, "Session opened");
        Ok(Passport::new(user, &oauth))
    }
}
