use serde::{Deserialize, Serialize};

use super::models::{OauthModel, UserModel};
use crate::shared::AppError;

const MIN_PASSWORD_LEN: usize = 6;
const MAX_USERNAME_LEN: usize = 50;

/// Request payload for both signup routes
#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub username: String,
}

impl SignupRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_email(&self.email)?;

        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let username_len = self.username.trim().chars().count();
        if username_len == 0 || username_len > MAX_USERNAME_LEN {
            return Err(AppError::Validation(format!(
                "username must be between 1 and {} characters",
                MAX_USERNAME_LEN
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

impl SigninRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_email(&self.email)?;
        if self.password.is_empty() {
            return Err(AppError::Validation("password is required".to_string()));
        }
        Ok(())
    }
}

/// Body of /refresh and /signout
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

impl RefreshTokenRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.refresh_token.trim().is_empty() {
            return Err(AppError::Validation("refresh_token is required".to_string()));
        }
        Ok(())
    }
}

/// Public view of a user, never carries the password hash
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub username: String,
    pub role_id: i32,
}

impl From<UserModel> for UserResponse {
    fn from(user: UserModel) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            role_id: user.role_id,
        }
    }
}

/// Token pair of one oauth session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserToken {
    pub id: String, // oauth row id
    pub access_token: String,
    pub refresh_token: String,
}

/// User plus freshly issued tokens, returned by signup, signin and refresh
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passport {
    pub user: UserResponse,
    pub token: UserToken,
}

impl Passport {
    pub fn new(user: UserModel, oauth: &OauthModel) -> Self {
        Self {
            user: user.into(),
            token: UserToken {
                id: oauth.id.clone(),
                access_token: oauth.access_token.clone(),
                refresh_token: oauth.refresh_token.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminTokenResponse {
    pub token: String,
}

/// Accepts `local@domain.tld`, nothing fancier
fn validate_email(email: &str) -> Result<(), AppError> {
    let invalid = || AppError::Validation("email pattern is invalid".to_string());

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(invalid());
    }

    Ok(())
}
