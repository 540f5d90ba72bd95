use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;

use crate::shared::AppError;

/// Token flavours; the kind is carried in the `sub` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum TokenKind {
    #[strum(serialize = "access-token")]
    Access,
    #[strum(serialize = "refresh-token")]
    Refresh,
    #[strum(serialize = "admin-token")]
    Admin,
}

/// Roles as stored in the `roles` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    pub fn id(self) -> i32 {
        match self {
            Role::Customer => 1,
            Role::Admin => 2,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(Role::Customer),
            2 => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Identity embedded into every issued token
#[derive(Debug, Clone, PartialEq)]
pub struct UserClaims {
    pub id: String,
    pub role_id: i32,
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    pub id: String,
    pub role: i32,
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: String,
}

impl TokenClaims {
    pub fn user(&self) -> UserClaims {
        UserClaims {
            id: self.id.clone(),
            role_id: self.role,
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("expected an {0}")]
    WrongKind(TokenKind),

    #[error("failed to sign token: {0}")]
    Encoding(String),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encoding(_) => AppError::Internal,
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_token_kind_subjects() {
        assert_eq!(TokenKind::Access.to_string(), "access-token");
        assert_eq!(TokenKind::Refresh.to_string(), "refresh-token");
        assert_eq!(TokenKind::from_str("admin-token").unwrap(), TokenKind::Admin);
    }

    #[test]
    fn test_role_ids() {
        assert_eq!(Role::Customer.id(), 1);
        assert_eq!(Role::Admin.id(), 2);
        assert_eq!(Role::from_id(2), Some(Role::Admin));
        assert_eq!(Role::from_id(7), None);
        assert_eq!(Role::Admin.to_string(), "admin");
    }

    #[test]
    fn test_token_errors_map_to_unauthorized() {
        let err: AppError = TokenError::Expired.into();
        assert!(matches!(err, AppError::Unauthorized(msg) if msg == "token has expired"));

        let err: AppError = TokenError::WrongKind(TokenKind::Access).into();
        assert!(matches!(err, AppError::Unauthorized(msg) if msg == "expected an access-token"));

        let err: AppError = TokenError::Encoding("boom".to_string()).into();
        assert!(matches!(err, AppError::Internal));
    }
}
