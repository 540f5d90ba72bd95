use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::types::{TokenClaims, TokenError, TokenKind, UserClaims};
use crate::config::JwtSettings;

/// Admin tokens are only good for a few minutes
const ADMIN_EXPIRES_SECS: i64 = 300;

/// Configuration for JWT token operations
#[derive(Clone)]
pub struct TokenConfig {
    secret: String,
    admin_key: String,
    issuer: String,
    pub access_expires_secs: i64,
    pub refresh_expires_secs: i64,
}

impl TokenConfig {
    pub fn new(
        secret: impl Into<String>,
        admin_key: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            secret: secret.into(),
            admin_key: admin_key.into(),
            issuer: issuer.into(),
            access_expires_secs: 86_400,
            refresh_expires_secs: 604_800,
        }
    }

    pub fn from_settings(settings: &JwtSettings, issuer: &str) -> Self {
        Self {
            access_expires_secs: settings.access_expires_secs,
            refresh_expires_secs: settings.refresh_expires_secs,
            ..Self::new(&settings.secret_key, &settings.admin_key, issuer)
        }
    }

    fn expires_secs(&self, kind: TokenKind) -> i64 {
        match kind {
            TokenKind::Access => self.access_expires_secs,
            TokenKind::Refresh => self.refresh_expires_secs,
            TokenKind::Admin => ADMIN_EXPIRES_SECS,
        }
    }

    fn key(&self, kind: TokenKind) -> &[u8] {
        match kind {
            TokenKind::Access | TokenKind::Refresh => self.secret.as_bytes(),
            TokenKind::Admin => self.admin_key.as_bytes(),
        }
    }

    /// Issues a token of `kind` that expires after the configured lifetime
    pub fn sign(&self, kind: TokenKind, user: &UserClaims) -> Result<String, TokenError> {
        let exp = (Utc::now() + Duration::seconds(self.expires_secs(kind))).timestamp();
        self.sign_with_expiry(kind, user, exp)
    }

    /// Issues a token with an absolute expiry (unix seconds)
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub fn sign_with_expiry(
        &self,
        kind: TokenKind,
        user: &UserClaims,
        exp: i64,
    ) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();

        debug!(kind = %kind, exp_timestamp = exp, "Creating JWT token");

        let claims = TokenClaims {
            id: user.id.clone(),
            role: user.role_id,
            sub: kind.to_string(),
            iss: self.issuer.clone(),
            iat: now,
            nbf: now,
            exp,
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.key(kind)),
        )
        .map_err(|e| {
            debug!(error = %e, "Failed to encode JWT token");
            TokenError::Encoding(e.to_string())
        })
    }

    /// Validates signature, expiry, issuer and kind, returning the claims
    #[instrument(skip(self, token))]
    pub fn parse(&self, token: &str, kind: TokenKind) -> Result<TokenClaims, TokenError> {
        debug!(kind = %kind, "Decoding and validating JWT token");

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_nbf = true;
        validation.sub = Some(kind.to_string());

        decode::<TokenClaims>(token, &DecodingKey::from_secret(self.key(kind)), &validation)
            .map(|data| {
                debug!(
                    user_id = %data.claims.id,
                    role = data.claims.role,
                    exp = data.claims.exp,
                    "JWT token decoded successfully"
                );
                data.claims
            })
            .map_err(|e| {
                debug!(error = %e, "Failed to decode JWT token");
                match e.kind() {
                    ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    ErrorKind::InvalidSubject => TokenError::WrongKind(kind),
                    _ => TokenError::Malformed,
                }
            })
    }
}
