use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::auth::UserClaims;

/// Database model for the users table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserModel {
    pub id: String,
    pub email: String,
    pub password: String, // bcrypt hash
    pub username: String,
    pub role_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserModel {
    /// Identity to embed into issued tokens
    pub fn claims(&self) -> UserClaims {
        UserClaims {
            id: self.id.clone(),
            role_id: self.role_id,
        }
    }
}

/// Row to insert on signup; the id is assigned by the repository
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub username: String,
    pub role_id: i32,
}

/// Database model for the oauth table, one row per login session
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OauthModel {
    pub id: String,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OauthModel {
    pub fn new(user_id: String, access_token: String, refresh_token: String) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            access_token,
            refresh_token,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces both tokens, keeping the session id
    pub fn rotate(&mut self, access_token: String, refresh_token: String) {
        self.access_token = access_token;
        self.refresh_token = refresh_token;
        self.updated_at = Utc::now();
    }
}
