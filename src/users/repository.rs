use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::models::{NewUser, OauthModel, UserModel};
use crate::shared::AppError;

const EMAIL_TAKEN: &str = "email has been used";
const USERNAME_TAKEN: &str = "username has been used";
const REFRESH_REVOKED: &str = "refresh token has been revoked";

/// Trait for user and oauth persistence
#[async_trait]
pub trait UsersRepository {
    /// Fails with `Conflict` when the email or username is already registered
    async fn insert_user(&self, user: &NewUser) -> Result<UserModel, AppError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserModel>, AppError>;
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserModel>, AppError>;

    async fn insert_oauth(&self, oauth: &OauthModel) -> Result<(), AppError>;
    /// Stores rotated tokens only while the row still holds `expected_refresh_token`.
    /// A row that was rotated or deleted meanwhile fails with `Unauthorized`.
    async fn update_oauth(
        &self,
        oauth: &OauthModel,
        expected_refresh_token: &str,
    ) -> Result<(), AppError>;
    async fn find_oauth_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<OauthModel>, AppError>;
    async fn delete_oauth(&self, oauth_id: &str) -> Result<(), AppError>;

    /// Whether `access_token` is still the live access token of one of the user's sessions
    async fn find_access_token(&self, user_id: &str, access_token: &str)
        -> Result<bool, AppError>;
}

/// In-memory implementation of UsersRepository for development and testing
///
/// Mirrors the unique constraints of the Postgres schema so conflict
/// handling behaves the same in tests.
pub struct InMemoryUsersRepository {
    users: RwLock<HashMap<String, UserModel>>,
    oauth: RwLock<HashMap<String, OauthModel>>,
    next_user_id: AtomicU64,
}

impl Default for InMemoryUsersRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryUsersRepository {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            oauth: RwLock::new(HashMap::new()),
            next_user_id: AtomicU64::new(1),
        }
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn oauth_count(&self) -> usize {
        self.oauth.read().await.len()
    }
}

#[async_trait]
impl UsersRepository for InMemoryUsersRepository {
    #[instrument(skip(self, user), fields(email = %user.email))]
    async fn insert_user(&self, user: &NewUser) -> Result<UserModel, AppError> {
        debug!("Inserting user in memory");

        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            warn!("Email already registered in memory");
            return Err(AppError::Conflict(EMAIL_TAKEN.to_string()));
        }
        if users.values().any(|u| u.username == user.username) {
            warn!(username = %user.username, "Username already registered in memory");
            return Err(AppError::Conflict(USERNAME_TAKEN.to_string()));
        }

        let now = Utc::now();
        let id = format!("U{:06}", self.next_user_id.fetch_add(1, Ordering::SeqCst));
        let model = UserModel {
            id: id.clone(),
            email: user.email.clone(),
            password: user.password.clone(),
            username: user.username.clone(),
            role_id: user.role_id,
            created_at: now,
            updated_at: now,
        };
        users.insert(id, model.clone());

        debug!(user_id = %model.id, "User inserted in memory");
        Ok(model)
    }

    #[instrument(skip(self))]
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserModel>, AppError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    #[instrument(skip(self))]
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserModel>, AppError> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    #[instrument(skip(self, oauth), fields(oauth_id = %oauth.id))]
    async fn insert_oauth(&self, oauth: &OauthModel) -> Result<(), AppError> {
        let mut sessions = self.oauth.write().await;
        if sessions.contains_key(&oauth.id)
            || sessions
                .values()
                .any(|o| o.refresh_token == oauth.refresh_token)
        {
            warn!("Oauth session already exists in memory");
            return Err(AppError::DatabaseError(
                "oauth session already exists".to_string(),
            ));
        }
        sessions.insert(oauth.id.clone(), oauth.clone());

        debug!(user_id = %oauth.user_id, "Oauth session inserted in memory");
        Ok(())
    }

    #[instrument(skip(self, oauth, expected_refresh_token), fields(oauth_id = %oauth.id))]
    async fn update_oauth(
        &self,
        oauth: &OauthModel,
        expected_refresh_token: &str,
    ) -> Result<(), AppError> {
        let mut sessions = self.oauth.write().await;
        match sessions.get_mut(&oauth.id) {
            Some(current) if current.refresh_token == expected_refresh_token => {
                *current = oauth.clone();
            }
            _ => {
                warn!("Oauth session was rotated or revoked before update");
                return Err(AppError::Unauthorized(REFRESH_REVOKED.to_string()));
            }
        }

        debug!("Oauth session updated in memory");
        Ok(())
    }

    #[instrument(skip(self, refresh_token))]
    async fn find_oauth_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<OauthModel>, AppError> {
        let sessions = self.oauth.read().await;
        Ok(sessions
            .values()
            .find(|o| o.refresh_token == refresh_token)
            .cloned())
    }

    #[instrument(skip(self))]
    async fn delete_oauth(&self, oauth_id: &str) -> Result<(), AppError> {
        if self.oauth.write().await.remove(oauth_id).is_none() {
            warn!("Oauth session not found for deletion in memory");
            return Err(AppError::NotFound("oauth session not found".to_string()));
        }

        debug!("Oauth session deleted from memory");
        Ok(())
    }

    #[instrument(skip(self, access_token))]
    async fn find_access_token(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<bool, AppError> {
        let sessions = self.oauth.read().await;
        Ok(sessions
            .values()
            .any(|o| o.user_id == user_id && o.access_token == access_token))
    }
}

/// PostgreSQL implementation of the users repository
///
/// Every statement runs under `query_timeout`; a timeout is reported as a
/// database error and never retried.
pub struct PostgresUsersRepository {
    pool: PgPool,
    query_timeout: Duration,
}

impl PostgresUsersRepository {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    async fn run<T, F>(&self, operation: &'static str, query: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, sqlx::Error>> + Send,
    {
        match tokio::time::timeout(self.query_timeout, query).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(error = %e, operation, "Database statement failed");
                Err(map_sqlx_error(e))
            }
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.query_timeout.as_millis() as u64,
                    "Database statement timed out"
                );
                Err(AppError::DatabaseError(format!("{} timed out", operation)))
            }
        }
    }
}

fn map_sqlx_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db_err) = err {
        match db_err.constraint() {
            Some("users_email_key") => return AppError::Conflict(EMAIL_TAKEN.to_string()),
            Some("users_username_key") => {
                return AppError::Conflict(USERNAME_TAKEN.to_string())
            }
            _ => {}
        }
    }
    AppError::DatabaseError(err.to_string())
}

#[async_trait]
impl UsersRepository for PostgresUsersRepository {
    #[instrument(skip(self, user), fields(email = %user.email))]
    async fn insert_user(&self, user: &NewUser) -> Result<UserModel, AppError> {
        debug!("Inserting user in database");

        let model = self
            .run(
                "insert user",
                sqlx::query_as::<_, UserModel>(
                    r#"
                    INSERT INTO users (email, password, username, role_id)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id, email, password, username, role_id, created_at, updated_at
                    "#,
                )
                .bind(&user.email)
                .bind(&user.password)
                .bind(&user.username)
                .bind(user.role_id)
                .fetch_one(&self.pool),
            )
            .await?;

        debug!(user_id = %model.id, "User inserted in database");
        Ok(model)
    }

    #[instrument(skip(self))]
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserModel>, AppError> {
        self.run(
            "find user by email",
            sqlx::query_as::<_, UserModel>(
                r#"
                SELECT id, email, password, username, role_id, created_at, updated_at
                FROM users
                WHERE email = $1
                "#,
            )
            .bind(email)
            .fetch_optional(&self.pool),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserModel>, AppError> {
        self.run(
            "get profile",
            sqlx::query_as::<_, UserModel>(
                r#"
                SELECT id, email, password, username, role_id, created_at, updated_at
                FROM users
                WHERE id = $1
                "#,
            )
            .bind(user_id)
            .fetch_optional(&self.pool),
        )
        .await
    }

    #[instrument(skip(self, oauth), fields(oauth_id = %oauth.id))]
    async fn insert_oauth(&self, oauth: &OauthModel) -> Result<(), AppError> {
        self.run(
            "insert oauth",
            sqlx::query(
                r#"
                INSERT INTO oauth (id, user_id, access_token, refresh_token, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&oauth.id)
            .bind(&oauth.user_id)
            .bind(&oauth.access_token)
            .bind(&oauth.refresh_token)
            .bind(oauth.created_at)
            .bind(oauth.updated_at)
            .execute(&self.pool),
        )
        .await?;

        debug!(user_id = %oauth.user_id, "Oauth session inserted in database");
        Ok(())
    }

    #[instrument(skip(self, oauth, expected_refresh_token), fields(oauth_id = %oauth.id))]
    async fn update_oauth(
        &self,
        oauth: &OauthModel,
        expected_refresh_token: &str,
    ) -> Result<(), AppError> {
        let result = self
            .run(
                "update oauth",
                sqlx::query(
                    r#"
                    UPDATE oauth
                    SET access_token = $2, refresh_token = $3, updated_at = $4
                    WHERE id = $1 AND refresh_token = $5
                    "#,
                )
                .bind(&oauth.id)
                .bind(&oauth.access_token)
                .bind(&oauth.refresh_token)
                .bind(oauth.updated_at)
                .bind(expected_refresh_token)
                .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            warn!("Oauth session was rotated or revoked before update");
            return Err(AppError::Unauthorized(REFRESH_REVOKED.to_string()));
        }

        debug!("Oauth session updated in database");
        Ok(())
    }

    #[instrument(skip(self, refresh_token))]
    async fn find_oauth_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<OauthModel>, AppError> {
        self.run(
            "find oauth",
            sqlx::query_as::<_, OauthModel>(
                r#"
                SELECT id, user_id, access_token, refresh_token, created_at, updated_at
                FROM oauth
                WHERE refresh_token = $1
                "#,
            )
            .bind(refresh_token)
            .fetch_optional(&self.pool),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_oauth(&self, oauth_id: &str) -> Result<(), AppError> {
        let result = self
            .run(
                "delete oauth",
                sqlx::query("DELETE FROM oauth WHERE id = $1")
                    .bind(oauth_id)
                    .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            warn!("Oauth session not found for deletion");
            return Err(AppError::NotFound("oauth session not found".to_string()));
        }

        debug!("Oauth session deleted from database");
        Ok(())
    }

    #[instrument(skip(self, access_token))]
    async fn find_access_token(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<bool, AppError> {
        self.run(
            "find access token",
            sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM oauth WHERE user_id = $1 AND access_token = $2)",
            )
            .bind(user_id)
            .bind(access_token)
            .fetch_one(&self.pool),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str, username: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password: "hash".to_string(),
            username: username.to_string(),
            role_id: 1,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find_user() {
        let repo = InMemoryUsersRepository::new();
        let user = repo
            .insert_user(&new_user("alice@example.com", "alice"))
            .await
            .unwrap();

        assert_eq!(user.id, "U000001");

        let found = repo
            .find_user_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, user.id);

        let profile = repo.get_profile(&user.id).await.unwrap().unwrap();
        assert_eq!(profile.username, "alice");
    }

    #[tokio::test]
    async fn test_sequential_user_ids() {
        let repo = InMemoryUsersRepository::new();
        repo.insert_user(&new_user("a@example.com", "a")).await.unwrap();
        let second = repo.insert_user(&new_user("b@example.com", "b")).await.unwrap();
        assert_eq!(second.id, "U000002");
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let repo = InMemoryUsersRepository::new();
        repo.insert_user(&new_user("alice@example.com", "alice"))
            .await
            .unwrap();

        let result = repo
            .insert_user(&new_user("alice@example.com", "someone-else"))
            .await;
        assert!(matches!(result, Err(AppError::Conflict(msg)) if msg == EMAIL_TAKEN));
        assert_eq!(repo.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_username_is_conflict() {
        let repo = InMemoryUsersRepository::new();
        repo.insert_user(&new_user("alice@example.com", "alice"))
            .await
            .unwrap();

        let result = repo.insert_user(&new_user("other@example.com", "alice")).await;
        assert!(matches!(result, Err(AppError::Conflict(msg)) if msg == USERNAME_TAKEN));
    }

    #[tokio::test]
    async fn test_missing_user() {
        let repo = InMemoryUsersRepository::new();
        assert!(repo.get_profile("U999999").await.unwrap().is_none());
        assert!(repo
            .find_user_by_email("nobody@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_oauth_lifecycle() {
        let repo = InMemoryUsersRepository::new();
        let mut oauth = OauthModel::new(
            "U000001".to_string(),
            "access-1".to_string(),
            "refresh-1".to_string(),
        );

        repo.insert_oauth(&oauth).await.unwrap();
        assert!(repo.find_access_token("U000001", "access-1").await.unwrap());
        assert!(!repo.find_access_token("U000002", "access-1").await.unwrap());

        oauth.rotate("access-2".to_string(), "refresh-2".to_string());
        repo.update_oauth(&oauth, "refresh-1").await.unwrap();

        assert!(!repo.find_access_token("U000001", "access-1").await.unwrap());
        assert!(repo.find_access_token("U000001", "access-2").await.unwrap());
        assert!(repo
            .find_oauth_by_refresh_token("refresh-1")
            .await
            .unwrap()
            .is_none());

        let found = repo
            .find_oauth_by_refresh_token("refresh-2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, oauth.id);

        repo.delete_oauth(&oauth.id).await.unwrap();
        assert_eq!(repo.oauth_count().await, 0);
        assert!(!repo.find_access_token("U000001", "access-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_refresh_token_rejected() {
        let repo = InMemoryUsersRepository::new();
        let first = OauthModel::new("U1".to_string(), "a1".to_string(), "r".to_string());
        let second = OauthModel::new("U1".to_string(), "a2".to_string(), "r".to_string());

        repo.insert_oauth(&first).await.unwrap();
        let result = repo.insert_oauth(&second).await;
        assert!(matches!(result, Err(AppError::DatabaseError(_))));
    }

    #[tokio::test]
    async fn test_rotation_with_stale_refresh_token_rejected() {
        let repo = InMemoryUsersRepository::new();
        let original = OauthModel::new("U1".to_string(), "a1".to_string(), "r1".to_string());
        repo.insert_oauth(&original).await.unwrap();

        let mut first = original.clone();
        first.rotate("a2".to_string(), "r2".to_string());
        let mut second = original.clone();
        second.rotate("a3".to_string(), "r3".to_string());

        repo.update_oauth(&first, "r1").await.unwrap();
        let result = repo.update_oauth(&second, "r1").await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));

        // The first rotation stays live
        assert!(repo.find_access_token("U1", "a2").await.unwrap());
        assert!(!repo.find_access_token("U1", "a3").await.unwrap());
        assert!(repo.find_oauth_by_refresh_token("r3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_oauth() {
        let repo = InMemoryUsersRepository::new();
        let oauth = OauthModel::new("U1".to_string(), "a".to_string(), "r".to_string());

        let result = repo.update_oauth(&oauth, "r").await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));

        let result = repo.delete_oauth(&oauth.id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
