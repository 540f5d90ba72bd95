//! Application configuration loaded from the environment.
//!
//! `main` loads an env file with `dotenvy` first (path from the first CLI
//! argument, `.env` otherwise), then builds [`AppConfig::from_env`].

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("failed to load env file {path}: {source}")]
    EnvFile {
        path: String,
        #[source]
        source: dotenvy::Error,
    },
}

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub version: String,
    pub timeout: Duration,
    pub body_limit: usize,
}

impl AppSettings {
    pub fn url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// PostgreSQL settings
#[derive(Debug, Clone)]
pub struct DbSettings {
    pub url: String,
    pub max_connections: u32,
    pub query_timeout: Duration,
}

/// Token signing settings
#[derive(Clone)]
pub struct JwtSettings {
    pub secret_key: String,
    pub admin_key: String,
    pub access_expires_secs: i64,
    pub refresh_expires_secs: i64,
}

impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret_key", &"<redacted>")
            .field("admin_key", &"<redacted>")
            .field("access_expires_secs", &self.access_expires_secs)
            .field("refresh_expires_secs", &self.refresh_expires_secs)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app: AppSettings,
    pub db: DbSettings,
    pub jwt: JwtSettings,
    pub bcrypt_cost: u32,
}

impl AppConfig {
    /// Loads `path` into the process environment if it exists.
    /// A missing file is not an error, the process env may already be complete.
    pub fn load_env_file(path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(());
        }
        dotenvy::from_path(path).map_err(|source| ConfigError::EnvFile {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Builds the config from an explicit variable map so tests don't touch
    /// the process environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let env = Vars(vars);

        let app = AppSettings {
            host: env.or("APP_HOST", "0.0.0.0"),
            port: env.parse_or("APP_PORT", 3000)?,
            name: env.or("APP_NAME", env!("CARGO_PKG_NAME")),
            version: env.or("APP_VERSION", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(env.parse_or("APP_TIMEOUT_SECS", 30)?),
            body_limit: env.parse_or("APP_BODY_LIMIT", 10 * 1024 * 1024)?,
        };

        let db = DbSettings {
            url: match env.get("DB_URL") {
                Some(url) => url.to_string(),
                None => format!(
                    "postgres://{}:{}@{}:{}/{}?sslmode={}",
                    env.or("DB_USERNAME", "postgres"),
                    env.or("DB_PASSWORD", ""),
                    env.or("DB_HOST", "127.0.0.1"),
                    env.or("DB_PORT", "5432"),
                    env.or("DB_DATABASE", "userauth"),
                    env.or("DB_SSL_MODE", "disable"),
                ),
            },
            max_connections: env.parse_or("DB_MAX_CONNECTIONS", 25)?,
            query_timeout: Duration::from_secs(env.parse_or("DB_QUERY_TIMEOUT_SECS", 10)?),
        };

        let jwt = JwtSettings {
            secret_key: env.required("JWT_SECRET_KEY")?,
            admin_key: env.required("JWT_ADMIN_KEY")?,
            access_expires_secs: env.parse_or("JWT_ACCESS_EXPIRES", 86_400)?,
            refresh_expires_secs: env.parse_or("JWT_REFRESH_EXPIRES", 604_800)?,
        };

        Ok(Self {
            app,
            db,
            jwt,
            bcrypt_cost: env.parse_or("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
        })
    }
}

struct Vars(HashMap<String, String>);

impl Vars {
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key)
            .map(str::to_string)
            .ok_or(ConfigError::Missing(key))
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key,
                value: raw.to_string(),
            }),
            None => Ok(default),
        }
    }
}
