// Library crate for the user auth service
// This file exposes the public API for main.rs and integration tests

pub mod auth;
pub mod config;
pub mod database;
pub mod middleware;
pub mod monitor;
pub mod server;
pub mod shared;
pub mod users;

// Re-export commonly used types for easier access in tests
pub use auth::{Role, TokenConfig, TokenKind};
pub use config::AppConfig;
pub use server::build_router;
pub use shared::{AppError, AppState, Envelope, ErrorBody};
pub use users::repository::{InMemoryUsersRepository, UsersRepository};
