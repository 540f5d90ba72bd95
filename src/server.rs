use axum::{
    error_handling::HandleErrorLayer, extract::DefaultBodyLimit, routing::get, Router,
};
use std::sync::Arc;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{AppConfig, AppSettings, ConfigError};
use crate::database::{self, DbError};
use crate::shared::AppState;
use crate::users::repository::PostgresUsersRepository;
use crate::{middleware, monitor, users};

/// Anything that stops the server from coming up
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds the full application router
pub fn build_router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/", get(monitor::health_check))
        .nest("/users", users::router(state.clone()))
        .fallback(middleware::router_check);

    with_layers(routes, &state.config.app).with_state(state)
}

/// Body limit, request timeout, CORS and request tracing
fn with_layers(routes: Router<AppState>, settings: &AppSettings) -> Router<AppState> {
    routes
        .layer(DefaultBodyLimit::max(settings.body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(middleware::handle_timeout))
                .timeout(settings.timeout),
        )
        .layer(middleware::cors())
        .layer(TraceLayer::new_for_http())
}

/// Connects to Postgres, migrates, and serves until the listener fails
pub async fn run(config: AppConfig) -> Result<(), ServerError> {
    let pool = database::connect(&config.db).await?;
    database::run_migrations(&pool).await?;

    let repository = Arc::new(PostgresUsersRepository::new(pool, config.db.query_timeout));
    let address = config.app.url();
    let state = AppState::new(Arc::new(config), repository);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Server running on http://{}", address);
    axum::serve(listener, app).await?;

    Ok(())
}
