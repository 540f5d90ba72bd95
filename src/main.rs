use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use userauth::{config::AppConfig, server};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "userauth=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Env file path may be passed as the first argument
    let env_path = std::env::args().nth(1).unwrap_or_else(|| ".env".to_string());

    let config = match AppConfig::load_env_file(&env_path).and_then(|_| AppConfig::from_env()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(
        name = %config.app.name,
        version = %config.app.version,
        "Starting user auth server"
    );

    if let Err(e) = server::run(config).await {
        error!(error = %e, "Server stopped");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
