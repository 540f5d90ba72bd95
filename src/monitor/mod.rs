use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::shared::{AppState, Envelope};

/// Service identity reported by the health check
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Monitor {
    pub name: String,
    pub version: String,
}

/// GET /
#[instrument(name = "health_check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Envelope<Monitor> {
    Envelope::ok(Monitor {
        name: state.config.app.name.clone(),
        version: state.config.app.version.clone(),
    })
}
