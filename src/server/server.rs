use std::sync::Arc;

use anyhow::{anyhow, Result};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::cache::configuration::Configuration;
use crate::config::settings::SettingsConfig;
use crate::error::SessionError;
use crate::observability::metrics::Metrics;
use crate::observability::routes::MetricsState;
use crate::session::{SessionCoordinator, SessionState};

#[derive(Clone)]
pub struct AppState {
    pub metrics_state: MetricsState,
    pub coordinator: SessionCoordinator,
}

impl AppState {
    pub fn new(metrics: &Metrics, coordinator: SessionCoordinator) -> Self {
        Self {
            metrics_state: MetricsState::new(metrics.registry.clone()),
            coordinator,
        }
    }
}

/// Public view of the session; the raw credential is never exposed.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub state: String,
    pub rest_uri: String,
    pub graphql_uri: String,
    pub insights_uri: Option<String>,
    pub environment: Option<String>,
    pub user_token: String,
    pub program_token: Option<String>,
    pub expires_on: DateTime<Utc>,
}

impl SessionView {
    fn new(state: SessionState, config: &Configuration) -> Self {
        Self {
            state: format!("{:?}", state).to_lowercase(),
            rest_uri: config.rest_uri().to_owned(),
            graphql_uri: config.graphql_uri().to_owned(),
            insights_uri: config.insights_uri().map(str::to_owned),
            environment: config.environment().map(str::to_owned),
            user_token: config.user_token().to_owned(),
            program_token: config.program_token().map(str::to_owned),
            expires_on: config.expires_on(),
        }
    }
}

pub fn router(state: AppState, settings_config: &SettingsConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/session", get(session))
        .merge(state.metrics_state.router(&settings_config.metrics))
        .with_state(state)
}

/// Start one Axum server exposing health, session and metrics routes.
pub async fn start(
    settings_config: &SettingsConfig,
    coordinator: SessionCoordinator,
    metrics: Arc<Metrics>,
) -> Result<()> {
    let state = AppState::new(&metrics, coordinator);
    let app = router(state, settings_config);

    let bind_addr = format!("{}:{}", settings_config.server.host, settings_config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow!("cannot bind '{}': {}", bind_addr, e))?;
    info!("listening on {}", bind_addr);
    metrics.up.set(1);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn session(State(state): State<AppState>) -> Response {
    match state.coordinator.get_configuration().await {
        Ok(config) => Json(SessionView::new(state.coordinator.state(), &config)).into_response(),
        Err(err) => (
            status_for(&err),
            Json(json!({ "error": err.to_string(), "reason": err.reason() })),
        )
            .into_response(),
    }
}

fn status_for(err: &SessionError) -> StatusCode {
    match err {
        SessionError::MalformedToken(_) | SessionError::AuthenticationTokenProvider(_) => {
            StatusCode::UNAUTHORIZED
        }
        SessionError::TokenProviderTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
    }
}
