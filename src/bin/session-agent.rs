use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use reqwest::Client;
use session_agent::observability::metrics::Metrics;
use session_agent::server;
use session_agent::session::SessionCoordinator;
use session_agent::sources::HttpTokenProvider;
use session_agent::utils::config_loader;
use session_agent::utils::logging;
use session_agent::utils::logging::LogLevel;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "session-agent.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config, init logging
    // -------------------------------

    let args = Args::parse();
    let service_config = config_loader::run(&args.config).await?;
    logging::run(&service_config.settings, args.log_level);

    // -------------------------------
    // 2. Build provider and session coordinator
    // -------------------------------

    let metrics = Metrics::new()?;
    let provider = Arc::new(HttpTokenProvider::new(service_config.provider.clone(), Client::new()));
    let coordinator = SessionCoordinator::with_metrics(
        provider,
        service_config.settings.coordinator_options(),
        metrics.clone(),
    );

    // -------------------------------
    // 3. Warm up the session; failures are retried on the next request
    // -------------------------------

    match coordinator.get_configuration().await {
        Ok(config) => info!(
            rest_uri = config.rest_uri(),
            graphql_uri = config.graphql_uri(),
            expires_on = %config.expires_on(),
            "session established"
        ),
        Err(e) => warn!(error = %e, "initial session refresh failed"),
    }

    // -------------------------------
    // 4. Serve health, session and metrics routes
    // -------------------------------

    info!("Service starting...");
    server::server::start(&service_config.settings, coordinator, metrics).await
}
