use std::path::Path;

use anyhow::{anyhow, Result};
use regex::Regex;
use tracing::{debug, error};

use crate::config::provider::ServiceConfig;
use crate::config::settings::{LoggingConfig, STALE_MARGIN_SECONDS_DEFAULT};
use crate::config::validator::validate_service_config;

static ENV_VAR_PATTERN: &str = r"\$\{(\w+)(?::([^\}]+))?\}";

/// Load and validate config from YAML file
pub async fn file_to_config(path: &Path) -> Result<ServiceConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("cannot read config '{}': {}", path.display(), e))?;

    let expanded = expand_env_vars(&content)?;
    parse_config(&expanded)
}

pub fn parse_config(content: &str) -> Result<ServiceConfig> {
    let mut service_config: ServiceConfig = serde_yaml::from_str(content).inspect_err(|e| {
        error!("parse config error: {}", e);
    })?;

    // Apply defaults
    if service_config.settings.logging.is_none() {
        service_config.settings.logging = Some(LoggingConfig::default());
    }
    if service_config.settings.stale_margin_seconds.is_none() {
        service_config.settings.stale_margin_seconds = Some(STALE_MARGIN_SECONDS_DEFAULT);
    }

    debug!("validation config ...");
    validate_service_config(&service_config)
        .map_err(|errors| anyhow!("config is not valid: {}", errors.join("; ")))?;

    Ok(service_config)
}

/// Replace `${VAR}` and `${VAR:default}` with environment values.
fn expand_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(ENV_VAR_PATTERN)?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            let var = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var).unwrap_or_else(|_| default.to_string())
        })
        .to_string())
}
