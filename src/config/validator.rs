//! Configuration validation with aggregated errors.
//! - settings: stale margin, provider timeout, server, metrics and logging invariants
//! - provider: request url/method and retry invariants

use http::Method;

use crate::config::provider::{ProviderConfig, ServiceConfig};
use crate::config::settings::{RetryConfig, SettingsConfig};

static MAX_STALE_MARGIN_SECONDS: u64 = 60 * 60;
static LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);
    validate_provider(&cfg.provider, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if let Some(margin) = settings.stale_margin_seconds {
        if margin > MAX_STALE_MARGIN_SECONDS {
            errors.push(format!(
                "settings.stale_margin_seconds ({}) is unreasonably large; max {}",
                margin, MAX_STALE_MARGIN_SECONDS
            ));
        }
    }

    if settings.provider_timeout_ms == Some(0) {
        errors.push("settings.provider_timeout_ms must be > 0; omit it to wait indefinitely".to_string());
    }

    if settings.server.host.trim().is_empty() {
        errors.push("settings.server.host must not be empty".to_string());
    }
    if settings.server.port.parse::<u16>().is_err() {
        errors.push(format!(
            "settings.server.port '{}' must be an integer in range 0-65535",
            settings.server.port
        ));
    }

    // metrics endpoint start with '/'
    if !settings.metrics.path.starts_with('/') {
        errors.push(format!(
            "settings.metrics.path '{}' must start with '/'",
            settings.metrics.path
        ));
    }

    if let Some(logging) = &settings.logging {
        if !LOG_LEVELS.contains(&logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' invalid; allowed: {:?}",
                logging.level, LOG_LEVELS
            ));
        }
    }
}

fn validate_provider(provider: &ProviderConfig, errors: &mut Vec<String>) {
    let url = provider.request.url.trim();
    if url.is_empty() {
        errors.push("provider.request.url cannot be empty".to_string());
    } else if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push(format!("provider.request.url '{}' must use http or https", url));
    }

    if provider.request.method != Method::GET && provider.request.method != Method::POST {
        errors.push(format!(
            "provider.request.method '{}' not supported; allowed: GET, POST",
            provider.request.method
        ));
    }
    if provider.request.method == Method::GET && provider.request.body.is_some() {
        errors.push("provider.request.body is not allowed for GET".to_string());
    }

    if let Some(pointer) = &provider.token_pointer {
        if pointer.trim().is_empty() {
            errors.push("provider.token_pointer must not be empty".to_string());
        }
    }

    if let Some(retry) = &provider.retry {
        validate_retry("provider.retry", retry, errors);
    }
}

fn validate_retry(path: &str, retry: &RetryConfig, errors: &mut Vec<String>) {
    if let Some(attempts) = retry.attempts {
        if attempts == 0 {
            errors.push(format!("{}.attempts must be > 0", path));
        }
    }
    if let (Some(base), Some(max)) = (retry.base_delay_ms, retry.max_delay_ms) {
        if max < base {
            errors.push(format!(
                "{}.max_delay_ms ({}) must be >= base_delay_ms ({})",
                path, max, base
            ));
        }
    }
}
