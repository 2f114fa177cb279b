use std::collections::HashMap;
use std::sync::Arc;
use std::{env, fs};

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::config::provider::{GenericSourceValue, ProviderConfig};
use crate::resilience::retry::RetrySettings;
use crate::session::{AuthTokenListener, CorrelationId};
use crate::sources::provider::AuthTokenProvider;

static CORRELATION_HEADER: &str = "x-correlation-id";

/// Provider that fetches the credential from a host endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTokenProvider {
    config: Arc<ProviderConfig>,
    client: Client,
    retry: RetrySettings,
}

impl HttpTokenProvider {
    pub fn new(config: ProviderConfig, client: Client) -> Self {
        let retry = RetrySettings::from_config(config.retry.as_ref());
        Self {
            config: Arc::new(config),
            client,
            retry,
        }
    }

    /// One request to the host endpoint, returning the raw credential.
    pub async fn fetch_token(&self, correlation_id: CorrelationId) -> Result<String> {
        let req_cfg = &self.config.request;
        let mut request = self
            .client
            .request(req_cfg.method.clone(), &req_cfg.url)
            .header(CORRELATION_HEADER, correlation_id.to_string());

        // Build headers dynamically
        if let Some(headers) = &req_cfg.headers {
            for (key, v) in headers {
                request = request.header(key, prepare_generic_source_value(v)?);
            }
        }
        // Build body dynamically
        if let Some(source_body) = &req_cfg.body {
            let mut body = HashMap::new();
            for (k, v) in source_body {
                body.insert(k.to_owned(), prepare_generic_source_value(v)?);
            }
            request = request.json(&body);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("HTTP request failed: {}", response.status()));
        }
        let body = response.text().await?;
        extract_token(&body, self.config.token_pointer.as_deref())
    }
}

impl AuthTokenProvider for HttpTokenProvider {
    fn request_token(&self, correlation_id: CorrelationId, listener: AuthTokenListener) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                listener.on_failure(correlation_id, format!("no async runtime to fetch token: {}", e));
                return;
            }
        };

        let provider = self.clone();
        handle.spawn(async move {
            debug!(correlation_id = %correlation_id, url = %provider.config.request.url, "fetching session token");
            match provider
                .retry
                .run_with_retry(|| provider.fetch_token(correlation_id))
                .await
            {
                Ok(token) => {
                    info!(correlation_id = %correlation_id, "session token fetched");
                    listener.on_success(correlation_id, token);
                }
                Err(e) => {
                    warn!(correlation_id = %correlation_id, error = %e, "session token fetch failed");
                    listener.on_failure(correlation_id, e.to_string());
                }
            }
        });
    }
}

fn extract_token(body: &str, token_pointer: Option<&str>) -> Result<String> {
    let token = match token_pointer {
        Some(pointer) => {
            let json: Value = serde_json::from_str(body)
                .map_err(|e| anyhow!("token response is not valid JSON: {}", e))?;
            json[pointer]
                .as_str()
                .ok_or_else(|| anyhow!("body field '{}' not found or not a string", pointer))?
                .trim()
                .to_owned()
        }
        None => body.trim().to_owned(),
    };
    if token.is_empty() {
        return Err(anyhow!("token response is empty"));
    }
    Ok(token)
}

fn prepare_generic_source_value(value: &GenericSourceValue) -> Result<String> {
    match value {
        GenericSourceValue::Literal { value } => Ok(value.to_owned()),
        GenericSourceValue::FromEnv { from_env } => {
            env::var(from_env).map_err(|err| anyhow!("env '{}': {}", from_env, err))
        }
        GenericSourceValue::FromFile { path } => fs::read_to_string(path)
            .map_err(|err| anyhow!("file '{}': {}", path, err))
            .map(|res| res.trim().to_string()),
    }
}
