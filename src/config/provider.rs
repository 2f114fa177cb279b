use http::Method;
use serde::Deserialize;
use std::collections::HashMap;

use crate::config::settings::{RetryConfig, SettingsConfig};

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub settings: SettingsConfig,
    pub provider: ProviderConfig,
}

/// ================================
/// Token provider
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    pub request: RequestConfig,
    /// JSON body field holding the credential; the whole body when unset
    pub token_pointer: Option<String>,
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Http,
}

/// HTTP request details
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct RequestConfig {
    pub url: String,
    #[serde(with = "http_serde::method")]
    pub method: Method, // GET, POST
    pub headers: Option<HashMap<String, GenericSourceValue>>,
    pub body: Option<HashMap<String, GenericSourceValue>>,
}

/// Header and body value sources
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum GenericSourceValue {
    Literal {
        value: String,
    },
    FromEnv {
        from_env: String,
    },
    FromFile {
        path: String,
    },
}
