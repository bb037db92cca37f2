//! Client configuration.
//!
//! Values come from (lowest to highest precedence) built-in defaults, an optional
//! YAML file, and `CHATFN_*` environment variables.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://gigachat.devices.sberbank.ru/api/v1/";
pub const DEFAULT_AUTH_URL: &str = "https://ngw.devices.sberbank.ru:9443/api/v2/oauth";
pub const DEFAULT_SCOPE: &str = "GIGACHAT_API_PERS";
pub const DEFAULT_MODEL: &str = "GigaChat";
pub const DEFAULT_EMBEDDINGS_MODEL: &str = "Embeddings";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Root of the REST API; every endpoint path is joined onto it.
    pub base_url: String,
    pub auth_url: String,
    pub scope: String,
    pub model: String,
    pub embeddings_model: String,
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    pub accept_invalid_certs: bool,
    pub pool_max_idle_per_host: usize,
    /// Authorization key for the OAuth exchange. Usually left empty and
    /// resolved from the keyring or `CHATFN_AUTH_KEY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_key: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            embeddings_model: DEFAULT_EMBEDDINGS_MODEL.to_string(),
            timeout_secs: 30,
            proxy_url: None,
            accept_invalid_certs: false,
            pool_max_idle_per_host: 32,
            auth_key: None,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `CHATFN_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load a YAML file, then apply environment overrides on top.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml_str(&raw)
            .map_err(|e| match e {
                Error::Configuration { message, context } => Error::Configuration {
                    message,
                    context: context.with_field_path(path.display().to_string()),
                },
                other => other,
            })?
            .with_env_overrides())
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid client configuration: {}", e),
                ErrorContext::new().with_source("config_loader"),
            )
        })
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("CHATFN_BASE_URL") {
            self.base_url = v;
        }
        if let Ok(v) = env::var("CHATFN_AUTH_URL") {
            self.auth_url = v;
        }
        if let Ok(v) = env::var("CHATFN_SCOPE") {
            self.scope = v;
        }
        if let Ok(v) = env::var("CHATFN_MODEL") {
            self.model = v;
        }
        if let Some(v) = env::var("CHATFN_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            self.timeout_secs = v;
        }
        if let Ok(v) = env::var("CHATFN_PROXY_URL") {
            self.proxy_url = Some(v);
        }
        if let Some(v) = env::var("CHATFN_POOL_MAX_IDLE_PER_HOST")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            self.pool_max_idle_per_host = v;
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}
