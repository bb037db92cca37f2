use crate::auth::{Authenticator, OAuthAuthenticator, StaticToken};
use crate::client::core::ChatClient;
use crate::config::ClientConfig;
use crate::functions::{FunctionRegistry, HttpSchemaValidator, SchemaValidator};
use crate::transport::HttpTransport;
use crate::Result;
use std::sync::Arc;

/// Builder for [`ChatClient`].
///
/// Keep this surface area small: everything else lives in [`ClientConfig`].
pub struct ChatClientBuilder {
    config: Option<ClientConfig>,
    authenticator: Option<Arc<dyn Authenticator>>,
    validator: Option<Arc<dyn SchemaValidator>>,
    /// Override base URL (primarily for testing with mock servers)
    base_url_override: Option<String>,
}

impl ChatClientBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            authenticator: None,
            validator: None,
            base_url_override: None,
        }
    }

    /// Use `config` instead of reading it from the environment.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn authenticator(mut self, auth: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(auth);
        self
    }

    /// Use a pre-issued access token instead of the OAuth exchange.
    pub fn access_token(self, token: impl Into<String>) -> Self {
        self.authenticator(Arc::new(StaticToken::new(token)))
    }

    /// Replace the remote schema validator.
    pub fn schema_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Override the configured base URL.
    ///
    /// This is primarily for testing with mock servers.
    pub fn base_url_override(mut self, base_url: impl Into<String>) -> Self {
        self.base_url_override = Some(base_url.into());
        self
    }

    /// Build the client. Without an explicit authenticator the OAuth key is
    /// resolved from config, keyring or environment.
    pub fn build(self) -> Result<ChatClient> {
        let config = match self.config {
            Some(c) => c,
            None => ClientConfig::from_env(),
        };
        let auth: Arc<dyn Authenticator> = match self.authenticator {
            Some(a) => a,
            None => Arc::new(OAuthAuthenticator::from_config(&config)?),
        };
        let transport = Arc::new(HttpTransport::new_with_base_url(
            &config,
            auth,
            self.base_url_override.as_deref(),
        )?);
        let validator = self
            .validator
            .unwrap_or_else(|| Arc::new(HttpSchemaValidator::new(transport.clone())));

        Ok(ChatClient {
            config: Arc::new(config),
            transport,
            registry: Arc::new(FunctionRegistry::new(validator)),
        })
    }
}

impl Default for ChatClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
