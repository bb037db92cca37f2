use super::{Authenticator, Credential};
use crate::config::ClientConfig;
use crate::transport::TransportError;
use crate::{Error, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

/// Exchanges an authorization key for a short-lived access token.
pub struct OAuthAuthenticator {
    client: reqwest::Client,
    auth_url: String,
    scope: String,
    auth_key: String,
}

#[derive(Debug, Deserialize)]
struct TokenReply {
    access_token: String,
    /// Unix time in milliseconds.
    expires_at: i64,
}

impl OAuthAuthenticator {
    /// `auth_key` is the base64 `client_id:client_secret` pair issued by the service.
    pub fn new(
        auth_url: impl Into<String>,
        scope: impl Into<String>,
        auth_key: impl Into<String>,
    ) -> Result<Self> {
        Self::with_http_config(&ClientConfig::default(), auth_url, scope, auth_key)
    }

    fn with_http_config(
        config: &ClientConfig,
        auth_url: impl Into<String>,
        scope: impl Into<String>,
        auth_key: impl Into<String>,
    ) -> Result<Self> {
        let client = crate::transport::build_http_client(config)?;
        Ok(Self {
            client,
            auth_url: auth_url.into(),
            scope: scope.into(),
            auth_key: auth_key.into(),
        })
    }

    /// Build from a client id and secret instead of a pre-encoded key.
    pub fn from_client_secret(
        auth_url: impl Into<String>,
        scope: impl Into<String>,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Self> {
        let key = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", client_id, client_secret));
        Self::new(auth_url, scope, key)
    }

    /// Resolve the key from config, keyring or environment.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let key = config
            .auth_key
            .clone()
            .or_else(|| super::lookup_auth_key(&config.scope))
            .ok_or_else(|| {
                Error::configuration(
                    "authorization key required (config.auth_key, keyring or CHATFN_AUTH_KEY)",
                )
            })?;
        Self::with_http_config(config, &config.auth_url, &config.scope, key)
    }
}

#[async_trait::async_trait]
impl Authenticator for OAuthAuthenticator {
    async fn credential(&self) -> Result<Credential> {
        let request_id = Uuid::new_v4().to_string();
        debug!(rq_uid = %request_id, scope = %self.scope, "requesting access token");

        let resp = self
            .client
            .post(&self.auth_url)
            .header("Authorization", format!("Basic {}", self.auth_key))
            .header("RqUID", &request_id)
            .header("Accept", "application/json")
            .form(&[("scope", self.scope.as_str())])
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;
        if !status.is_success() {
            return Err(Error::authentication(format!(
                "token request failed with HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let reply: TokenReply = serde_json::from_str(&body)
            .map_err(|e| Error::authentication(format!("malformed token reply: {}", e)))?;
        let expires_at = DateTime::<Utc>::from_timestamp_millis(reply.expires_at)
            .ok_or_else(|| Error::authentication("token expiry out of range"))?;

        info!(expires_at = %expires_at, "access token issued");
        Ok(Credential::new(reply.access_token, expires_at))
    }
}
