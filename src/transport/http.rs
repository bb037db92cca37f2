use super::{build_http_client, cancellable, TransportError};
use crate::auth::{Authenticator, Credential};
use crate::config::ClientConfig;
use crate::{BoxStream, Error, Result};
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use futures::TryStreamExt;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    auth: Arc<dyn Authenticator>,
    credential: Mutex<Option<Credential>>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig, auth: Arc<dyn Authenticator>) -> Result<Self> {
        Self::new_with_base_url(config, auth, None)
    }

    /// Same as [`HttpTransport::new`] but with the base URL replaced (mock servers).
    pub fn new_with_base_url(
        config: &ClientConfig,
        auth: Arc<dyn Authenticator>,
        base_url_override: Option<&str>,
    ) -> Result<Self> {
        let raw = base_url_override.unwrap_or(&config.base_url);
        // Url::join drops the last segment unless the base ends with a slash.
        let base_url = if raw.ends_with('/') {
            Url::parse(raw)
        } else {
            Url::parse(&format!("{}/", raw))
        }
        .map_err(TransportError::InvalidUrl)?;

        Ok(Self {
            client: build_http_client(config)?,
            base_url,
            auth,
            credential: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(TransportError::InvalidUrl)?)
    }

    /// Current bearer token, refreshed when it expires within one second.
    async fn bearer(&self) -> Result<String> {
        let mut cached = self.credential.lock().await;
        let stale = cached
            .as_ref()
            .map(|c| c.expires_within(Utc::now(), ChronoDuration::seconds(1)))
            .unwrap_or(true);
        if stale {
            debug!("refreshing credential");
            *cached = Some(self.auth.credential().await?);
        }
        cached
            .as_ref()
            .map(|c| c.token.clone())
            .ok_or_else(|| Error::authentication("no credential available"))
    }

    async fn send(&self, path: &str, req: RequestBuilder) -> Result<Response> {
        let token = self.bearer().await?;
        let request_id = Uuid::new_v4().to_string();
        let start = Instant::now();

        let resp = req
            .bearer_auth(token)
            .header("x-request-id", &request_id)
            .send()
            .await
            .map_err(TransportError::Http)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            info!(
                http_status = status.as_u16(),
                request_id = request_id.as_str(),
                path,
                duration_ms = start.elapsed().as_millis() as u64,
                "chatfn request failed"
            );
            return Err(Error::Remote {
                status: status.as_u16(),
                message: body,
            });
        }

        debug!(
            http_status = status.as_u16(),
            request_id = request_id.as_str(),
            path,
            duration_ms = start.elapsed().as_millis() as u64,
            "chatfn request succeeded"
        );
        Ok(resp)
    }

    async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
        let body = resp.bytes().await.map_err(TransportError::Http)?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B, cancel: &CancellationToken) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        cancellable(cancel, async {
            let req = self.client.post(self.url(path)?).json(body);
            let resp = self.send(path, req).await?;
            Self::read_json(resp).await
        })
        .await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<T> {
        cancellable(cancel, async {
            let req = self.client.get(self.url(path)?);
            let resp = self.send(path, req).await?;
            Self::read_json(resp).await
        })
        .await
    }

    pub async fn get_bytes(&self, path: &str, cancel: &CancellationToken) -> Result<Bytes> {
        cancellable(cancel, async {
            let req = self.client.get(self.url(path)?);
            let resp = self.send(path, req).await?;
            Ok(resp.bytes().await.map_err(TransportError::Http)?)
        })
        .await
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
        cancel: &CancellationToken,
    ) -> Result<T> {
        cancellable(cancel, async {
            let req = self.client.post(self.url(path)?).multipart(form);
            let resp = self.send(path, req).await?;
            Self::read_json(resp).await
        })
        .await
    }

    /// Open an event stream. The returned byte stream owns the connection; dropping
    /// it closes the connection.
    pub async fn post_stream<B>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<BoxStream<'static, Bytes>>
    where
        B: Serialize + ?Sized,
    {
        cancellable(cancel, async {
            let req = self
                .client
                .post(self.url(path)?)
                .header("accept", "text/event-stream")
                .json(body);
            let resp = self.send(path, req).await?;
            let byte_stream = resp
                .bytes_stream()
                .map_err(|e| Error::Transport(TransportError::Http(e)));
            Ok(Box::pin(byte_stream) as BoxStream<'static, Bytes>)
        })
        .await
    }
}
