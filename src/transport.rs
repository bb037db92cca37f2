//! HTTP transport: credential attachment, JSON calls, multipart uploads and
//! `data:`-framed event streams.

mod http;
pub mod sse;

pub use http::HttpTransport;

use crate::config::ClientConfig;
use crate::Result;
use reqwest::Proxy;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("{0}")]
    Other(String),
}

/// Build the shared reqwest client. Proxies are only used when configured explicitly.
pub(crate) fn build_http_client(config: &ClientConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.timeout())
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .danger_accept_invalid_certs(config.accept_invalid_certs);

    builder = match &config.proxy_url {
        Some(proxy_url) => builder.proxy(Proxy::all(proxy_url).map_err(TransportError::Http)?),
        None => builder.no_proxy(),
    };

    Ok(builder.build().map_err(TransportError::Http)?)
}

/// Race `fut` against `cancel`; the losing future is dropped, which aborts the request.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(crate::Error::Cancelled),
        out = fut => out,
    }
}
